//! Reorder buffer.
//!
//! An in-order queue of in-flight uops keyed by sequence id. Only the head
//! may commit; flushes walk back from the tail, rewinding the alias table as
//! they squash. The ROB is also the single place simulated-program exceptions
//! are raised, and it watches retired branches for hot loops to hand to the
//! fetch unit's loop buffer.

use std::collections::VecDeque;

use crate::config::Config;
use crate::uop::{UopId, UopPool};

use super::lsq::LoadStoreQueue;
use super::rat::RegisterAliasTable;

#[derive(Clone, Copy, PartialEq, Eq)]
struct LatestBranch {
    address: u64,
    taken: bool,
    target: u64,
}

/// Result of a commit pass.
#[derive(Default)]
pub struct CommitOutcome {
    /// Uops retired this pass.
    pub committed: usize,
    /// Exception-carrying uop popped for the handler. The caller owns the
    /// pool slot from here.
    pub raised: Option<UopId>,
    /// Branch address of a newly detected loop, for the fetch unit.
    pub loop_boundary: Option<u64>,
}

/// The reorder buffer.
pub struct ReorderBuffer {
    buffer: VecDeque<UopId>,
    max_size: usize,
    next_seq_id: u64,
    should_flush: bool,
    flush_address: u64,
    flush_insn_id: u64,
    instructions_committed: u64,
    load_violations: u64,
    branch_counter: Option<(LatestBranch, u64)>,
    loop_buffer_size: usize,
    loop_detection_threshold: u64,
    loop_detected: bool,
}

impl ReorderBuffer {
    /// Creates a reorder buffer from configuration.
    pub fn new(config: &Config) -> Self {
        Self {
            buffer: VecDeque::new(),
            max_size: config.queue_sizes.rob,
            next_seq_id: 0,
            should_flush: false,
            flush_address: 0,
            flush_insn_id: 0,
            instructions_committed: 0,
            load_violations: 0,
            branch_counter: None,
            loop_buffer_size: config.branch_predictor.loop_buffer_size,
            loop_detection_threshold: config.branch_predictor.loop_detection_threshold,
            loop_detected: false,
        }
    }

    /// Occupied entries.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether no uop is in flight.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Free entries.
    pub fn free_space(&self) -> usize {
        self.max_size - self.buffer.len()
    }

    /// Whether the last commit pass demanded a flush (memory-order violation).
    pub fn should_flush(&self) -> bool {
        self.should_flush
    }

    /// Refetch address for the violation flush.
    pub fn flush_address(&self) -> u64 {
        self.flush_address
    }

    /// Macro-op id the violation flush keeps (everything younger goes).
    pub fn flush_insn_id(&self) -> u64 {
        self.flush_insn_id
    }

    /// Macro-ops retired.
    pub fn instructions_committed(&self) -> u64 {
        self.instructions_committed
    }

    /// Speculative loads caught violating memory order.
    pub fn load_violations(&self) -> u64 {
        self.load_violations
    }

    /// Reserves the tail entry for a renamed uop and assigns its sequence id.
    pub fn reserve(&mut self, pool: &mut UopPool, id: UopId) {
        assert!(
            self.buffer.len() < self.max_size,
            "reserved an entry in a full reorder buffer"
        );
        let uop = pool.get_mut(id).expect("reserved uop is live");
        uop.seq_id = self.next_seq_id;
        self.next_seq_id += 1;
        self.buffer.push_back(id);
    }

    /// Marks a macro-op's uops commit-ready once every one has written back.
    pub fn commit_micro_ops(&mut self, pool: &mut UopPool, insn_id: u64) {
        let members: Vec<UopId> = self
            .buffer
            .iter()
            .copied()
            .filter(|&id| pool.get(id).is_some_and(|u| u.insn_id == insn_id))
            .collect();
        let all_written = members
            .iter()
            .all(|&id| pool.get(id).is_some_and(|u| u.written_back));
        if !all_written {
            return;
        }
        for id in members {
            if let Some(uop) = pool.get_mut(id) {
                uop.commit_ready = true;
            }
        }
    }

    /// Commits up to `max_commits` head uops in program order.
    ///
    /// Stops at the first uop that is not commit-ready, at an exception
    /// (popped and handed to the caller), or at a store whose commit reveals
    /// a memory-order violation (flush state is latched).
    pub fn commit(
        &mut self,
        max_commits: usize,
        pool: &mut UopPool,
        rat: &mut RegisterAliasTable,
        lsq: &mut LoadStoreQueue,
    ) -> CommitOutcome {
        self.should_flush = false;
        let mut outcome = CommitOutcome::default();

        while outcome.committed < max_commits && !self.buffer.is_empty() {
            let id = *self.buffer.front().expect("non-empty buffer");
            let uop = pool.get(id).expect("reorder buffer entry is live");
            if !uop.commit_ready {
                break;
            }

            if uop.exception.is_some() {
                self.buffer.pop_front();
                outcome.committed += 1;
                outcome.raised = Some(id);
                return outcome;
            }

            let destinations = uop.destinations.clone();
            let is_store = uop.is_store_address();
            let is_load = uop.is_load();
            let is_branch = uop.is_branch();
            let is_last = uop.micro_last;
            let branch_state = (uop.address, uop.branch_taken, uop.branch_target);

            for &dest in &destinations {
                rat.commit(dest);
            }

            if is_store {
                lsq.start_store(pool, id);
                if lsq.commit_store(pool, id) {
                    let violator = *lsq.violating_load().expect("violation recorded");
                    self.load_violations += 1;
                    self.should_flush = true;
                    self.flush_insn_id = violator.insn_id.wrapping_sub(1);
                    self.flush_address = violator.address;

                    self.buffer.pop_front();
                    let _ = pool.remove(id);
                    outcome.committed += 1;
                    return outcome;
                }
            } else if is_load {
                lsq.commit_load(pool, id);
            }

            if is_branch {
                if let Some(boundary) = self.note_retired_branch(branch_state) {
                    outcome.loop_boundary = Some(boundary);
                }
            }
            if is_last {
                self.instructions_committed += 1;
            }

            self.buffer.pop_front();
            let _ = pool.remove(id);
            outcome.committed += 1;
        }

        outcome
    }

    /// Counts contiguous retirements of the same branch; reports a loop
    /// boundary once the threshold is met and the body fits the loop buffer.
    fn note_retired_branch(&mut self, (address, taken, target): (u64, bool, u64)) -> Option<u64> {
        let branch = LatestBranch {
            address,
            taken,
            target,
        };
        match &mut self.branch_counter {
            Some((latest, count)) if *latest == branch => *count += 1,
            _ => {
                self.branch_counter = Some((branch, 1));
                return None;
            }
        }

        let (_, count) = self.branch_counter.as_ref().expect("counter set above");
        let backward_body_words = if taken && target <= address {
            ((address - target) / 4 + 1) as usize
        } else {
            return None;
        };
        if !self.loop_detected
            && *count >= self.loop_detection_threshold
            && backward_body_words <= self.loop_buffer_size
        {
            self.loop_detected = true;
            return Some(address);
        }
        None
    }

    /// Squashes every uop with a macro-op id newer than `after_insn_id`,
    /// rewinding the alias table from the tail. Returns the squashed uops;
    /// the caller frees them after all units have purged.
    pub fn flush(
        &mut self,
        pool: &mut UopPool,
        rat: &mut RegisterAliasTable,
        after_insn_id: u64,
    ) -> Vec<UopId> {
        let mut flushed = Vec::new();
        while let Some(&id) = self.buffer.back() {
            let uop = pool.get_mut(id).expect("reorder buffer entry is live");
            if uop.insn_id <= after_insn_id {
                break;
            }
            uop.flushed = true;
            for &dest in uop.destinations.clone().iter().rev() {
                rat.rewind(dest);
            }
            self.buffer.pop_back();
            flushed.push(id);
        }
        self.branch_counter = None;
        self.loop_detected = false;
        flushed
    }

}
