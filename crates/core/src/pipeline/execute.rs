//! Execution units.
//!
//! One unit per issue port. Each unit models a pipeline whose depth comes
//! from the per-group latency table; throughput limits gate back-to-back
//! issue of the same group, and non-pipelined units (or blocking groups)
//! occupy the unit for the full latency. Memory uops are routed to the
//! load/store queue at the end of address computation; branches resolve here
//! and raise flush requests on misprediction.

use std::collections::{HashMap, VecDeque};

use crate::branch::BranchPredictor;
use crate::config::{Config, ExecutionUnitConfig};
use crate::uop::{InstructionGroup, UopId, UopPool};

use super::buffer::PipelineBuffer;

/// Side effects an execution unit hands back to the core for routing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecuteEffect {
    /// A load resolved its addresses; start it in the LSQ.
    StartLoad(UopId),
    /// A store-data uop produced its payload; relay it to the LSQ.
    SupplyStoreData(UopId),
    /// A uop completed with results to forward to waiting consumers.
    Completed(UopId),
}

/// A single execution unit bound to one issue port.
pub struct ExecuteUnit {
    pipelined: bool,
    blocking_groups: Vec<InstructionGroup>,
    /// In-flight uops with their completion ticks, oldest first.
    pipeline: VecDeque<(UopId, u64)>,
    /// Earliest tick a uop of each group may enter (throughput gating).
    group_cooldown: HashMap<InstructionGroup, u64>,
    /// Tick until which the whole unit is occupied.
    busy_until: u64,
    ticks: u64,
    should_flush: bool,
    flush_address: u64,
    flush_insn_id: u64,
    branches_executed: u64,
    branches_mispredicted: u64,
}

impl ExecuteUnit {
    /// Creates the unit from its configuration entry.
    pub fn new(config: &ExecutionUnitConfig) -> Self {
        Self {
            pipelined: config.pipelined,
            blocking_groups: config.blocking_groups.clone(),
            pipeline: VecDeque::new(),
            group_cooldown: HashMap::new(),
            busy_until: 0,
            ticks: 0,
            should_flush: false,
            flush_address: 0,
            flush_insn_id: 0,
            branches_executed: 0,
            branches_mispredicted: 0,
        }
    }

    /// Whether a misprediction was found this cycle.
    pub fn should_flush(&self) -> bool {
        self.should_flush
    }

    /// Redirect target of the flush request.
    pub fn flush_address(&self) -> u64 {
        self.flush_address
    }

    /// Macro-op id of the mispredicted branch (kept by the flush).
    pub fn flush_insn_id(&self) -> u64 {
        self.flush_insn_id
    }

    /// Branches resolved by this unit.
    pub fn branches_executed(&self) -> u64 {
        self.branches_executed
    }

    /// Branches resolved against their prediction.
    pub fn branches_mispredicted(&self) -> u64 {
        self.branches_mispredicted
    }

    /// Whether no uop is in flight.
    pub fn is_empty(&self) -> bool {
        self.pipeline.is_empty()
    }

    fn blocks(&self, group: InstructionGroup) -> bool {
        !self.pipelined
            || self
                .blocking_groups
                .iter()
                .any(|&blocking| group.self_and_ancestors().any(|g| g == blocking))
    }

    /// Accepts one uop from the issue port and completes the oldest in-flight
    /// uop whose latency has elapsed.
    pub fn tick(
        &mut self,
        pool: &mut UopPool,
        input: &mut PipelineBuffer<UopId>,
        completion: &mut PipelineBuffer<UopId>,
        config: &Config,
        predictor: &mut dyn BranchPredictor,
        effects: &mut Vec<ExecuteEffect>,
    ) {
        self.ticks += 1;
        self.should_flush = false;

        // Accept from the issue port.
        let head = input.head_slots()[0];
        match head {
            Some(id) if pool.is_gone(id) => {
                input.stall(false);
                input.head_slots_mut()[0] = None;
            }
            Some(id) => {
                let uop = pool.get(id).expect("live uop");
                let group = uop.group;
                let (latency, throughput) = config.latency_for(group, uop.op.mnemonic());
                let cooled = self.group_cooldown.get(&group).is_none_or(|&t| self.ticks >= t);
                if self.ticks >= self.busy_until && cooled {
                    input.stall(false);
                    input.head_slots_mut()[0] = None;
                    let complete_at = self.ticks + latency - 1;
                    self.pipeline.push_back((id, complete_at));
                    self.group_cooldown.insert(group, self.ticks + throughput);
                    if self.blocks(group) {
                        self.busy_until = complete_at + 1;
                    }
                } else {
                    input.stall(true);
                }
            }
            None => input.stall(false),
        }

        // Complete the oldest due uop (one per cycle, in issue order).
        let Some(&(id, complete_at)) = self.pipeline.front() else { return };
        if complete_at > self.ticks {
            return;
        }
        self.pipeline.pop_front();
        if pool.is_gone(id) {
            return;
        }

        let uop = pool.get_mut(id).expect("live uop");
        if uop.is_load() {
            uop.generate_addresses();
            effects.push(ExecuteEffect::StartLoad(id));
            // Completion arrives through the LSQ once data returns.
            return;
        }

        if uop.is_store_address() {
            uop.generate_addresses();
        }
        uop.execute();

        if uop.is_store_data() {
            effects.push(ExecuteEffect::SupplyStoreData(id));
        }

        if uop.is_branch() {
            self.branches_executed += 1;
            let (address, taken, target) = (uop.address, uop.branch_taken, uop.branch_target);
            let mispredicted = uop.mispredicted();
            let insn_id = uop.insn_id;
            predictor.update(address, taken, target);
            if mispredicted {
                self.branches_mispredicted += 1;
                self.should_flush = true;
                self.flush_address = target;
                self.flush_insn_id = insn_id;
            }
        }

        effects.push(ExecuteEffect::Completed(id));
        completion.tail_slots_mut()[0] = Some(id);
    }

    /// Drops squashed uops from the internal pipeline.
    pub fn purge_flushed(&mut self, pool: &UopPool) {
        self.pipeline.retain(|&(id, _)| !pool.is_gone(id));
    }
}
