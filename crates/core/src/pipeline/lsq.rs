//! Load/store queue.
//!
//! Age-ordered admission of memory uops, speculative load issue with
//! conservative disambiguation against older stores, in-order store commit
//! with violation detection, and delivery of completed memory requests into
//! the writeback completion slots. All latencies are modelled by parking
//! work in tick-indexed request buckets.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::arch::Architecture;
use crate::common::RegisterValue;
use crate::config::Config;
use crate::memory::{MemoryTarget, Mmu};
use crate::uop::{UopId, UopPool};

use super::buffer::PipelineBuffer;
use super::dispatch::DispatchIssueUnit;

/// Whether loads complete in program order or as their data arrives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionOrder {
    /// Completion slots are reserved in issue order.
    InOrder,
    /// Loads complete as soon as their data is assembled.
    OutOfOrder,
}

/// The load recorded as violating memory order during a store commit.
#[derive(Clone, Copy, Debug)]
pub struct ViolatingLoad {
    /// Sequence id of the violating load.
    pub seq_id: u64,
    /// Macro-op id of the violating load.
    pub insn_id: u64,
    /// Instruction address of the violating load (refetch target).
    pub address: u64,
}

struct StoreEntry {
    uop: UopId,
    /// Data supplied by the paired store-data uop, one value per target.
    data: Vec<RegisterValue>,
}

/// A write request owned by the queue after its store committed.
struct StoreRequest {
    seq_id: u64,
    targets: Vec<MemoryTarget>,
    data: Vec<RegisterValue>,
    cond_uop: Option<UopId>,
}

/// The load/store queue.
pub struct LoadStoreQueue {
    combined: bool,
    max_combined: usize,
    max_loads: usize,
    max_stores: usize,
    load_queue: VecDeque<UopId>,
    store_queue: VecDeque<StoreEntry>,
    /// Loads that have requested memory, by sequence id (oldest first).
    requested_loads: BTreeMap<u64, UopId>,
    /// Loads deferred behind an older overlapping store, by store seq id.
    confliction_map: HashMap<u64, Vec<UopId>>,
    /// Tick-indexed buckets of load requests to schedule.
    request_load_queue: BTreeMap<u64, Vec<UopId>>,
    /// Tick-indexed buckets of store requests to schedule.
    request_store_queue: BTreeMap<u64, Vec<StoreRequest>>,
    completed: VecDeque<UopId>,
    requested_cond_store: Option<UopId>,
    violating_load: Option<ViolatingLoad>,
    completion_order: CompletionOrder,
    load_latency: u64,
    ticks: u64,
}

impl LoadStoreQueue {
    /// Builds the queue from configuration: a combined capacity when
    /// `Queue-Sizes.LSQ` is set, split load/store capacities otherwise.
    pub fn new(config: &Config) -> Self {
        let (combined, max_combined, max_loads, max_stores) = match config.queue_sizes.combined {
            Some(size) => (true, size, 0, 0),
            None => (false, 0, config.queue_sizes.load, config.queue_sizes.store),
        };
        Self {
            combined,
            max_combined,
            max_loads,
            max_stores,
            load_queue: VecDeque::new(),
            store_queue: VecDeque::new(),
            requested_loads: BTreeMap::new(),
            confliction_map: HashMap::new(),
            request_load_queue: BTreeMap::new(),
            request_store_queue: BTreeMap::new(),
            completed: VecDeque::new(),
            requested_cond_store: None,
            violating_load: None,
            completion_order: CompletionOrder::OutOfOrder,
            load_latency: config.lsq_memory_interface.load_latency,
            ticks: 0,
        }
    }

    /// Free load-queue slots.
    pub fn load_queue_space(&self) -> usize {
        if self.combined {
            self.combined_space()
        } else {
            self.max_loads - self.load_queue.len()
        }
    }

    /// Free store-queue slots.
    pub fn store_queue_space(&self) -> usize {
        if self.combined {
            self.combined_space()
        } else {
            self.max_stores - self.store_queue.len()
        }
    }

    fn combined_space(&self) -> usize {
        self.max_combined - self.load_queue.len() - self.store_queue.len()
    }

    /// Whether no memory uop is resident.
    pub fn is_empty(&self) -> bool {
        self.load_queue.is_empty() && self.store_queue.is_empty()
    }

    /// Selects the completion ordering. In-order reserves a completion slot
    /// when the load issues; out-of-order (the default) completes loads as
    /// their data arrives.
    pub fn set_completion_order(&mut self, order: CompletionOrder) {
        self.completion_order = order;
    }

    /// Admits a renamed load in program order.
    pub fn add_load(&mut self, id: UopId) {
        self.load_queue.push_back(id);
    }

    /// Admits a renamed store (address uop) in program order.
    pub fn add_store(&mut self, id: UopId) {
        self.store_queue.push_back(StoreEntry {
            uop: id,
            data: Vec::new(),
        });
    }

    /// Begins a load whose addresses just resolved.
    ///
    /// Loads with no memory targets execute directly. A load overlapping an
    /// older, unresolved-at-commit store parks in the confliction map until
    /// that store commits; otherwise its request is scheduled after the
    /// configured load latency.
    pub fn start_load(&mut self, pool: &mut UopPool, id: UopId) {
        let (seq_id, targets) = match pool.get(id) {
            Some(uop) => (uop.seq_id, uop.targets.clone()),
            None => return,
        };
        if targets.is_empty() {
            let uop = pool.get_mut(id).expect("load resolved above");
            uop.execute();
            self.completed.push_back(id);
            return;
        }

        if self.completion_order == CompletionOrder::InOrder {
            self.completed.push_back(id);
        }
        for entry in self.store_queue.iter().rev() {
            let Some(store) = pool.get(entry.uop) else { continue };
            if store.seq_id >= seq_id {
                continue;
            }
            let conflict = store
                .targets
                .iter()
                .any(|st| targets.iter().any(|ld| st.overlaps(ld)));
            if conflict {
                self.confliction_map
                    .entry(store.seq_id)
                    .or_default()
                    .push(id);
                return;
            }
        }

        self.request_load_queue
            .entry(self.ticks + self.load_latency)
            .or_default()
            .push(id);
        self.requested_loads.insert(seq_id, id);
    }

    /// Attaches a store-data uop's payload to its store queue entry.
    ///
    /// The pair is matched by `(instruction id, micro-op index)`.
    pub fn supply_store_data(&mut self, pool: &UopPool, id: UopId) {
        let Some(data_uop) = pool.get(id) else { return };
        if !data_uop.is_store_data() {
            return;
        }
        let payload = data_uop.store_payload();
        for entry in self.store_queue.iter_mut() {
            let Some(store) = pool.get(entry.uop) else { continue };
            if store.insn_id == data_uop.insn_id && store.micro_idx == data_uop.micro_idx {
                entry.data = vec![payload.clone()];
                break;
            }
        }
    }

    /// Starts the store at the head of the queue: attaches its data and
    /// schedules the write request to fire this cycle.
    ///
    /// Called by the reorder buffer when the store reaches the commit point.
    pub fn start_store(&mut self, pool: &mut UopPool, id: UopId) {
        let entry = self.store_queue.front().expect("store queue underflow");
        debug_assert_eq!(
            pool.get(entry.uop).map(|u| u.seq_id),
            pool.get(id).map(|u| u.seq_id),
            "started store is not at the head of the store queue"
        );
        let data = entry.data.clone();

        let Some(uop) = pool.get_mut(id) else { return };
        if uop.targets.is_empty() {
            return;
        }
        assert_eq!(
            uop.targets.len(),
            data.len(),
            "store data does not cover its targets"
        );
        for (slot, value) in uop.data.iter_mut().zip(data.iter()) {
            *slot = Some(value.clone());
        }

        let request = StoreRequest {
            seq_id: uop.seq_id,
            targets: uop.targets.clone(),
            data,
            cond_uop: uop.store_cond.then_some(id),
        };
        let is_cond_pending = uop.store_cond && !uop.cond_result_ready;
        self.request_store_queue
            .entry(self.ticks)
            .or_default()
            .push(request);

        if is_cond_pending {
            debug_assert!(
                self.requested_cond_store.is_none(),
                "second conditional store issued while one is in flight"
            );
            self.requested_cond_store = Some(id);
            if self.completion_order == CompletionOrder::InOrder {
                self.completed.push_back(id);
            }
        }
    }

    /// Commits the head store, checking every requested load younger than it
    /// for an overlap and releasing loads parked on it.
    ///
    /// Returns true when a memory-order violation was recorded; the oldest
    /// violating load is retained for the reorder buffer's flush.
    pub fn commit_store(&mut self, pool: &mut UopPool, id: UopId) -> bool {
        let entry = self.store_queue.front().expect("store queue underflow");
        let store_seq = pool
            .get(entry.uop)
            .map(|u| u.seq_id)
            .expect("head store is live");
        debug_assert_eq!(
            Some(store_seq),
            pool.get(id).map(|u| u.seq_id),
            "committed store is not at the head of the store queue"
        );

        self.violating_load = None;
        let targets = pool
            .get(id)
            .expect("committed store is live")
            .targets
            .clone();

        if targets.is_empty() {
            self.store_queue.pop_front();
            return false;
        }

        let mut violator: Option<ViolatingLoad> = None;
        for (&load_seq, &load_id) in self.requested_loads.iter() {
            // Ascending order: once a violator is found, the rest are younger.
            if let Some(current) = &violator {
                if load_seq > current.seq_id {
                    continue;
                }
            }
            if load_seq == store_seq {
                continue;
            }
            let Some(load) = pool.get(load_id) else { continue };
            let overlap = targets
                .iter()
                .any(|st| load.targets.iter().any(|ld| st.overlaps(ld)));
            if overlap {
                violator = Some(ViolatingLoad {
                    seq_id: load_seq,
                    insn_id: load.insn_id,
                    address: load.address,
                });
            }
        }
        self.violating_load = violator;

        if let Some(parked) = self.confliction_map.remove(&store_seq) {
            for load_id in parked {
                let Some(load) = pool.get(load_id) else { continue };
                let seq_id = load.seq_id;
                self.request_load_queue
                    .entry(self.ticks + 1 + self.load_latency)
                    .or_default()
                    .push(load_id);
                self.requested_loads.insert(seq_id, load_id);
            }
        }

        self.store_queue.pop_front();
        self.violating_load.is_some()
    }

    /// Commits the head load.
    pub fn commit_load(&mut self, pool: &UopPool, id: UopId) {
        let head = self.load_queue.pop_front().expect("load queue underflow");
        debug_assert_eq!(
            pool.get(head).map(|u| u.seq_id),
            pool.get(id).map(|u| u.seq_id),
            "committed load is not at the head of the load queue"
        );
        if let Some(uop) = pool.get(head) {
            self.requested_loads.remove(&uop.seq_id);
        }
    }

    /// The load recorded by the most recent violating store commit.
    pub fn violating_load(&self) -> Option<&ViolatingLoad> {
        self.violating_load.as_ref()
    }

    /// One queue cycle: schedule due requests while the MMU accepts them,
    /// execute loads whose data arrived, and drain completions to writeback.
    pub fn tick(
        &mut self,
        pool: &mut UopPool,
        mmu: &mut Mmu,
        dispatch: &mut DispatchIssueUnit,
        arch: &dyn Architecture,
        completion_slots: &mut [PipelineBuffer<UopId>],
    ) {
        self.ticks += 1;

        // Schedule requests from the due buckets, oldest tick first, stores
        // winning exact ties. A rejected request stays queued for next cycle.
        let mut exceeded = [false, false];
        loop {
            let load_tick = if exceeded[0] {
                None
            } else {
                self.request_load_queue.keys().next().copied()
            };
            let store_tick = if exceeded[1] {
                None
            } else {
                self.request_store_queue.keys().next().copied()
            };
            let choose_load = match (load_tick, store_tick) {
                (Some(lt), Some(st)) => lt < st,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };
            let due = if choose_load {
                load_tick.expect("load bucket chosen")
            } else {
                store_tick.expect("store bucket chosen")
            };
            if due > self.ticks {
                break;
            }

            if choose_load {
                let mut bucket = self.request_load_queue.remove(&due).expect("due bucket");
                while let Some(&load_id) = bucket.first() {
                    if pool.is_gone(load_id) {
                        bucket.remove(0);
                        continue;
                    }
                    let uop = pool.get(load_id).expect("live load").clone();
                    if mmu.request_read(&uop, load_id) {
                        bucket.remove(0);
                    } else {
                        exceeded[0] = true;
                        break;
                    }
                }
                if !bucket.is_empty() {
                    self.request_load_queue.insert(due, bucket);
                }
            } else {
                let mut bucket = self.request_store_queue.remove(&due).expect("due bucket");
                while let Some(request) = bucket.first() {
                    let accepted = mmu.request_write(
                        request.seq_id,
                        &request.targets,
                        &request.data,
                        request.cond_uop,
                    );
                    if accepted {
                        bucket.remove(0);
                    } else {
                        exceeded[1] = true;
                        break;
                    }
                }
                if !bucket.is_empty() {
                    self.request_store_queue.insert(due, bucket);
                }
            }
        }

        // A conditional store completes once its success result arrives.
        if self.completion_order == CompletionOrder::OutOfOrder {
            if let Some(id) = self.requested_cond_store {
                let ready = pool.get(id).is_none_or(|u| u.cond_result_ready);
                if ready {
                    self.completed.push_back(id);
                    self.requested_cond_store = None;
                }
            }
        }

        // Execute loads whose responses are fully assembled.
        let pending: Vec<UopId> = self.requested_loads.values().copied().collect();
        for id in pending {
            let Some(uop) = pool.get_mut(id) else { continue };
            if uop.flushed || !uop.has_all_data() || uop.executed {
                continue;
            }
            uop.execute();
            let is_store_data = uop.is_store_data();
            if is_store_data {
                self.supply_store_data(pool, id);
            }
            if self.completion_order == CompletionOrder::OutOfOrder {
                self.completed.push_back(id);
            }
        }

        // Drain completions into the writeback slots, skipping stalled ones.
        let mut slot = 0;
        while !self.completed.is_empty() && slot < completion_slots.len() {
            if completion_slots[slot].is_stalled() {
                slot += 1;
                continue;
            }
            let id = *self.completed.front().expect("non-empty queue");
            if pool.is_gone(id) {
                self.completed.pop_front();
                continue;
            }
            let uop = pool.get(id).expect("live uop");
            if uop.is_load() && !uop.executed {
                break; // in-order reservation still waiting on data
            }
            if uop.store_cond && !uop.cond_result_ready {
                break;
            }

            dispatch.forward_operands(pool, arch, id);
            completion_slots[slot].tail_slots_mut()[0] = Some(id);
            self.completed.pop_front();
            slot += 1;
        }
    }

    /// Erases flushed entries from every structure.
    pub fn purge_flushed(&mut self, pool: &UopPool) {
        self.load_queue.retain(|&id| !pool.is_gone(id));
        self.requested_loads.retain(|_, id| !pool.is_gone(*id));

        // A flushed store drops its parked loads too (they are younger).
        let mut dead_stores = Vec::new();
        self.store_queue.retain(|entry| {
            if pool.is_gone(entry.uop) {
                if let Some(uop) = pool.get(entry.uop) {
                    dead_stores.push(uop.seq_id);
                }
                false
            } else {
                true
            }
        });
        for seq_id in dead_stores {
            self.confliction_map.remove(&seq_id);
        }

        for parked in self.confliction_map.values_mut() {
            parked.retain(|&id| !pool.is_gone(id));
        }
        self.confliction_map.retain(|_, parked| !parked.is_empty());

        self.request_load_queue.retain(|_, bucket| {
            bucket.retain(|&id| !pool.is_gone(id));
            !bucket.is_empty()
        });
        // Store requests are created at commit and are never flushed.

        if let Some(id) = self.requested_cond_store {
            if pool.is_gone(id) {
                self.requested_cond_store = None;
            }
        }
        self.completed.retain(|&id| !pool.is_gone(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::demo::DemoArchitecture;
    use crate::common::reg::{Register, RegisterFileKind, RegisterValue};
    use crate::memory::{FixedLatencyMemory, Translation};
    use crate::uop::{InstructionGroup, Op, Uop};

    struct Bench {
        lsq: LoadStoreQueue,
        pool: UopPool,
        mmu: Mmu,
        dispatch: DispatchIssueUnit,
        slots: Vec<PipelineBuffer<UopId>>,
        next_seq: u64,
    }

    fn bench() -> Bench {
        let config = Config::default();
        let mut phys = [0u16; RegisterFileKind::COUNT];
        phys[RegisterFileKind::GeneralPurpose.index()] = 64;
        let memory = Box::new(FixedLatencyMemory::new(4096, 1));
        Bench {
            lsq: LoadStoreQueue::new(&config),
            pool: UopPool::new(),
            mmu: Mmu::new(&config, Box::new(Translation::Mapped), memory),
            dispatch: DispatchIssueUnit::new(&config, &phys),
            slots: vec![PipelineBuffer::new(1)],
            next_seq: 0,
        }
    }

    fn tick(bench: &mut Bench) {
        let arch = DemoArchitecture;
        bench.lsq.tick(
            &mut bench.pool,
            &mut bench.mmu,
            &mut bench.dispatch,
            &arch,
            &mut bench.slots,
        );
        bench.mmu.tick(&mut bench.pool);
    }

    fn make_load(bench: &mut Bench, insn_id: u64, vaddr: u64) -> UopId {
        let mut uop = Uop::new(
            0x100 + insn_id * 4,
            Op::Load { offset: 0, size: 8 },
            InstructionGroup::Load,
            vec![Register::gp(1)],
            vec![Register::gp(2)],
        );
        uop.insn_id = insn_id;
        uop.seq_id = bench.next_seq;
        bench.next_seq += 1;
        uop.supply_operand(0, RegisterValue::from_u64(vaddr));
        uop.generate_addresses();
        let id = bench.pool.insert(uop);
        bench.lsq.add_load(id);
        id
    }

    fn make_store(bench: &mut Bench, insn_id: u64, vaddr: u64, value: u64) -> (UopId, UopId) {
        let mut addr_uop = Uop::new(
            0x100 + insn_id * 4,
            Op::StoreAddress { offset: 0, size: 8 },
            InstructionGroup::Store,
            vec![Register::gp(1)],
            vec![],
        );
        addr_uop.insn_id = insn_id;
        addr_uop.seq_id = bench.next_seq;
        bench.next_seq += 1;
        addr_uop.supply_operand(0, RegisterValue::from_u64(vaddr));
        addr_uop.generate_addresses();
        let addr_id = bench.pool.insert(addr_uop);
        bench.lsq.add_store(addr_id);

        let mut data_uop = Uop::new(
            0x100 + insn_id * 4,
            Op::StoreData,
            InstructionGroup::Store,
            vec![Register::gp(3)],
            vec![],
        );
        data_uop.insn_id = insn_id;
        data_uop.seq_id = bench.next_seq;
        bench.next_seq += 1;
        data_uop.supply_operand(0, RegisterValue::from_u64(value));
        let data_id = bench.pool.insert(data_uop);
        (addr_id, data_id)
    }

    #[test]
    fn test_load_requests_and_completes() {
        let mut bench = bench();
        let id = make_load(&mut bench, 0, 0x40);
        bench.lsq.start_load(&mut bench.pool, id);

        // Latency 1 schedule, then request, then response, then drain.
        for _ in 0..4 {
            tick(&mut bench);
        }
        assert!(bench.pool.get(id).unwrap().executed);
        assert_eq!(bench.slots[0].tail_slots_mut()[0], Some(id));
    }

    #[test]
    fn test_load_defers_behind_overlapping_older_store() {
        let mut bench = bench();
        let (store_id, data_id) = make_store(&mut bench, 0, 0x40, 7);
        let load_id = make_load(&mut bench, 1, 0x40);

        bench.lsq.start_load(&mut bench.pool, load_id);
        // Parked: no request bucket, no requested entry.
        assert!(bench.lsq.requested_loads.is_empty());
        assert_eq!(bench.lsq.confliction_map.len(), 1);

        // Store data arrives; store commits; the load is released and reads
        // the stored value.
        bench.lsq.supply_store_data(&bench.pool, data_id);
        bench.lsq.start_store(&mut bench.pool, store_id);
        let violated = bench.lsq.commit_store(&mut bench.pool, store_id);
        assert!(!violated);
        assert!(bench.lsq.confliction_map.is_empty());

        for _ in 0..6 {
            tick(&mut bench);
        }
        let load = bench.pool.get(load_id).unwrap();
        assert!(load.executed);
        assert_eq!(load.results[0].as_u64(), 7);
    }

    #[test]
    fn test_store_commit_detects_violation() {
        let mut bench = bench();
        let (store_id, data_id) = make_store(&mut bench, 0, 0x40, 7);
        let load_id = make_load(&mut bench, 1, 0x40);

        // The load went ahead speculatively before the store's address was
        // known to conflict (simulate by starting it with no stores visible).
        bench.lsq.request_load_queue.entry(1).or_default().push(load_id);
        bench
            .lsq
            .requested_loads
            .insert(bench.pool.get(load_id).unwrap().seq_id, load_id);

        bench.lsq.supply_store_data(&bench.pool, data_id);
        bench.lsq.start_store(&mut bench.pool, store_id);
        let violated = bench.lsq.commit_store(&mut bench.pool, store_id);
        assert!(violated);
        let violator = bench.lsq.violating_load().unwrap();
        assert_eq!(violator.insn_id, 1);
        assert_eq!(violator.address, 0x104);
    }

    #[test]
    fn test_violation_keeps_oldest_load() {
        let mut bench = bench();
        let (store_id, data_id) = make_store(&mut bench, 0, 0x40, 7);
        let old_load = make_load(&mut bench, 1, 0x40);
        let young_load = make_load(&mut bench, 2, 0x44);

        for id in [old_load, young_load] {
            let seq = bench.pool.get(id).unwrap().seq_id;
            bench.lsq.requested_loads.insert(seq, id);
        }

        bench.lsq.supply_store_data(&bench.pool, data_id);
        bench.lsq.start_store(&mut bench.pool, store_id);
        assert!(bench.lsq.commit_store(&mut bench.pool, store_id));
        assert_eq!(bench.lsq.violating_load().unwrap().insn_id, 1);
    }

    #[test]
    fn test_commit_load_pops_head() {
        let mut bench = bench();
        let id = make_load(&mut bench, 0, 0x40);
        bench.lsq.start_load(&mut bench.pool, id);
        assert_eq!(bench.lsq.load_queue.len(), 1);

        bench.lsq.commit_load(&bench.pool, id);
        assert!(bench.lsq.load_queue.is_empty());
        assert!(bench.lsq.requested_loads.is_empty());
    }

    #[test]
    fn test_purge_flushed_clears_everything() {
        let mut bench = bench();
        let (store_id, _) = make_store(&mut bench, 0, 0x40, 7);
        let load_id = make_load(&mut bench, 1, 0x40);
        bench.lsq.start_load(&mut bench.pool, load_id); // parks on the store

        bench.pool.get_mut(store_id).unwrap().flushed = true;
        bench.pool.get_mut(load_id).unwrap().flushed = true;
        bench.lsq.purge_flushed(&bench.pool);

        assert!(bench.lsq.is_empty());
        assert!(bench.lsq.confliction_map.is_empty());
        assert!(bench.lsq.requested_loads.is_empty());
        assert!(bench.lsq.request_load_queue.is_empty());
    }

    #[test]
    fn test_inorder_completion_blocks_behind_older_load() {
        let config = Config::default();
        let mut phys = [0u16; RegisterFileKind::COUNT];
        phys[RegisterFileKind::GeneralPurpose.index()] = 64;
        let memory = Box::new(FixedLatencyMemory::new(4096, 1));
        // Address 0x40 translates only after a delayed-translation supply.
        let resolved = std::rc::Rc::new(std::cell::Cell::new(false));
        let flag = resolved.clone();
        let translator: crate::memory::Translator = Box::new(move |vaddr| {
            if vaddr == 0x40 && !flag.get() {
                Translation::Pending
            } else {
                Translation::Mapped(vaddr)
            }
        });
        let mut bench = Bench {
            lsq: LoadStoreQueue::new(&config),
            pool: UopPool::new(),
            mmu: Mmu::new(&config, translator, memory),
            dispatch: DispatchIssueUnit::new(&config, &phys),
            slots: vec![PipelineBuffer::new(1), PipelineBuffer::new(1)],
            next_seq: 0,
        };
        bench.lsq.set_completion_order(CompletionOrder::InOrder);

        let slow = make_load(&mut bench, 0, 0x40);
        let fast = make_load(&mut bench, 1, 0x80);
        bench.lsq.start_load(&mut bench.pool, slow);
        bench.lsq.start_load(&mut bench.pool, fast);

        // The younger load's data arrives, but its reserved slot sits behind
        // the older load's.
        for _ in 0..4 {
            tick(&mut bench);
        }
        assert!(bench.pool.get(fast).unwrap().executed);
        assert!(bench.slots[0].tail_slots_mut()[0].is_none());

        resolved.set(true);
        bench.mmu.supply_delayed_translation(0x40);
        for _ in 0..4 {
            tick(&mut bench);
        }
        assert_eq!(bench.slots[0].tail_slots_mut()[0], Some(slow));
        assert_eq!(bench.slots[1].tail_slots_mut()[0], Some(fast));
    }

    #[test]
    fn test_split_queue_space_accounting() {
        let mut config = Config::default();
        config.queue_sizes.load = 2;
        config.queue_sizes.store = 1;
        let lsq = LoadStoreQueue::new(&config);
        assert_eq!(lsq.load_queue_space(), 2);
        assert_eq!(lsq.store_queue_space(), 1);

        let mut config = Config::default();
        config.queue_sizes.combined = Some(4);
        let lsq = LoadStoreQueue::new(&config);
        assert_eq!(lsq.load_queue_space(), 4);
        assert_eq!(lsq.store_queue_space(), 4);
    }
}
