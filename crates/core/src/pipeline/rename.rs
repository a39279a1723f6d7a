//! Rename unit.
//!
//! Renames source operands through the alias table, allocates physical tags
//! for destinations, and reserves reorder buffer and load/store queue slots,
//! all in strict program order. Any shortage stalls the input buffer for the
//! rest of the cycle and bumps the matching stall counter.

use crate::common::reg::RegisterFileKind;
use crate::uop::{UopId, UopPool};

use super::buffer::PipelineBuffer;
use super::lsq::LoadStoreQueue;
use super::rat::RegisterAliasTable;
use super::rob::ReorderBuffer;

/// The rename unit.
#[derive(Default)]
pub struct RenameUnit {
    rob_stalls: u64,
    lq_stalls: u64,
    sq_stalls: u64,
    allocation_stalls: [u64; RegisterFileKind::COUNT],
}

impl RenameUnit {
    /// Creates a rename unit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cycles stalled on a full reorder buffer.
    pub fn rob_stalls(&self) -> u64 {
        self.rob_stalls
    }

    /// Cycles stalled on a full load queue.
    pub fn lq_stalls(&self) -> u64 {
        self.lq_stalls
    }

    /// Cycles stalled on a full store queue.
    pub fn sq_stalls(&self) -> u64 {
        self.sq_stalls
    }

    /// Cycles stalled on empty free lists, summed over register files.
    pub fn allocation_stalls(&self) -> u64 {
        self.allocation_stalls.iter().sum()
    }

    /// Renames one buffer row of uops in program order.
    pub fn tick(
        &mut self,
        pool: &mut UopPool,
        input: &mut PipelineBuffer<UopId>,
        output: &mut PipelineBuffer<UopId>,
        rob: &mut ReorderBuffer,
        rat: &mut RegisterAliasTable,
        lsq: &mut LoadStoreQueue,
    ) {
        input.stall(false);
        if output.is_stalled() {
            input.stall(true);
            return;
        }

        for slot in 0..input.width() {
            let Some(id) = input.head_slots()[slot] else { continue };
            let Some(uop) = pool.get(id) else {
                input.head_slots_mut()[slot] = None;
                continue;
            };

            if rob.free_space() == 0 {
                self.rob_stalls += 1;
                input.stall(true);
                return;
            }
            if uop.is_load() && lsq.load_queue_space() == 0 {
                self.lq_stalls += 1;
                input.stall(true);
                return;
            }
            if uop.is_store_address() && lsq.store_queue_space() == 0 {
                self.sq_stalls += 1;
                input.stall(true);
                return;
            }

            // Destination demand per file must fit the free lists.
            let mut demand = [0usize; RegisterFileKind::COUNT];
            for reg in &uop.destinations {
                demand[reg.file.index()] += 1;
            }
            for kind in RegisterFileKind::ALL {
                let needed = demand[kind.index()];
                if needed > 0 && rat.free_registers(kind) < needed {
                    self.allocation_stalls[kind.index()] += 1;
                    input.stall(true);
                    return;
                }
            }

            let is_load = uop.is_load();
            let is_store = uop.is_store_address();

            let uop = pool.get_mut(id).expect("uop resolved above");
            for source in uop.sources.iter_mut() {
                *source = rat.rename_source(*source);
            }
            for dest in uop.destinations.iter_mut() {
                *dest = rat.allocate(*dest);
            }

            rob.reserve(pool, id);
            if is_load {
                lsq.add_load(id);
            } else if is_store {
                lsq.add_store(id);
            }

            output.tail_slots_mut()[slot] = Some(id);
            input.head_slots_mut()[slot] = None;
        }
    }
}
