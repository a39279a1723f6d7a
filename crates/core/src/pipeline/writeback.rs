//! Writeback unit.
//!
//! Drains the completion slots into the physical register files and informs
//! the reorder buffer so macro-ops become commit-ready. Runs at the start of
//! each cycle so same-cycle operand reads observe the written values.

use crate::common::reg::RegisterFileSet;
use crate::uop::{UopId, UopPool};

use super::buffer::PipelineBuffer;
use super::rob::ReorderBuffer;

/// The writeback unit.
#[derive(Default)]
pub struct WritebackUnit {
    instructions_written: u64,
}

impl WritebackUnit {
    /// Creates a writeback unit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uops written back so far.
    pub fn instructions_written(&self) -> u64 {
        self.instructions_written
    }

    /// Writes every completion slot's results to the register files.
    pub fn tick(
        &mut self,
        pool: &mut UopPool,
        files: &mut RegisterFileSet,
        completion_slots: &mut [PipelineBuffer<UopId>],
        rob: &mut ReorderBuffer,
    ) {
        for slot in completion_slots.iter_mut() {
            let Some(id) = slot.head_slots()[0] else { continue };
            slot.head_slots_mut()[0] = None;

            let Some(uop) = pool.get_mut(id) else { continue };
            if uop.flushed {
                continue;
            }
            for (reg, value) in uop.destinations.iter().zip(uop.results.iter()) {
                files.set(*reg, value.clone());
            }
            uop.written_back = true;
            let insn_id = uop.insn_id;
            self.instructions_written += 1;

            rob.commit_micro_ops(pool, insn_id);
        }
    }
}
