//! Decode unit.
//!
//! Cracks fetched macro-ops into micro-ops, binds them to issue ports, and
//! corrects obvious mis-speculation early: a macro-op that was predicted
//! taken but decodes to a non-branch redirects fetch immediately instead of
//! waiting for execute.

use std::collections::VecDeque;

use crate::arch::Architecture;
use crate::common::ExceptionKind;
use crate::config::Config;
use crate::uop::{UopId, UopPool};

use super::buffer::PipelineBuffer;
use super::fetch::FetchedMacro;

/// The decode unit.
pub struct DecodeUnit {
    /// Micro-ops decoded but not yet passed to rename.
    pending: VecDeque<UopId>,
    early_flushes: u64,
    should_flush: bool,
    flush_address: u64,
}

impl DecodeUnit {
    /// Creates an empty decode unit.
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            early_flushes: 0,
            should_flush: false,
            flush_address: 0,
        }
    }

    /// Whether decode detected a mis-speculated fetch stream this cycle.
    pub fn should_flush(&self) -> bool {
        self.should_flush
    }

    /// Redirect target for an early flush.
    pub fn flush_address(&self) -> u64 {
        self.flush_address
    }

    /// Early flushes raised so far.
    pub fn early_flushes(&self) -> u64 {
        self.early_flushes
    }

    /// Whether decoded micro-ops are still waiting for rename slots.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Decodes buffered macro-ops and fills the rename input.
    pub fn tick(
        &mut self,
        pool: &mut UopPool,
        input: &mut PipelineBuffer<FetchedMacro>,
        output: &mut PipelineBuffer<UopId>,
        config: &Config,
        arch: &dyn Architecture,
    ) {
        input.stall(false);
        self.should_flush = false;

        if output.is_stalled() {
            input.stall(true);
            return;
        }

        for slot in 0..input.width() {
            // Keep the pending queue shallow so rename sees program order.
            if self.pending.len() >= output.width() {
                input.stall(true);
                break;
            }
            let Some(macro_op) = input.head_slots()[slot].clone() else {
                continue;
            };
            input.head_slots_mut()[slot] = None;

            if let Some(kind) = macro_op.fault {
                let mut uop = crate::uop::Uop::new(
                    macro_op.address,
                    crate::uop::Op::Nop,
                    crate::uop::InstructionGroup::System,
                    vec![],
                    vec![],
                );
                uop.insn_id = macro_op.insn_id;
                uop.exception = Some(kind);
                self.pending.push_back(pool.insert(uop));
                continue;
            }

            let uops = arch.decode(macro_op.word, macro_op.address);
            let is_branch = uops.iter().any(|u| u.is_branch());

            for mut uop in uops {
                uop.insn_id = macro_op.insn_id;
                uop.prediction = macro_op.prediction;
                uop.supported_ports = config.supported_ports(uop.group, uop.op.mnemonic());
                if uop.supported_ports.is_empty() && uop.exception.is_none() {
                    uop.exception = Some(ExceptionKind::NoAvailablePort);
                }
                self.pending.push_back(pool.insert(uop));
            }

            // Predicted taken but not a branch: the fetch stream behind this
            // macro-op is wrong. Redirect to the fall-through and stop; the
            // core wipes the fetch/decode buffer.
            if macro_op.prediction.taken && !is_branch {
                self.should_flush = true;
                self.flush_address = macro_op.address + 4;
                self.early_flushes += 1;
                break;
            }
        }

        for slot in 0..output.width() {
            if output.tail_slots_mut()[slot].is_some() {
                continue;
            }
            let Some(id) = self.pending.pop_front() else { break };
            output.tail_slots_mut()[slot] = Some(id);
        }
    }

    /// Drops decoded-but-unrenamed micro-ops on a flush.
    pub fn purge_flushed(&mut self, pool: &mut UopPool) {
        for id in self.pending.drain(..) {
            if let Some(uop) = pool.get_mut(id) {
                uop.flushed = true;
            }
            let _ = pool.remove(id);
        }
    }
}

impl Default for DecodeUnit {
    fn default() -> Self {
        Self::new()
    }
}
