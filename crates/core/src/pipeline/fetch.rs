//! Fetch unit.
//!
//! Requests block-aligned instruction reads through the MMU, buffers the
//! returned bytes, attaches branch predictions, and emits macro-ops to
//! decode. A detected hot loop is replayed out of the loop buffer without
//! touching instruction memory until a flush cancels it.

use std::collections::VecDeque;

use crate::arch::Architecture;
use crate::branch::{BranchPrediction, BranchPredictor};
use crate::common::ExceptionKind;
use crate::memory::{MemoryTarget, Mmu};

use super::buffer::PipelineBuffer;

/// A fetched (not yet decoded) macro-op.
#[derive(Clone, Debug)]
pub struct FetchedMacro {
    /// Macro-op order identifier.
    pub insn_id: u64,
    /// Instruction address.
    pub address: u64,
    /// Raw instruction word.
    pub word: u32,
    /// Prediction attached at fetch.
    pub prediction: BranchPrediction,
    /// Fault detected at fetch (misaligned PC).
    pub fault: Option<ExceptionKind>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoopState {
    Idle,
    /// A loop boundary is registered; waiting to see the branch retire past.
    Waiting,
    /// Recording the loop body.
    Filling,
    /// Replaying the recorded body.
    Supplying,
}

/// The fetch unit.
pub struct FetchUnit {
    pc: u64,
    program_byte_length: u64,
    block_size: u64,
    buffer: Vec<u8>,
    buffer_base: u64,
    requested_block: Option<u64>,
    next_insn_id: u64,
    paused: bool,
    /// Internal stall after a fetch fault; cleared by the next redirect.
    fault_stalled: bool,
    branch_stalls: u64,
    loop_state: LoopState,
    loop_boundary: u64,
    loop_buffer: VecDeque<(u64, u32)>,
    loop_buffer_capacity: usize,
    loop_index: usize,
}

impl FetchUnit {
    /// Creates a fetch unit fetching `block_size`-byte blocks.
    pub fn new(block_size: u64, loop_buffer_capacity: usize) -> Self {
        Self {
            pc: 0,
            program_byte_length: 0,
            block_size,
            buffer: Vec::new(),
            buffer_base: 0,
            requested_block: None,
            next_insn_id: 0,
            paused: false,
            fault_stalled: false,
            branch_stalls: 0,
            loop_state: LoopState::Idle,
            loop_boundary: 0,
            loop_buffer: VecDeque::new(),
            loop_buffer_capacity,
            loop_index: 0,
        }
    }

    /// Current program counter.
    pub fn pc(&self) -> u64 {
        self.pc
    }

    /// Redirects fetch to `pc`, discarding the outstanding block request and
    /// clearing any fetch-fault pause.
    pub fn update_pc(&mut self, pc: u64) {
        self.pc = pc;
        self.requested_block = None;
        self.fault_stalled = false;
    }

    /// Sets the fetchable program extent; fetch halts past it.
    pub fn set_program_length(&mut self, bytes: u64) {
        self.program_byte_length = bytes;
    }

    /// Stops fetching (context switch draining).
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resumes fetching.
    pub fn unpause(&mut self) {
        self.paused = false;
    }

    /// Cycles fetch ended early behind a predicted-taken branch.
    pub fn branch_stalls(&self) -> u64 {
        self.branch_stalls
    }

    /// Arms the loop buffer on a retired-branch boundary.
    pub fn register_loop_boundary(&mut self, address: u64) {
        self.loop_state = LoopState::Waiting;
        self.loop_boundary = address;
        self.loop_buffer.clear();
        self.loop_index = 0;
    }

    /// Cancels loop mode. Called on every flush crossing the pipeline.
    pub fn flush_loop_buffer(&mut self) {
        self.loop_state = LoopState::Idle;
        self.loop_buffer.clear();
        self.loop_index = 0;
    }

    fn buffered_word(&self, address: u64) -> Option<u32> {
        if address < self.buffer_base {
            return None;
        }
        let offset = (address - self.buffer_base) as usize;
        let bytes = self.buffer.get(offset..offset + 4)?;
        Some(u32::from_le_bytes(bytes.try_into().expect("4-byte slice")))
    }

    /// Emits up to one row of macro-ops into the fetch/decode buffer.
    pub fn tick(
        &mut self,
        output: &mut PipelineBuffer<FetchedMacro>,
        mmu: &mut Mmu,
        predictor: &mut dyn BranchPredictor,
        arch: &dyn Architecture,
    ) {
        // Absorb completed block reads first.
        for (target, value) in mmu.completed_instr_reads() {
            if self.requested_block == Some(target.vaddr) {
                self.requested_block = None;
                if value.is_valid() {
                    self.buffer = value.bytes().to_vec();
                    self.buffer_base = target.vaddr;
                } else {
                    // Instruction memory refused the block; stop fetching
                    // until a redirect points somewhere fetchable.
                    self.fault_stalled = true;
                }
            }
        }
        mmu.clear_completed_instr_reads();

        if self.paused || self.fault_stalled || output.is_stalled() {
            return;
        }

        if self.loop_state == LoopState::Supplying {
            self.supply_from_loop(output, predictor, arch);
            return;
        }

        for slot in 0..output.width() {
            if output.tail_slots_mut()[slot].is_some() {
                continue;
            }

            if self.pc % 4 != 0 {
                output.tail_slots_mut()[slot] = Some(FetchedMacro {
                    insn_id: self.next_insn_id,
                    address: self.pc,
                    word: 0,
                    prediction: BranchPrediction::not_taken(),
                    fault: Some(ExceptionKind::MisalignedPc),
                });
                self.next_insn_id += 1;
                self.fault_stalled = true;
                return;
            }

            if self.program_byte_length != 0 && self.pc >= self.program_byte_length {
                return;
            }
            let Some(word) = self.buffered_word(self.pc) else { return };

            let prediction = if arch.is_branch_word(word) {
                predictor.predict(self.pc)
            } else {
                BranchPrediction::not_taken()
            };

            output.tail_slots_mut()[slot] = Some(FetchedMacro {
                insn_id: self.next_insn_id,
                address: self.pc,
                word,
                prediction,
                fault: None,
            });
            self.next_insn_id += 1;

            self.record_for_loop(self.pc, word, arch);

            if prediction.taken {
                let target = prediction.target;
                self.pc = target;
                if self.buffered_word(target).is_none() {
                    self.branch_stalls += 1;
                    return;
                }
            } else {
                self.pc += 4;
            }
        }
    }

    fn record_for_loop(&mut self, address: u64, word: u32, arch: &dyn Architecture) {
        match self.loop_state {
            LoopState::Waiting => {
                if address == self.loop_boundary && arch.is_branch_word(word) {
                    self.loop_state = LoopState::Filling;
                    self.loop_buffer.clear();
                }
            }
            LoopState::Filling => {
                if address == self.loop_boundary && arch.is_branch_word(word) {
                    self.loop_buffer.push_back((address, word));
                    self.loop_state = LoopState::Supplying;
                    self.loop_index = 0;
                } else if self.loop_buffer.len() == self.loop_buffer_capacity {
                    // Body outgrew the buffer; give up on this loop.
                    self.flush_loop_buffer();
                } else {
                    self.loop_buffer.push_back((address, word));
                }
            }
            LoopState::Idle | LoopState::Supplying => {}
        }
    }

    fn supply_from_loop(
        &mut self,
        output: &mut PipelineBuffer<FetchedMacro>,
        predictor: &mut dyn BranchPredictor,
        arch: &dyn Architecture,
    ) {
        for slot in 0..output.width() {
            if output.tail_slots_mut()[slot].is_some() {
                continue;
            }
            let (address, word) = self.loop_buffer[self.loop_index];
            self.loop_index = (self.loop_index + 1) % self.loop_buffer.len();

            let prediction = if arch.is_branch_word(word) {
                predictor.predict(address)
            } else {
                BranchPrediction::not_taken()
            };
            output.tail_slots_mut()[slot] = Some(FetchedMacro {
                insn_id: self.next_insn_id,
                address,
                word,
                prediction,
                fault: None,
            });
            self.next_insn_id += 1;
        }
    }

    /// Requests the block containing the PC if it is not already buffered.
    ///
    /// Called at the end of each core cycle, after any flush has settled the
    /// PC. Instruction reads are untimed and block-aligned.
    pub fn request_from_pc(&mut self, mmu: &mut Mmu) {
        if self.paused
            || self.fault_stalled
            || self.loop_state == LoopState::Supplying
            || self.requested_block.is_some()
            || self.pc % 4 != 0
        {
            return;
        }
        if self.program_byte_length != 0 && self.pc >= self.program_byte_length {
            return;
        }
        if self.buffered_word(self.pc).is_some() {
            return;
        }
        let block = self.pc & !(self.block_size - 1);
        mmu.request_instr_read(MemoryTarget {
            vaddr: block,
            size: self.block_size as u16,
        });
        self.requested_block = Some(block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::demo::{asm, DemoArchitecture};
    use crate::branch::AlwaysNotTaken;
    use crate::config::Config;
    use crate::memory::{FixedLatencyMemory, Translation};
    use crate::uop::UopPool;

    fn setup(program: &[u32]) -> (FetchUnit, Mmu, PipelineBuffer<FetchedMacro>, UopPool) {
        let config = Config::default();
        let mut memory = FixedLatencyMemory::new(4096, 1);
        for (i, word) in program.iter().enumerate() {
            memory.write_block(i as u64 * 4, &word.to_le_bytes());
        }
        let mmu = Mmu::new(&config, Box::new(Translation::Mapped), Box::new(memory));
        let mut fetch = FetchUnit::new(16, 32);
        fetch.set_program_length(program.len() as u64 * 4);
        (fetch, mmu, PipelineBuffer::new(2), UopPool::new())
    }

    #[test]
    fn test_fetch_emits_buffered_words() {
        let program = [asm::addi(1, 0, 5), asm::addi(2, 0, 6), asm::sys(0)];
        let (mut fetch, mut mmu, mut output, mut pool) = setup(&program);
        let mut predictor = AlwaysNotTaken;
        let arch = DemoArchitecture;

        // Cycle 1: nothing buffered yet; request goes out.
        fetch.tick(&mut output, &mut mmu, &mut predictor, &arch);
        assert!(output.tail_slots_mut().iter().all(|s| s.is_none()));
        fetch.request_from_pc(&mut mmu);
        mmu.tick(&mut pool);

        // Cycle 2: block arrived; two macro-ops emitted.
        fetch.tick(&mut output, &mut mmu, &mut predictor, &arch);
        let emitted: Vec<_> = output.tail_slots_mut().iter().flatten().collect();
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0].address, 0);
        assert_eq!(emitted[0].word, program[0]);
        assert_eq!(emitted[0].insn_id, 0);
        assert_eq!(emitted[1].address, 4);
        assert_eq!(emitted[1].insn_id, 1);
    }

    #[test]
    fn test_misaligned_pc_emits_fault_and_pauses() {
        let program = [asm::nop(); 4];
        let (mut fetch, mut mmu, mut output, _pool) = setup(&program);
        let mut predictor = AlwaysNotTaken;
        let arch = DemoArchitecture;

        fetch.update_pc(2);
        fetch.tick(&mut output, &mut mmu, &mut predictor, &arch);
        let emitted: Vec<_> = output.tail_slots_mut().iter().flatten().collect();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].fault, Some(ExceptionKind::MisalignedPc));

        // Paused until redirected.
        fetch.request_from_pc(&mut mmu);
        assert!(mmu.completed_instr_reads().is_empty());
    }

    #[test]
    fn test_predicted_taken_branch_redirects_fetch() {
        // Branch at 0 predicted taken to 8.
        let program = [asm::beq(0, 0, 2), asm::nop(), asm::sys(0)];
        let (mut fetch, mut mmu, mut output, mut pool) = setup(&program);
        let arch = DemoArchitecture;

        struct Taken;
        impl BranchPredictor for Taken {
            fn predict(&mut self, _address: u64) -> BranchPrediction {
                BranchPrediction { taken: true, target: 8 }
            }
            fn update(&mut self, _address: u64, _taken: bool, _target: u64) {}
        }
        let mut predictor = Taken;

        fetch.request_from_pc(&mut mmu);
        mmu.tick(&mut pool);
        fetch.tick(&mut output, &mut mmu, &mut predictor, &arch);

        let emitted: Vec<_> = output.tail_slots_mut().iter().flatten().collect();
        assert_eq!(emitted[0].address, 0);
        assert!(emitted[0].prediction.taken);
        // Fetch followed the prediction within the same buffered block.
        assert_eq!(emitted[1].address, 8);
    }

    #[test]
    fn test_loop_buffer_fills_and_supplies() {
        // 0: addi, 4: addi, 8: bne back to 0.
        let program = [asm::addi(1, 1, 1), asm::addi(2, 2, 1), asm::bne(1, 3, -2)];
        let (mut fetch, mut mmu, mut output, mut pool) = setup(&program);
        let arch = DemoArchitecture;

        struct LoopTaken;
        impl BranchPredictor for LoopTaken {
            fn predict(&mut self, address: u64) -> BranchPrediction {
                BranchPrediction { taken: true, target: if address == 8 { 0 } else { address + 4 } }
            }
            fn update(&mut self, _address: u64, _taken: bool, _target: u64) {}
        }
        let mut predictor = LoopTaken;

        fetch.register_loop_boundary(8);
        fetch.request_from_pc(&mut mmu);
        mmu.tick(&mut pool);

        // Run enough ticks to see the branch twice (fill, then supply).
        for _ in 0..6 {
            fetch.tick(&mut output, &mut mmu, &mut predictor, &arch);
            output.fill_none();
            fetch.request_from_pc(&mut mmu);
            mmu.tick(&mut pool);
        }
        assert_eq!(fetch.loop_state, LoopState::Supplying);

        // Supplying does not touch memory.
        fetch.tick(&mut output, &mut mmu, &mut predictor, &arch);
        let emitted: Vec<_> = output.tail_slots_mut().iter().flatten().collect();
        assert_eq!(emitted.len(), 2);

        fetch.flush_loop_buffer();
        assert_eq!(fetch.loop_state, LoopState::Idle);
    }
}
