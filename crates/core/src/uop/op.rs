//! Decoded operations and their execute semantics.
//!
//! The core is indifferent to which operations exist; it only routes uops by
//! group and calls `execute` / `generate_addresses` at the right pipeline
//! points. This small operation set is enough to exercise every core path:
//! ALU work, multiplies, loads, stores cracked into address + data uops,
//! conditional branches, and supervisor calls.

use crate::common::{ExceptionKind, RegisterValue};
use crate::memory::MemoryTarget;

use super::Uop;

/// A decoded micro-operation.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    /// No operation.
    Nop,
    /// `rd = rs1 + imm`.
    AddImm {
        /// Sign-extended immediate.
        imm: i64,
    },
    /// `rd = rs1 + rs2`.
    Add,
    /// `rd = rs1 - rs2`.
    Sub,
    /// `rd = rs1 * rs2` (wrapping).
    Mul,
    /// `rd = mem[rs1 + offset]`.
    Load {
        /// Address offset from the base register.
        offset: i64,
        /// Access width in bytes.
        size: u16,
    },
    /// Address half of a store: computes `mem[rs1 + offset]`.
    StoreAddress {
        /// Address offset from the base register.
        offset: i64,
        /// Access width in bytes.
        size: u16,
    },
    /// Data half of a store: carries the value of rs2.
    StoreData,
    /// Branch if `rs1 == rs2`, pc-relative byte offset.
    BranchEq {
        /// Byte offset from the branch address.
        offset: i64,
    },
    /// Branch if `rs1 != rs2`, pc-relative byte offset.
    BranchNe {
        /// Byte offset from the branch address.
        offset: i64,
    },
    /// Unconditional pc-relative jump.
    Jump {
        /// Byte offset from the jump address.
        offset: i64,
    },
    /// Supervisor call with an immediate code.
    Syscall {
        /// Syscall code (0 = exit, 1 = yield).
        code: u16,
    },
}

impl Op {
    /// Stable mnemonic, used by opcode-keyed configuration entries.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::Nop => "nop",
            Op::AddImm { .. } => "addi",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::Load { .. } => "ld",
            Op::StoreAddress { .. } => "st.addr",
            Op::StoreData => "st.data",
            Op::BranchEq { .. } => "beq",
            Op::BranchNe { .. } => "bne",
            Op::Jump { .. } => "jmp",
            Op::Syscall { .. } => "sys",
        }
    }
}

impl Uop {
    /// Computes memory targets for loads and store-address uops.
    ///
    /// Requires the base operand; a no-op for other operations.
    pub fn generate_addresses(&mut self) {
        let (offset, size) = match self.op {
            Op::Load { offset, size } | Op::StoreAddress { offset, size } => (offset, size),
            _ => return,
        };
        if !self.targets.is_empty() {
            return; // already generated
        }
        let base = self.operands[0]
            .as_ref()
            .expect("address generation before base operand arrived")
            .as_u64();
        let vaddr = base.wrapping_add(offset as u64);
        self.targets.push(MemoryTarget { vaddr, size });
        self.data.push(None);
    }

    /// Executes the operation against the supplied operands.
    ///
    /// Sets `executed`, fills `results`, resolves branch direction and target,
    /// and raises any operation-level exception on the uop itself.
    pub fn execute(&mut self) {
        debug_assert!(!self.executed, "uop executed twice");

        let operand = |i: usize| -> u64 {
            self.operands[i]
                .as_ref()
                .expect("execution before operands arrived")
                .as_u64()
        };

        match self.op {
            Op::Nop | Op::StoreAddress { .. } => {}
            Op::AddImm { imm } => {
                self.results[0] = RegisterValue::from_u64(operand(0).wrapping_add(imm as u64));
            }
            Op::Add => {
                self.results[0] = RegisterValue::from_u64(operand(0).wrapping_add(operand(1)));
            }
            Op::Sub => {
                self.results[0] = RegisterValue::from_u64(operand(0).wrapping_sub(operand(1)));
            }
            Op::Mul => {
                self.results[0] = RegisterValue::from_u64(operand(0).wrapping_mul(operand(1)));
            }
            Op::Load { .. } => {
                // An invalid data slot is a faulty memory response.
                match self.data.first().and_then(|d| d.as_ref()) {
                    Some(value) if value.is_valid() => {
                        self.results[0] = RegisterValue::from_u64(value.as_u64());
                    }
                    _ => self.exception = Some(ExceptionKind::DataAbort),
                }
            }
            Op::StoreData => {}
            Op::BranchEq { offset } => self.resolve_branch(operand(0) == operand(1), offset),
            Op::BranchNe { offset } => self.resolve_branch(operand(0) != operand(1), offset),
            Op::Jump { offset } => self.resolve_branch(true, offset),
            Op::Syscall { .. } => {
                self.exception = Some(ExceptionKind::SupervisorCall);
            }
        }

        self.executed = true;
    }

    /// The value a store-data uop carries to memory.
    pub fn store_payload(&self) -> RegisterValue {
        debug_assert!(self.is_store_data());
        self.operands[0]
            .as_ref()
            .cloned()
            .expect("store data read before operand arrived")
    }

    /// Syscall code carried by a supervisor-call uop, if it is one.
    pub fn syscall_code(&self) -> Option<u16> {
        match self.op {
            Op::Syscall { code } => Some(code),
            _ => None,
        }
    }

    fn resolve_branch(&mut self, taken: bool, offset: i64) {
        self.branch_taken = taken;
        self.branch_target = if taken {
            self.address.wrapping_add(offset as u64)
        } else {
            self.address.wrapping_add(4)
        };
    }
}
