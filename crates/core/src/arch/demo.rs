//! Bundled demo ISA: fixed 32-bit words, 16 general-purpose registers.
//!
//! Word layout (little endian): `opcode[7:0] a[15:8] b[23:16] c[31:24]`.
//! Stores crack into an address uop and a data uop sharing the macro-op id,
//! which exercises the split-store paths of the LSQ and reorder buffer.

use crate::common::{
    ExceptionKind, ExceptionResult, Register, RegisterFileKind, RegisterFileSet,
};
use crate::uop::{InstructionGroup, Op, Uop};

use super::{ArchRegisterFile, Architecture, ExceptionHandler};

/// Architectural general-purpose register count.
pub const GP_REGISTERS: u16 = 16;

/// Architectural system register count (cycle counter, reserved slot).
pub const SYSTEM_REGISTERS: u16 = 2;

const OP_NOP: u8 = 0x00;
const OP_ADDI: u8 = 0x10;
const OP_ADD: u8 = 0x11;
const OP_SUB: u8 = 0x12;
const OP_MUL: u8 = 0x13;
const OP_LD: u8 = 0x20;
const OP_LDV: u8 = 0x22;
const OP_ST: u8 = 0x28;
const OP_BEQ: u8 = 0x30;
const OP_BNE: u8 = 0x31;
const OP_JMP: u8 = 0x32;
const OP_SYS: u8 = 0x40;

/// The demo architecture.
#[derive(Default)]
pub struct DemoArchitecture;

impl DemoArchitecture {
    fn gp(tag: u8) -> Register {
        Register::new(RegisterFileKind::GeneralPurpose, (tag % GP_REGISTERS as u8) as u16)
    }
}

impl Architecture for DemoArchitecture {
    fn register_files(&self) -> Vec<ArchRegisterFile> {
        vec![
            ArchRegisterFile {
                kind: RegisterFileKind::GeneralPurpose,
                count: GP_REGISTERS,
            },
            ArchRegisterFile {
                kind: RegisterFileKind::System,
                count: SYSTEM_REGISTERS,
            },
        ]
    }

    fn is_branch_word(&self, word: u32) -> bool {
        matches!((word & 0xFF) as u8, OP_BEQ | OP_BNE | OP_JMP)
    }

    fn decode(&self, word: u32, address: u64) -> Vec<Uop> {
        let opcode = (word & 0xFF) as u8;
        let a = ((word >> 8) & 0xFF) as u8;
        let b = ((word >> 16) & 0xFF) as u8;
        let c = ((word >> 24) & 0xFF) as u8;
        let imm = c as i8 as i64;

        match opcode {
            OP_NOP => vec![Uop::new(
                address,
                Op::Nop,
                InstructionGroup::IntSimple,
                vec![],
                vec![],
            )],
            OP_ADDI => vec![Uop::new(
                address,
                Op::AddImm { imm },
                InstructionGroup::IntSimple,
                vec![Self::gp(b)],
                vec![Self::gp(a)],
            )],
            OP_ADD | OP_SUB => vec![Uop::new(
                address,
                if opcode == OP_ADD { Op::Add } else { Op::Sub },
                InstructionGroup::IntSimple,
                vec![Self::gp(b), Self::gp(c)],
                vec![Self::gp(a)],
            )],
            OP_MUL => vec![Uop::new(
                address,
                Op::Mul,
                InstructionGroup::IntMul,
                vec![Self::gp(b), Self::gp(c)],
                vec![Self::gp(a)],
            )],
            OP_LD => vec![Uop::new(
                address,
                Op::Load { offset: imm, size: 8 },
                InstructionGroup::Load,
                vec![Self::gp(b)],
                vec![Self::gp(a)],
            )],
            OP_LDV => vec![Uop::new(
                address,
                Op::Load { offset: imm, size: 16 },
                InstructionGroup::Load,
                vec![Self::gp(b)],
                vec![Self::gp(a)],
            )],
            OP_ST => {
                // Address uop owns the store queue entry; the data uop pairs
                // with it via a shared micro-op index.
                let mut addr_uop = Uop::new(
                    address,
                    Op::StoreAddress { offset: imm, size: 8 },
                    InstructionGroup::Store,
                    vec![Self::gp(b)],
                    vec![],
                );
                addr_uop.micro_idx = 0;
                addr_uop.micro_last = false;
                let mut data_uop = Uop::new(
                    address,
                    Op::StoreData,
                    InstructionGroup::Store,
                    vec![Self::gp(a)],
                    vec![],
                );
                data_uop.micro_idx = 0;
                data_uop.micro_last = true;
                vec![addr_uop, data_uop]
            }
            OP_BEQ | OP_BNE => {
                let offset = imm * 4;
                vec![Uop::new(
                    address,
                    if opcode == OP_BEQ {
                        Op::BranchEq { offset }
                    } else {
                        Op::BranchNe { offset }
                    },
                    InstructionGroup::Branch,
                    vec![Self::gp(a), Self::gp(b)],
                    vec![],
                )]
            }
            OP_JMP => vec![Uop::new(
                address,
                Op::Jump { offset: (a as i8 as i64) * 4 },
                InstructionGroup::Branch,
                vec![],
                vec![],
            )],
            OP_SYS => vec![Uop::new(
                address,
                Op::Syscall { code: a as u16 },
                InstructionGroup::System,
                vec![],
                vec![],
            )],
            _ => {
                let mut uop = Uop::new(address, Op::Nop, InstructionGroup::System, vec![], vec![]);
                uop.exception = Some(ExceptionKind::IllegalInstruction);
                vec![uop]
            }
        }
    }

    fn update_system_timers(&self, files: &mut RegisterFileSet, ticks: u64) {
        let cycle_reg = Register::new(RegisterFileKind::System, 0);
        files.set(cycle_reg, crate::common::RegisterValue::from_u64(ticks));
    }
}

/// Instruction encoders for building demo programs.
pub mod asm {
    use super::*;

    fn word(opcode: u8, a: u8, b: u8, c: u8) -> u32 {
        opcode as u32 | (a as u32) << 8 | (b as u32) << 16 | (c as u32) << 24
    }

    /// `nop`
    pub fn nop() -> u32 {
        word(OP_NOP, 0, 0, 0)
    }

    /// `rd = rs1 + imm`
    pub fn addi(rd: u8, rs1: u8, imm: i8) -> u32 {
        word(OP_ADDI, rd, rs1, imm as u8)
    }

    /// `rd = rs1 + rs2`
    pub fn add(rd: u8, rs1: u8, rs2: u8) -> u32 {
        word(OP_ADD, rd, rs1, rs2)
    }

    /// `rd = rs1 - rs2`
    pub fn sub(rd: u8, rs1: u8, rs2: u8) -> u32 {
        word(OP_SUB, rd, rs1, rs2)
    }

    /// `rd = rs1 * rs2`
    pub fn mul(rd: u8, rs1: u8, rs2: u8) -> u32 {
        word(OP_MUL, rd, rs1, rs2)
    }

    /// `rd = mem64[rs1 + imm]`
    pub fn ld(rd: u8, rs1: u8, imm: i8) -> u32 {
        word(OP_LD, rd, rs1, imm as u8)
    }

    /// `rd = mem128[rs1 + imm]` (result truncated to 64 bits)
    pub fn ldv(rd: u8, rs1: u8, imm: i8) -> u32 {
        word(OP_LDV, rd, rs1, imm as u8)
    }

    /// `mem64[rs1 + imm] = rs2`
    pub fn st(rs2: u8, rs1: u8, imm: i8) -> u32 {
        word(OP_ST, rs2, rs1, imm as u8)
    }

    /// Branch to `pc + imm*4` if `rs1 == rs2`.
    pub fn beq(rs1: u8, rs2: u8, imm: i8) -> u32 {
        word(OP_BEQ, rs1, rs2, imm as u8)
    }

    /// Branch to `pc + imm*4` if `rs1 != rs2`.
    pub fn bne(rs1: u8, rs2: u8, imm: i8) -> u32 {
        word(OP_BNE, rs1, rs2, imm as u8)
    }

    /// Jump to `pc + imm*4`.
    pub fn jmp(imm: i8) -> u32 {
        word(OP_JMP, imm as u8, 0, 0)
    }

    /// Supervisor call. Code 0 exits, code 1 yields.
    pub fn sys(code: u8) -> u32 {
        word(OP_SYS, code, 0, 0)
    }
}

/// Bundled exception handler.
///
/// Resolves every exception in a single cycle: `sys 0` halts the core,
/// `sys 1` yields (idle after syscall), other syscalls and breakpoints resume
/// at the next instruction, and everything else is fatal.
#[derive(Default)]
pub struct DemoExceptionHandler {
    pending: Option<(ExceptionKind, u64, Option<u16>)>,
}

impl ExceptionHandler for DemoExceptionHandler {
    fn register_exception(&mut self, uop: &Uop) {
        let kind = uop.exception.expect("registered uop carries no exception");
        self.pending = Some((kind, uop.address, uop.syscall_code()));
    }

    fn tick(&mut self, _files: &RegisterFileSet) -> Option<ExceptionResult> {
        let (kind, address, code) = self.pending.take()?;
        let result = match kind {
            ExceptionKind::SupervisorCall => match code {
                Some(0) => ExceptionResult::fatal(),
                Some(1) => {
                    let mut result = ExceptionResult::resume_at(address + 4);
                    result.idle_after_syscall = true;
                    result
                }
                _ => ExceptionResult::resume_at(address + 4),
            },
            ExceptionKind::Breakpoint => ExceptionResult::resume_at(address + 4),
            _ => ExceptionResult::fatal(),
        };
        Some(result)
    }
}
