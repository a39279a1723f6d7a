//! Architecture contract.
//!
//! ISA decoding and instruction semantics live outside the core; the pipeline
//! consumes them through this trait. The bundled `demo` module implements a
//! minimal fixed-width ISA so the core runs end-to-end in tests and the CLI.

pub mod demo;

use crate::common::{ExceptionResult, RegisterFileKind, RegisterFileSet};
use crate::uop::{InstructionGroup, Uop};

/// An architectural register file: its kind and architectural register count.
#[derive(Clone, Copy, Debug)]
pub struct ArchRegisterFile {
    /// Register file kind.
    pub kind: RegisterFileKind,
    /// Number of architectural registers in the file.
    pub count: u16,
}

/// The ISA contract the core consumes.
pub trait Architecture {
    /// Architectural register files this ISA exposes.
    fn register_files(&self) -> Vec<ArchRegisterFile>;

    /// Quick branch test on a raw instruction word, used by fetch to decide
    /// whether to consult the branch predictor.
    fn is_branch_word(&self, word: u32) -> bool;

    /// Cracks one instruction word into micro-ops.
    ///
    /// Invalid encodings yield a single uop carrying `IllegalInstruction`;
    /// the pipeline routes it to commit where the exception is raised.
    fn decode(&self, word: u32, address: u64) -> Vec<Uop>;

    /// Advances architectural timer registers at the top of each cycle.
    fn update_system_timers(&self, files: &mut RegisterFileSet, ticks: u64) {
        let _ = (files, ticks);
    }

    /// Bypass latency from a producer group to a consumer group.
    ///
    /// `0` forwards immediately, `-1` forbids forwarding (the consumer waits
    /// for the register file), and `k > 0` delays the forward by `k` cycles.
    fn bypass_latency(&self, producer: InstructionGroup, consumer: InstructionGroup) -> i8 {
        let _ = (producer, consumer);
        0
    }
}

/// Exception handler contract.
///
/// The reorder buffer surfaces at most one exception; the handler may take
/// several cycles and finally reports how the core should proceed.
pub trait ExceptionHandler {
    /// Latches the exception-raising uop's state for processing.
    fn register_exception(&mut self, uop: &Uop);

    /// Advances handling by one cycle; `Some` when resolution is complete.
    fn tick(&mut self, files: &RegisterFileSet) -> Option<ExceptionResult>;
}
