//! Cycle-accurate out-of-order superscalar core simulator library.
//!
//! This crate implements the hard core of a modern superscalar CPU model:
//! 1. **Frontend:** Block fetch with branch prediction and a loop buffer, macro-op decode.
//! 2. **Rename:** Register alias table with free lists, history, and rollback.
//! 3. **Dispatch/Issue:** Scoreboard, dependency matrix, reservation stations, port allocation.
//! 4. **Backend:** Per-port execution pipelines, load/store queue with memory disambiguation,
//!    reorder buffer with in-order commit and precise-exception recovery.
//! 5. **Memory:** Packet-based MMU with bandwidth limits and cache-line splitting.
//!
//! ISA semantics, branch prediction, and the memory backend are consumed through
//! contracts (`arch::Architecture`, `branch::BranchPredictor`, `memory::Memory`);
//! minimal bundled implementations make the core runnable end-to-end.

/// Architecture contract (predecode, timers) and the bundled demo ISA.
pub mod arch;
/// Branch predictor contract and simple predictors.
pub mod branch;
/// Common types (registers, register files, exceptions).
pub mod common;
/// Simulator configuration (defaults, enums, hierarchical structures).
pub mod config;
/// Memory packets, MMU, and the fixed-latency backing store.
pub mod memory;
/// Pipeline units: fetch, decode, rename, dispatch/issue, execute, LSQ, ROB, writeback.
pub mod pipeline;
/// Simulation statistics collection and reporting.
pub mod stats;
/// Micro-op record, operation semantics, and the generational uop pool.
pub mod uop;

mod core;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// The out-of-order core; construct with `Core::new` and drive with `tick`.
pub use crate::core::{Core, CoreContext, CoreStatus};
