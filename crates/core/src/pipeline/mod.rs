//! Pipeline units of the out-of-order core.
//!
//! Fetch → Decode → Rename → Dispatch/Issue → Execute → (LSQ) → Writeback,
//! with the reorder buffer imposing program-order commit over the lot.

pub mod buffer;
pub mod decode;
pub mod dispatch;
pub mod execute;
pub mod fetch;
pub mod lsq;
pub mod ports;
pub mod rat;
pub mod rename;
pub mod rob;
pub mod writeback;

pub use buffer::PipelineBuffer;
pub use decode::DecodeUnit;
pub use dispatch::DispatchIssueUnit;
pub use execute::{ExecuteEffect, ExecuteUnit};
pub use fetch::{FetchUnit, FetchedMacro};
pub use lsq::{CompletionOrder, LoadStoreQueue, ViolatingLoad};
pub use ports::{BalancedPortAllocator, PortAllocator};
pub use rat::RegisterAliasTable;
pub use rename::RenameUnit;
pub use rob::{CommitOutcome, ReorderBuffer};
pub use writeback::WritebackUnit;
