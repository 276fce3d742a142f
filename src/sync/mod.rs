//! Overlap-safe incremental sync: window planning, run log, execution.

pub mod log;
pub mod orders;
pub mod planner;
pub mod window;

pub use log::{SyncLogEntry, SyncLogStore, SyncRunStatus};
pub use orders::OrderSync;
pub use planner::{ExecutionReport, SyncError, SyncExecutor, SyncPlanner};
pub use window::{DEFAULT_LOOKBACK_SECONDS, SyncWindow, plan_window};
