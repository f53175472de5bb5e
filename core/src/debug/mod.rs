//! Dispatch timeline, state diffs and timing metrics.

mod diff;
mod history;
mod manager;

pub use diff::{diff_states, ChangeKind, StateChange};
pub use history::DebugHistoryEntry;
pub use manager::{DebugExport, DebugMetrics, StateDebugManager};
