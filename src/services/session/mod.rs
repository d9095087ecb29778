//! Analysis Sessions
//!
//! Per-project owner of the in-flight analysis: start, stop, progress
//! fan-out and reconnect handling.

mod actor;
pub mod manager;

pub use actor::{StartOutcome, StopOutcome};
pub use manager::AnalysisSessionManager;
