//! Code Historian Core
//!
//! Foundational types for the Code Historian client workspace: the analysis
//! lifecycle state machine, the progress stream event model and the core error
//! types. This crate has no dependency on transports, async runtimes or
//! settings storage.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `event` - Progress stream frames (`ProgressEvent`)
//! - `session` - Server-tracked session record (`Session`)
//! - `state` - Analysis lifecycle (`AnalysisState`, `Transition`, `SessionMachine`)

pub mod error;
pub mod event;
pub mod session;
pub mod state;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Stream Events ──────────────────────────────────────────────────────
pub use event::ProgressEvent;

// ── Session Lifecycle ──────────────────────────────────────────────────
pub use session::Session;
pub use state::{AnalysisState, SessionMachine, Transition};
