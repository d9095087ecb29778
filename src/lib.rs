//! Code Historian Client
//!
//! Client-side integration layer for the Code Historian analysis server.
//! It includes:
//! - The per-project analysis session manager
//! - REST and WebSocket transport
//! - Subscriber fan-out and UI projections
//! - Settings storage, recovery prompts and utilities
//!
//! The library logs through `tracing` and never installs a subscriber.

pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use code_historian_core::{AnalysisState, CoreError, ProgressEvent, Session, Transition};
pub use models::settings::{HistorianSettings, NotificationSettings, ReconnectConfig, SettingsUpdate};
pub use services::{
    AnalysisSessionManager, AnalysisTransport, EventStream, HttpTransport, Notifier,
    SessionUpdate, StartOutcome, StopOutcome, Subscription,
};
pub use storage::config::{ConfigService, SettingsProvider};
pub use utils::error::{HistorianError, HistorianResult};
