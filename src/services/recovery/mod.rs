//! Recovery Service
//!
//! Decides how a failed or interrupted analysis is recovered and tells the
//! user about it.
//!
//! ## Components
//! - **Policy**: bounded, backed-off reconnects after an unexpected stream end
//! - **Notifier**: recovery prompts and status notices, gated by settings

pub mod notifier;
pub mod policy;

pub use notifier::{
    NotificationManager, Notifier, PromptOutcome, RecoveryAction, RecoveryPrompt, StatusNotice,
};
pub use policy::{RecoveryDecision, RecoveryPolicy, CONNECTION_LOST};
