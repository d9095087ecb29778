//! Reconnect Policy
//!
//! Decides what happens after the progress stream of a running session drops
//! without a terminal event: reconnect after an exponential backoff, or give
//! up once the attempt budget is spent.

use std::time::Duration;

use crate::models::settings::ReconnectConfig;

/// Error message of a session that exhausted its reconnect budget
pub const CONNECTION_LOST: &str = "connection lost";

/// Outcome of one recovery decision
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryDecision {
    /// Wait `delay`, then reopen. `attempt` is 1-based.
    Reconnect { attempt: u32, delay: Duration },
    /// Stop trying and fail the session with `message`
    GiveUp { message: String },
}

/// Bounded retry counter for one session.
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    config: ReconnectConfig,
    attempts: u32,
}

impl RecoveryPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// The stream ended without a terminal event.
    pub fn on_unexpected_close(&mut self) -> RecoveryDecision {
        self.next_attempt()
    }

    /// A reopen attempt failed with a retryable error.
    pub fn on_reconnect_failed(&mut self) -> RecoveryDecision {
        self.next_attempt()
    }

    /// A reopened stream delivered an event; the budget starts over.
    pub fn on_stream_healthy(&mut self) {
        self.attempts = 0;
    }

    /// Start over for a new session with possibly updated settings.
    pub fn reset(&mut self, config: ReconnectConfig) {
        self.config = config;
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    fn next_attempt(&mut self) -> RecoveryDecision {
        if self.attempts >= self.config.max_attempts {
            return RecoveryDecision::GiveUp {
                message: CONNECTION_LOST.to_string(),
            };
        }
        self.attempts += 1;
        RecoveryDecision::Reconnect {
            attempt: self.attempts,
            delay: self.config.delay_for_attempt(self.attempts),
        }
    }
}
