//! User Notifications
//!
//! The host UI implements [`Notifier`]; [`NotificationManager`] sits in front
//! of it and applies the user's notification settings and suppresses a
//! prompt that is identical to one still waiting for an answer.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::storage::config::SettingsProvider;

/// Button offered on a recovery prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoveryAction {
    Retry,
    Ignore,
}

impl RecoveryAction {
    pub fn label(&self) -> &'static str {
        match self {
            RecoveryAction::Retry => "Retry",
            RecoveryAction::Ignore => "Ignore",
        }
    }
}

/// A prompt that waits for the user's choice
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecoveryPrompt {
    /// An analysis ended in an error
    ErrorRecovery { message: String, retryable: bool },
}

impl RecoveryPrompt {
    /// Buttons to show, in display order.
    pub fn actions(&self) -> &'static [RecoveryAction] {
        match self {
            RecoveryPrompt::ErrorRecovery { retryable: true, .. } => {
                &[RecoveryAction::Retry, RecoveryAction::Ignore]
            }
            RecoveryPrompt::ErrorRecovery { retryable: false, .. } => &[RecoveryAction::Ignore],
        }
    }
}

impl fmt::Display for RecoveryPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryPrompt::ErrorRecovery { message, .. } => {
                write!(f, "Code Historian analysis failed: {}", message)
            }
        }
    }
}

/// A transient, non-blocking status message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusNotice {
    NetworkRecovery { attempt: u32, max_attempts: u32 },
    AnalysisCompleted,
}

impl fmt::Display for StatusNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusNotice::NetworkRecovery {
                attempt,
                max_attempts,
            } => write!(
                f,
                "Network recovery attempt {} of {}",
                attempt, max_attempts
            ),
            StatusNotice::AnalysisCompleted => write!(f, "Code Historian analysis completed"),
        }
    }
}

/// Host UI surface for prompts and status notices.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show_status(&self, notice: StatusNotice);

    /// Show `prompt` and wait for the user. `None` means dismissed.
    async fn prompt(&self, prompt: RecoveryPrompt) -> Option<RecoveryAction>;
}

/// What became of a prompt request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptOutcome {
    Answered(RecoveryAction),
    Dismissed,
    /// Not shown: notifications are off or an identical prompt is pending
    Suppressed,
}

/// Settings-aware front for a [`Notifier`].
pub struct NotificationManager {
    notifier: Arc<dyn Notifier>,
    settings: Arc<dyn SettingsProvider>,
    pending: Mutex<HashSet<RecoveryPrompt>>,
}

/// Removes a prompt from the pending set when the prompt future finishes or
/// is dropped.
struct PendingGuard<'a> {
    pending: &'a Mutex<HashSet<RecoveryPrompt>>,
    prompt: RecoveryPrompt,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.prompt);
    }
}

impl NotificationManager {
    pub fn new(notifier: Arc<dyn Notifier>, settings: Arc<dyn SettingsProvider>) -> Self {
        Self {
            notifier,
            settings,
            pending: Mutex::new(HashSet::new()),
        }
    }

    /// Show a status notice unless notifications or status notices are off.
    pub async fn status(&self, notice: StatusNotice) {
        let settings = self.settings.settings().notifications;
        if !settings.enabled || !settings.show_in_status_bar {
            debug!("Status notice suppressed by settings: {}", notice);
            return;
        }
        self.notifier.show_status(notice).await;
    }

    /// Show a recovery prompt and wait for the answer.
    pub async fn prompt(&self, prompt: RecoveryPrompt) -> PromptOutcome {
        if !self.settings.settings().notifications.enabled {
            debug!("Prompt suppressed by settings: {}", prompt);
            return PromptOutcome::Suppressed;
        }

        let inserted = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(prompt.clone());
        if !inserted {
            debug!("Identical prompt already pending: {}", prompt);
            return PromptOutcome::Suppressed;
        }
        let _guard = PendingGuard {
            pending: &self.pending,
            prompt: prompt.clone(),
        };

        let offered = prompt.actions();
        match self.notifier.prompt(prompt).await {
            Some(action) if offered.contains(&action) => PromptOutcome::Answered(action),
            Some(action) => {
                warn!("Notifier returned {} which was not offered", action.label());
                PromptOutcome::Answered(RecoveryAction::Ignore)
            }
            None => PromptOutcome::Dismissed,
        }
    }

    pub fn pending_prompts(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
