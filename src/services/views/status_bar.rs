//! Status Bar Projection
//!
//! Renders the session state as a status bar entry. Hidden while idle.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use code_historian_core::AnalysisState;

use crate::services::hub::{SubscriberHub, Subscription};
use crate::services::session::AnalysisSessionManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusIcon {
    Sync,
    Check,
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusBarItem {
    pub text: String,
    pub icon: StatusIcon,
    pub tooltip: Option<String>,
}

impl StatusBarItem {
    /// The entry for `state`, or `None` when the item should be hidden.
    pub fn from_state(state: &AnalysisState) -> Option<Self> {
        let item = match state {
            AnalysisState::Idle => return None,
            AnalysisState::Starting => Self {
                text: "Analysis Starting...".to_string(),
                icon: StatusIcon::Sync,
                tooltip: None,
            },
            AnalysisState::Running { progress } => Self {
                text: format!("Analysis Progress: {}%", (progress * 100.0).round() as u32),
                icon: StatusIcon::Sync,
                tooltip: None,
            },
            AnalysisState::Completed => Self {
                text: "Analysis Complete".to_string(),
                icon: StatusIcon::Check,
                tooltip: None,
            },
            AnalysisState::Error { message } => Self {
                text: "Analysis Failed".to_string(),
                icon: StatusIcon::Error,
                tooltip: Some(message.clone()),
            },
            AnalysisState::Cancelled => Self {
                text: "Analysis Cancelled".to_string(),
                icon: StatusIcon::Warning,
                tooltip: None,
            },
        };
        Some(item)
    }
}

/// A hub consumer that keeps the latest [`StatusBarItem`]. Dropping the view
/// removes its subscription.
pub struct StatusBarView {
    item: Arc<Mutex<Option<StatusBarItem>>>,
    subscription: Subscription,
    hub: Weak<SubscriberHub>,
}

impl StatusBarView {
    pub fn attach(manager: &AnalysisSessionManager) -> Self {
        let item = Arc::new(Mutex::new(None));
        let sink = item.clone();
        let subscription = manager.subscribe(move |update| {
            *sink.lock().unwrap_or_else(PoisonError::into_inner) =
                StatusBarItem::from_state(&update.state);
        });
        Self {
            item,
            subscription,
            hub: manager.hub_weak(),
        }
    }

    /// The entry to show, or `None` while hidden.
    pub fn item(&self) -> Option<StatusBarItem> {
        self.item
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn detach(self) {
        drop(self);
    }
}

impl Drop for StatusBarView {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.subscription);
        }
    }
}
