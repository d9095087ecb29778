//! Analysis Session Manager
//!
//! Cloneable handle to the actor that owns one project's analysis. All
//! handles of a project share the same actor and subscriber hub; dropping
//! the last handle (or calling [`AnalysisSessionManager::shutdown`]) cancels
//! the active session and clears the hub.

use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, oneshot};

use code_historian_core::AnalysisState;

use super::actor::{Command, SessionActor, StartOutcome, StopOutcome};
use crate::services::hub::{SessionUpdate, SubscriberHub, Subscription};
use crate::services::recovery::{NotificationManager, Notifier};
use crate::services::transport::AnalysisTransport;
use crate::storage::config::SettingsProvider;
use crate::utils::error::{HistorianError, HistorianResult};

/// Per-project analysis session manager.
#[derive(Clone)]
pub struct AnalysisSessionManager {
    project_path: Arc<str>,
    commands: mpsc::UnboundedSender<Command>,
    hub: Arc<SubscriberHub>,
}

impl AnalysisSessionManager {
    /// Spawn the session actor for `project_path` on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn spawn(
        project_path: impl Into<String>,
        transport: Arc<dyn AnalysisTransport>,
        settings: Arc<dyn SettingsProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let project_path = project_path.into();
        let (commands, rx) = mpsc::unbounded_channel();
        let hub = Arc::new(SubscriberHub::new());
        let notifications = Arc::new(NotificationManager::new(notifier, settings.clone()));

        let actor = SessionActor::new(
            project_path.clone(),
            transport,
            settings,
            notifications,
            hub.clone(),
            rx,
            commands.downgrade(),
        );
        tokio::spawn(actor.run());

        Self {
            project_path: project_path.into(),
            commands,
            hub,
        }
    }

    pub fn project_path(&self) -> &str {
        &self.project_path
    }

    /// Begin a new analysis unless one is already starting or running.
    ///
    /// Returns once the request is accepted; progress arrives through the
    /// subscribers.
    pub async fn start_analysis(&self) -> HistorianResult<StartOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start { reply: Some(reply) })?;
        rx.await.map_err(|_| actor_gone())
    }

    /// Cancel the active analysis. Idempotent.
    pub async fn stop_analysis(&self) -> HistorianResult<StopOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stop { reply })?;
        rx.await.map_err(|_| actor_gone())
    }

    /// Cancel any active analysis, clear all subscribers and stop the actor.
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::Shutdown { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Subscribe with a callback. The first call receives the current state.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&SessionUpdate) + Send + 'static,
    {
        self.hub.subscribe(callback)
    }

    /// Subscribe with a receiver. The first item is the current state.
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<SessionUpdate>) {
        self.hub.subscribe_channel()
    }

    /// Remove a subscription. Never affects the session.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.hub.unsubscribe(subscription)
    }

    pub fn current_state(&self) -> AnalysisState {
        self.hub.current().state
    }

    /// Current state together with its session id.
    pub fn current(&self) -> SessionUpdate {
        self.hub.current()
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    /// Hub reference for views that must not keep the session alive.
    pub(crate) fn hub_weak(&self) -> Weak<SubscriberHub> {
        Arc::downgrade(&self.hub)
    }

    fn send(&self, command: Command) -> HistorianResult<()> {
        self.commands.send(command).map_err(|_| actor_gone())
    }
}

fn actor_gone() -> HistorianError {
    HistorianError::internal("session manager has shut down")
}
