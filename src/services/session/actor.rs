//! Session Actor
//!
//! One task per project owns the [`SessionMachine`], the open progress
//! stream and the reconnect policy. Commands from manager handles and
//! transport work are multiplexed by a single biased `select!`, so a stop
//! request always wins over a pending read.
//!
//! Every stream taken out of [`Work`] is closed exactly once, whether the
//! session reached a terminal state, was cancelled, or the peer ended it.

use std::pin::Pin;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Sleep;
use tracing::{debug, error, info, warn};

use code_historian_core::{AnalysisState, ProgressEvent, Session, SessionMachine, Transition};

use crate::models::api::StartAnalysisRequest;
use crate::models::settings::HistorianSettings;
use crate::services::hub::{SessionUpdate, SubscriberHub};
use crate::services::recovery::{
    NotificationManager, PromptOutcome, RecoveryAction, RecoveryDecision, RecoveryPolicy,
    RecoveryPrompt, StatusNotice,
};
use crate::services::transport::{AnalysisTransport, EventStream};
use crate::storage::config::SettingsProvider;
use crate::utils::error::{HistorianError, HistorianResult};

/// Result of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new session is starting
    Started,
    /// A session is already starting or running; nothing changed
    AlreadyRunning,
}

/// Result of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The active session was cancelled
    Cancelled,
    /// Nothing was starting or running
    NotActive,
}

pub(crate) enum Command {
    Start {
        reply: Option<oneshot::Sender<StartOutcome>>,
    },
    Stop {
        reply: oneshot::Sender<StopOutcome>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

type StartFuture = BoxFuture<'static, HistorianResult<(Session, Box<dyn EventStream>)>>;
type ReopenFuture = BoxFuture<'static, HistorianResult<Box<dyn EventStream>>>;

/// What the actor is waiting on besides commands
enum Work {
    Idle,
    Starting(StartFuture),
    Streaming(Box<dyn EventStream>),
    Backoff(Pin<Box<Sleep>>),
    Reopening(ReopenFuture),
}

enum WorkOutcome {
    Started(HistorianResult<(Session, Box<dyn EventStream>)>),
    Event(Option<ProgressEvent>),
    BackoffElapsed,
    Reopened(HistorianResult<Box<dyn EventStream>>),
}

/// Wait for the current piece of work. Cancel-safe: every in-flight future
/// lives in `work`, not in this call.
async fn next_work(work: &mut Work) -> WorkOutcome {
    match work {
        Work::Idle => std::future::pending().await,
        Work::Starting(start) => WorkOutcome::Started(start.await),
        Work::Streaming(stream) => WorkOutcome::Event(stream.next_event().await),
        Work::Backoff(sleep) => {
            sleep.await;
            WorkOutcome::BackoffElapsed
        }
        Work::Reopening(reopen) => WorkOutcome::Reopened(reopen.await),
    }
}

/// Forward status notices one at a time until the actor goes away.
async fn deliver_notices(
    notifications: Arc<NotificationManager>,
    mut rx: mpsc::UnboundedReceiver<StatusNotice>,
) {
    while let Some(notice) = rx.recv().await {
        notifications.status(notice).await;
    }
}

pub(crate) struct SessionActor {
    project_path: String,
    transport: Arc<dyn AnalysisTransport>,
    settings: Arc<dyn SettingsProvider>,
    notifications: Arc<NotificationManager>,
    hub: Arc<SubscriberHub>,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Lets prompt tasks request a retry without keeping the actor alive
    retry_tx: mpsc::WeakUnboundedSender<Command>,
    /// Status notices, delivered in order by a single task
    notices: mpsc::UnboundedSender<StatusNotice>,
    machine: SessionMachine,
    policy: RecoveryPolicy,
    work: Work,
}

impl SessionActor {
    pub(crate) fn new(
        project_path: String,
        transport: Arc<dyn AnalysisTransport>,
        settings: Arc<dyn SettingsProvider>,
        notifications: Arc<NotificationManager>,
        hub: Arc<SubscriberHub>,
        commands: mpsc::UnboundedReceiver<Command>,
        retry_tx: mpsc::WeakUnboundedSender<Command>,
    ) -> Self {
        let reconnect = settings.settings().reconnect;
        let (notices, notice_rx) = mpsc::unbounded_channel();
        tokio::spawn(deliver_notices(notifications.clone(), notice_rx));

        Self {
            project_path,
            transport,
            settings,
            notifications,
            hub,
            commands,
            retry_tx,
            notices,
            machine: SessionMachine::new(),
            policy: RecoveryPolicy::new(reconnect),
            work: Work::Idle,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("Session manager running for {}", self.project_path);

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Start { reply }) => {
                        let outcome = self.handle_start();
                        if let Some(reply) = reply {
                            let _ = reply.send(outcome);
                        }
                    }
                    Some(Command::Stop { reply }) => {
                        let outcome = self.handle_stop().await;
                        let _ = reply.send(outcome);
                    }
                    Some(Command::Shutdown { reply }) => {
                        self.teardown().await;
                        let _ = reply.send(());
                        return;
                    }
                    None => {
                        debug!("All handles for {} dropped", self.project_path);
                        self.teardown().await;
                        return;
                    }
                },

                outcome = next_work(&mut self.work) => self.handle_work(outcome).await,
            }
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn handle_start(&mut self) -> StartOutcome {
        if self.machine.state().is_active() {
            warn!(
                "Analysis of {} already {}, ignoring start",
                self.project_path,
                self.machine.state().name()
            );
            return StartOutcome::AlreadyRunning;
        }

        let settings = self.settings.settings();
        self.policy.reset(settings.reconnect.clone());
        self.transition(Transition::Start);
        info!("Starting analysis of {}", self.project_path);
        self.work = Work::Starting(self.start_future(&settings));
        StartOutcome::Started
    }

    async fn handle_stop(&mut self) -> StopOutcome {
        if !self.machine.state().is_active() {
            debug!(
                "Stop for {} while {}, nothing to cancel",
                self.project_path,
                self.machine.state().name()
            );
            return StopOutcome::NotActive;
        }

        self.release_work().await;
        self.transition(Transition::Cancel);
        info!("Analysis of {} cancelled", self.project_path);
        StopOutcome::Cancelled
    }

    async fn teardown(&mut self) {
        let was_active = self.machine.state().is_active();
        self.release_work().await;
        if was_active {
            self.transition(Transition::Cancel);
        }
        self.hub.close();
        info!("Session manager for {} shut down", self.project_path);
    }

    // ========================================================================
    // Transport work
    // ========================================================================

    async fn handle_work(&mut self, outcome: WorkOutcome) {
        match outcome {
            WorkOutcome::Started(result) => {
                self.work = Work::Idle;
                match result {
                    Ok((session, stream)) => self.on_connected(session, stream).await,
                    Err(e) => {
                        let retryable = e.is_retryable();
                        self.fail(e.to_string(), retryable);
                    }
                }
            }
            WorkOutcome::Event(Some(event)) => self.on_event(event).await,
            WorkOutcome::Event(None) => self.on_stream_ended().await,
            WorkOutcome::BackoffElapsed => self.reopen(),
            WorkOutcome::Reopened(result) => {
                self.work = Work::Idle;
                self.on_reopened(result);
            }
        }
    }

    async fn on_connected(&mut self, session: Session, mut stream: Box<dyn EventStream>) {
        let session_id = session.session_id.clone();
        match self.machine.attach(session) {
            Ok(_) => {
                info!(
                    "Analysis of {} running as session {}",
                    self.project_path, session_id
                );
                self.publish();
                self.work = Work::Streaming(stream);
            }
            Err(e) => {
                error!("Dropping stream for session {}: {}", session_id, e);
                stream.close().await;
            }
        }
    }

    async fn on_event(&mut self, event: ProgressEvent) {
        let Some(session_id) = self.machine.session_id().map(str::to_string) else {
            return;
        };
        self.policy.on_stream_healthy();

        match self.machine.on_event(&session_id, event) {
            Ok(Some(state)) => {
                self.publish();
                match state {
                    AnalysisState::Completed => {
                        self.release_work().await;
                        info!("Analysis of {} completed", self.project_path);
                        self.notify_status(StatusNotice::AnalysisCompleted);
                    }
                    AnalysisState::Error { message } => {
                        self.release_work().await;
                        error!("Analysis of {} failed: {}", self.project_path, message);
                        self.offer_recovery(message, true);
                    }
                    _ => {}
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Ignoring event for session {}: {}", session_id, e),
        }
    }

    async fn on_stream_ended(&mut self) {
        self.release_work().await;
        if !matches!(self.machine.state(), AnalysisState::Running { .. }) {
            return;
        }
        warn!(
            "Progress stream for {} ended without a result",
            self.project_path
        );
        let decision = self.policy.on_unexpected_close();
        self.apply_decision(decision);
    }

    fn reopen(&mut self) {
        let Some(session_id) = self.machine.session_id().map(str::to_string) else {
            self.fail("no session to reconnect".to_string(), true);
            return;
        };
        debug!(
            "Reopening stream for session {} (attempt {})",
            session_id,
            self.policy.attempts()
        );
        let transport = self.transport.clone();
        self.work = Work::Reopening(Box::pin(async move {
            transport.open_stream(&session_id).await
        }));
    }

    fn on_reopened(&mut self, result: HistorianResult<Box<dyn EventStream>>) {
        match result {
            Ok(stream) => {
                info!("Progress stream for {} reopened", self.project_path);
                self.work = Work::Streaming(stream);
            }
            Err(HistorianError::SessionExpired(reason)) => {
                info!(
                    "Session for {} is gone ({}), starting a new one",
                    self.project_path, reason
                );
                self.transition(Transition::Restart);
                let settings = self.settings.settings();
                self.work = Work::Starting(self.start_future(&settings));
            }
            Err(e) if !e.is_retryable() => self.fail(e.to_string(), false),
            Err(e) => {
                warn!("Reconnect for {} failed: {}", self.project_path, e);
                let decision = self.policy.on_reconnect_failed();
                self.apply_decision(decision);
            }
        }
    }

    fn apply_decision(&mut self, decision: RecoveryDecision) {
        match decision {
            RecoveryDecision::Reconnect { attempt, delay } => {
                warn!(
                    "Reconnecting {} in {:?} (attempt {}/{})",
                    self.project_path,
                    delay,
                    attempt,
                    self.policy.max_attempts()
                );
                self.notify_status(StatusNotice::NetworkRecovery {
                    attempt,
                    max_attempts: self.policy.max_attempts(),
                });
                self.work = Work::Backoff(Box::pin(tokio::time::sleep(delay)));
            }
            RecoveryDecision::GiveUp { message } => {
                error!(
                    "Giving up on {} after {} reconnect attempts",
                    self.project_path,
                    self.policy.attempts()
                );
                self.fail(message, true);
            }
        }
    }

    fn start_future(&self, settings: &HistorianSettings) -> StartFuture {
        let transport = self.transport.clone();
        let project_path = self.project_path.clone();
        let request = StartAnalysisRequest::from_settings(project_path.clone(), settings);
        let timeout = settings.start_timeout();

        Box::pin(async move {
            let response = tokio::time::timeout(timeout, transport.start(&request))
                .await
                .map_err(|_| {
                    HistorianError::network(format!(
                        "start request timed out after {}s",
                        timeout.as_secs()
                    ))
                })??;
            let session = Session::new(
                response.id,
                project_path,
                response.start_time.as_deref(),
            );
            let stream = transport.open_stream(&session.session_id).await?;
            Ok::<_, HistorianError>((session, stream))
        })
    }

    /// Drop the current work, closing the stream if one is open.
    async fn release_work(&mut self) {
        if let Work::Streaming(mut stream) = std::mem::replace(&mut self.work, Work::Idle) {
            stream.close().await;
        }
    }

    // ========================================================================
    // State and notifications
    // ========================================================================

    fn transition(&mut self, transition: Transition) {
        match self.machine.apply(transition) {
            Ok(Some(_)) => self.publish(),
            Ok(None) => {}
            Err(e) => error!("Rejected transition for {}: {}", self.project_path, e),
        }
    }

    fn publish(&self) {
        self.hub.publish(SessionUpdate {
            session_id: self.machine.session_id().map(str::to_string),
            state: self.machine.state().clone(),
        });
    }

    fn fail(&mut self, message: String, retryable: bool) {
        error!("Analysis of {} failed: {}", self.project_path, message);
        self.transition(Transition::Fail(message.clone()));
        self.offer_recovery(message, retryable);
    }

    fn notify_status(&self, notice: StatusNotice) {
        if self.notices.send(notice).is_err() {
            debug!("Status notice for {} dropped", self.project_path);
        }
    }

    fn offer_recovery(&self, message: String, retryable: bool) {
        let notifications = self.notifications.clone();
        let retry_tx = self.retry_tx.clone();
        let project_path = self.project_path.clone();

        tokio::spawn(async move {
            let outcome = notifications
                .prompt(RecoveryPrompt::ErrorRecovery { message, retryable })
                .await;
            match outcome {
                PromptOutcome::Answered(RecoveryAction::Retry) => match retry_tx.upgrade() {
                    Some(tx) => {
                        info!("Retrying analysis of {}", project_path);
                        let _ = tx.send(Command::Start { reply: None });
                    }
                    None => debug!("Retry for {} after shutdown ignored", project_path),
                },
                other => debug!("Recovery prompt for {} ended: {:?}", project_path, other),
            }
        });
    }
}
