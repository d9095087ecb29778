//! Analysis State Machine
//!
//! The canonical lifecycle of one analysis session:
//!
//! ```text
//! Idle ─start─▶ Starting ─connected─▶ Running(p) ─complete─▶ Completed
//!                  │                    │  ▲ │
//!                  │                    │  └─┘ progress (clamped, never regresses)
//!                  ├──fail / cancel─────┴──────────▶ Error(msg) / Cancelled
//!                  ▲                    │
//!                  └──────restart───────┘  (server forgot the session id)
//! ```
//!
//! `Completed`, `Error` and `Cancelled` are terminal for their session: the
//! only way out is `start`, which begins a new session. Every other
//! transition out of a terminal state is rejected with
//! [`CoreError::InvalidTransition`].

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::event::ProgressEvent;
use crate::session::Session;

/// Current state of a project's analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisState {
    #[default]
    Idle,
    Starting,
    Running {
        progress: f64,
    },
    Completed,
    Error {
        message: String,
    },
    Cancelled,
}

impl AnalysisState {
    /// Short lowercase name, used in logs and transition errors.
    pub fn name(&self) -> &'static str {
        match self {
            AnalysisState::Idle => "idle",
            AnalysisState::Starting => "starting",
            AnalysisState::Running { .. } => "running",
            AnalysisState::Completed => "completed",
            AnalysisState::Error { .. } => "error",
            AnalysisState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AnalysisState::Completed | AnalysisState::Error { .. } | AnalysisState::Cancelled
        )
    }

    /// `Starting` or `Running`: a session is in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, AnalysisState::Starting | AnalysisState::Running { .. })
    }

    pub fn progress(&self) -> Option<f64> {
        match self {
            AnalysisState::Running { progress } => Some(*progress),
            AnalysisState::Completed => Some(1.0),
            _ => None,
        }
    }

    /// Compute the state that `transition` leads to.
    pub fn apply(&self, transition: Transition) -> CoreResult<AnalysisState> {
        use AnalysisState::*;

        match (self, transition) {
            (Idle | Completed | Error { .. } | Cancelled, Transition::Start) => Ok(Starting),
            (Starting, Transition::Connected) => Ok(Running { progress: 0.0 }),
            (Running { progress }, Transition::Progress(next)) => Ok(Running {
                progress: clamp_progress(*progress, next),
            }),
            (Running { .. }, Transition::Complete) => Ok(Completed),
            (Starting | Running { .. }, Transition::Fail(message)) => Ok(Error { message }),
            (Starting | Running { .. }, Transition::Cancel) => Ok(Cancelled),
            (Running { .. }, Transition::Restart) => Ok(Starting),
            (from, transition) => Err(CoreError::invalid_transition(
                from.name(),
                transition.name(),
            )),
        }
    }
}

/// Keep progress inside `[0, 1]` and never below the last visible value.
fn clamp_progress(last: f64, next: f64) -> f64 {
    // f64::max ignores NaN, so a NaN `next` keeps `last`
    next.clamp(0.0, 1.0).max(last)
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Begin a new session
    Start,
    /// The server assigned an id and the stream is open
    Connected,
    Progress(f64),
    Complete,
    Fail(String),
    Cancel,
    /// Replace a session the server no longer recognizes with a fresh one
    Restart,
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Start => "start",
            Transition::Connected => "connected",
            Transition::Progress(_) => "progress",
            Transition::Complete => "complete",
            Transition::Fail(_) => "fail",
            Transition::Cancel => "cancel",
            Transition::Restart => "restart",
        }
    }
}

impl From<ProgressEvent> for Transition {
    fn from(event: ProgressEvent) -> Self {
        match event {
            ProgressEvent::Progress(p) => Transition::Progress(p),
            ProgressEvent::Completed => Transition::Complete,
            ProgressEvent::Error(message) => Transition::Fail(message),
        }
    }
}

/// Owns the state of one project's analysis and the session it belongs to.
///
/// Mutating methods return `Some(state)` when the visible state changed and
/// `None` when the input was absorbed without a visible change (a clamped
/// progress value, or an event for a session that is no longer current).
#[derive(Debug, Default)]
pub struct SessionMachine {
    state: AnalysisState,
    session: Option<Session>,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &AnalysisState {
        &self.state
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id.as_str())
    }

    /// Apply a transition, rejecting illegal ones.
    pub fn apply(&mut self, transition: Transition) -> CoreResult<Option<AnalysisState>> {
        let restarting = matches!(transition, Transition::Restart | Transition::Start);
        let next = self.state.apply(transition)?;
        if restarting {
            self.session = None;
        }
        if next == self.state {
            return Ok(None);
        }
        self.state = next.clone();
        Ok(Some(next))
    }

    /// Record the server-assigned session and move to `Running(0)`.
    pub fn attach(&mut self, session: Session) -> CoreResult<AnalysisState> {
        if self.state != AnalysisState::Starting {
            return Err(CoreError::invalid_transition(self.state.name(), "connected"));
        }
        self.session = Some(session);
        self.state = AnalysisState::Running { progress: 0.0 };
        Ok(self.state.clone())
    }

    /// Apply a stream event received for `session_id`.
    ///
    /// Events are only honored while `Running` and only for the current
    /// session; anything else is dropped.
    pub fn on_event(
        &mut self,
        session_id: &str,
        event: ProgressEvent,
    ) -> CoreResult<Option<AnalysisState>> {
        if self.session_id() != Some(session_id) {
            return Ok(None);
        }
        if !matches!(self.state, AnalysisState::Running { .. }) {
            return Ok(None);
        }
        self.apply(event.into())
    }
}
