//! Progress Stream Events
//!
//! Decoding of the per-session analysis stream. Each inbound frame is a JSON
//! object carrying exactly one of the keys `progress` (number in `[0, 1]`),
//! `error` (string) or `completed` (boolean `true`).
//!
//! Frames are decoded independently; a frame that fails to decode is a
//! [`CoreError::Protocol`] and is dropped by the transport without ending the
//! stream.

use serde::Deserialize;
use serde_json::json;

use crate::error::{CoreError, CoreResult};

/// One unit of the analysis stream, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Fraction of the analysis completed so far
    Progress(f64),
    /// The server finished the analysis
    Completed,
    /// The server aborted the analysis
    Error(String),
}

/// Wire shape of a stream frame. Unknown keys are ignored.
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    completed: Option<bool>,
}

impl ProgressEvent {
    /// Decode a text frame.
    pub fn parse(frame: &str) -> CoreResult<Self> {
        let raw: RawFrame = serde_json::from_str(frame)
            .map_err(|e| CoreError::protocol(format!("malformed frame: {}", e)))?;

        match (raw.progress, raw.error, raw.completed) {
            (Some(progress), None, None) => {
                if !progress.is_finite() {
                    return Err(CoreError::protocol("progress is not a finite number"));
                }
                Ok(ProgressEvent::Progress(progress))
            }
            (None, Some(message), None) => Ok(ProgressEvent::Error(message)),
            (None, None, Some(true)) => Ok(ProgressEvent::Completed),
            (None, None, Some(false)) => Err(CoreError::protocol(
                "completed frame must carry `true`",
            )),
            (None, None, None) => Err(CoreError::protocol(
                "frame has none of `progress`, `error`, `completed`",
            )),
            _ => Err(CoreError::protocol(
                "frame carries more than one of `progress`, `error`, `completed`",
            )),
        }
    }

    /// Encode as a wire frame.
    pub fn to_frame(&self) -> String {
        match self {
            ProgressEvent::Progress(p) => json!({ "progress": p }).to_string(),
            ProgressEvent::Completed => json!({ "completed": true }).to_string(),
            ProgressEvent::Error(message) => json!({ "error": message }).to_string(),
        }
    }

    /// Whether this event ends the session.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Progress(_))
    }
}
