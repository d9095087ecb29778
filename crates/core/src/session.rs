//! Analysis Session Record
//!
//! Identifies one server-tracked analysis run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One analysis run, identified by the opaque id the server assigned on start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub project_path: String,
    pub started_at: DateTime<Utc>,
}

impl Session {
    /// Create a session record.
    ///
    /// `started_at` is taken from the server's RFC 3339 `startTime` when it
    /// parses, otherwise from the local clock.
    pub fn new(
        session_id: impl Into<String>,
        project_path: impl Into<String>,
        server_start_time: Option<&str>,
    ) -> Self {
        let started_at = server_start_time
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Self {
            session_id: session_id.into(),
            project_path: project_path.into(),
            started_at,
        }
    }
}
