//! Analysis Transport
//!
//! The seam between the session manager and the analysis server:
//!
//! - `start` - one request/response that creates a server-side session
//! - `open_stream` - the ordered progress events of that session
//!
//! [`HttpTransport`] is the production implementation (REST + WebSocket).
//! Tests inject scripted implementations of [`AnalysisTransport`].

pub mod api;
pub mod websocket;

use std::sync::Arc;

use async_trait::async_trait;

use code_historian_core::ProgressEvent;

use crate::models::api::{StartAnalysisRequest, StartAnalysisResponse};
use crate::storage::config::SettingsProvider;
use crate::utils::error::HistorianResult;

pub use api::{HistorianApiClient, API_KEY_HEADER, HTTP_TIMEOUT};
pub use websocket::{stream_url, WebSocketEventStream};

/// Client side of the analysis server protocol.
#[async_trait]
pub trait AnalysisTransport: Send + Sync {
    /// Ask the server to start analysing a project.
    ///
    /// Fails with `Configuration` when the server URL or API key is unset or
    /// the project path is empty, `Network` on connection failure or
    /// timeout, and `Server` on a non-success status or malformed body.
    async fn start(&self, request: &StartAnalysisRequest)
        -> HistorianResult<StartAnalysisResponse>;

    /// Open the progress stream of a session.
    ///
    /// Each call opens a fresh connection. A session id the server no longer
    /// knows fails with `SessionExpired`.
    async fn open_stream(&self, session_id: &str) -> HistorianResult<Box<dyn EventStream>>;
}

/// Ordered progress events of one session.
#[async_trait]
pub trait EventStream: Send {
    /// The next well-formed event, or `None` once the stream has ended.
    ///
    /// Must be cancel-safe: dropping the returned future before it resolves
    /// loses no event.
    async fn next_event(&mut self) -> Option<ProgressEvent>;

    /// Release the underlying connection. Calling it on an ended stream is
    /// a no-op.
    async fn close(&mut self);
}

/// REST + WebSocket transport against a Code Historian server.
pub struct HttpTransport {
    api: HistorianApiClient,
    settings: Arc<dyn SettingsProvider>,
}

impl HttpTransport {
    pub fn new(settings: Arc<dyn SettingsProvider>) -> HistorianResult<Self> {
        Ok(Self {
            api: HistorianApiClient::new(settings.clone())?,
            settings,
        })
    }

    /// The REST client, for history and metrics queries.
    pub fn api(&self) -> &HistorianApiClient {
        &self.api
    }
}

#[async_trait]
impl AnalysisTransport for HttpTransport {
    async fn start(
        &self,
        request: &StartAnalysisRequest,
    ) -> HistorianResult<StartAnalysisResponse> {
        self.api.start_analysis(request).await
    }

    async fn open_stream(&self, session_id: &str) -> HistorianResult<Box<dyn EventStream>> {
        let credentials = api::Credentials::from_settings(&self.settings.settings())?;
        let stream = websocket::connect(&credentials, session_id).await?;
        Ok(Box::new(stream))
    }
}
