//! Code Historian REST Client
//!
//! Thin typed wrapper over the analysis server's HTTP API. Every request
//! carries the `X-API-Key` header and reads the server URL and key from a
//! fresh settings snapshot, so configuration edits apply to the next call.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::models::api::{
    CustomMetrics, FileHistory, ProjectMetrics, StartAnalysisRequest, StartAnalysisResponse,
};
use crate::models::settings::HistorianSettings;
use crate::storage::config::SettingsProvider;
use crate::utils::error::{HistorianError, HistorianResult};

/// Header carrying the API key on every request and on the stream handshake
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Connect and read timeout for every REST call
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest error body echoed into an error message
const MAX_ERROR_BODY: usize = 512;

/// Server URL and key taken from one settings snapshot
#[derive(Debug, Clone)]
pub(crate) struct Credentials {
    pub server_url: Url,
    pub api_key: String,
}

impl Credentials {
    /// Read the server URL and key, failing with a configuration error when
    /// either is missing or the URL does not parse.
    pub(crate) fn from_settings(settings: &HistorianSettings) -> HistorianResult<Self> {
        let raw_url = settings
            .server_url()
            .ok_or_else(|| HistorianError::configuration("Server URL is not configured"))?;
        let api_key = settings
            .api_key()
            .ok_or_else(|| HistorianError::configuration("API key is not configured"))?;
        let server_url = Url::parse(raw_url).map_err(|e| {
            HistorianError::configuration(format!("Invalid server URL {}: {}", raw_url, e))
        })?;

        Ok(Self {
            server_url,
            api_key: api_key.to_string(),
        })
    }

    /// Append path segments to the server URL, percent-encoding each one.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> HistorianResult<Url> {
        let mut url = self.server_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                HistorianError::configuration(format!(
                    "Server URL {} cannot carry a path",
                    self.server_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Typed client for the Code Historian REST API.
pub struct HistorianApiClient {
    client: reqwest::Client,
    settings: Arc<dyn SettingsProvider>,
}

impl HistorianApiClient {
    pub fn new(settings: Arc<dyn SettingsProvider>) -> HistorianResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(HTTP_TIMEOUT)
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| HistorianError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, settings })
    }

    fn credentials(&self) -> HistorianResult<Credentials> {
        Credentials::from_settings(&self.settings.settings())
    }

    /// `POST /api/analysis/start`
    pub async fn start_analysis(
        &self,
        request: &StartAnalysisRequest,
    ) -> HistorianResult<StartAnalysisResponse> {
        if request.project_path.trim().is_empty() {
            return Err(HistorianError::configuration("Project path is empty"));
        }
        let credentials = self.credentials()?;
        let url = credentials.endpoint(&["api", "analysis", "start"])?;
        debug!("Starting analysis of {} via {}", request.project_path, url);

        let response: StartAnalysisResponse = self
            .send_json(
                self.client
                    .post(url)
                    .header(API_KEY_HEADER, &credentials.api_key)
                    .json(request),
            )
            .await?;

        if response.id.trim().is_empty() {
            return Err(HistorianError::server("start response carried an empty session id"));
        }
        Ok(response)
    }

    /// `GET /api/history/file?path=…`
    pub async fn file_history(&self, file_path: &str) -> HistorianResult<FileHistory> {
        if file_path.trim().is_empty() {
            return Err(HistorianError::validation("File path is empty"));
        }
        let credentials = self.credentials()?;
        let url = credentials.endpoint(&["api", "history", "file"])?;

        self.send_json(
            self.client
                .get(url)
                .header(API_KEY_HEADER, &credentials.api_key)
                .query(&[("path", file_path)]),
        )
        .await
    }

    /// `GET /api/metrics/project`
    pub async fn project_metrics(&self) -> HistorianResult<ProjectMetrics> {
        let credentials = self.credentials()?;
        let url = credentials.endpoint(&["api", "metrics", "project"])?;

        self.send_json(
            self.client
                .get(url)
                .header(API_KEY_HEADER, &credentials.api_key),
        )
        .await
    }

    /// `GET /api/metrics/custom/{key}`
    pub async fn custom_metrics(&self, metric_key: &str) -> HistorianResult<CustomMetrics> {
        if metric_key.trim().is_empty() {
            return Err(HistorianError::validation("Metric key is empty"));
        }
        let credentials = self.credentials()?;
        let url = credentials.endpoint(&["api", "metrics", "custom", metric_key])?;

        self.send_json(
            self.client
                .get(url)
                .header(API_KEY_HEADER, &credentials.api_key),
        )
        .await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> HistorianResult<T> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            warn!("Code Historian server returned HTTP {}", status.as_u16());
            return Err(HistorianError::server(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            HistorianError::server(format!("malformed response body: {}", e))
        })
    }
}
