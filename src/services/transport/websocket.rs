//! Analysis Progress WebSocket
//!
//! Opens `ws(s)://{server}/ws/analysis/{id}` and turns its JSON frames into
//! [`ProgressEvent`]s. Malformed frames are logged and skipped; the stream
//! ends when the peer closes, the socket errors, or [`EventStream::close`]
//! is called.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use code_historian_core::ProgressEvent;

use super::api::{Credentials, API_KEY_HEADER};
use super::EventStream;
use crate::utils::error::{HistorianError, HistorianResult};

/// Upper bound on the opening handshake
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on sending our close frame
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Derive the stream URL for `session_id` from the server URL.
///
/// `http` becomes `ws` and `https` becomes `wss`; any base path is kept.
pub fn stream_url(server_url: &Url, session_id: &str) -> HistorianResult<Url> {
    let scheme = match server_url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(HistorianError::configuration(format!(
                "Unsupported server URL scheme: {}",
                other
            )))
        }
    };

    let mut url = server_url.clone();
    url.set_scheme(scheme).map_err(|_| {
        HistorianError::configuration(format!("Cannot derive stream URL from {}", server_url))
    })?;
    url.path_segments_mut()
        .map_err(|_| {
            HistorianError::configuration(format!("Server URL {} cannot carry a path", server_url))
        })?
        .pop_if_empty()
        .extend(["ws", "analysis", session_id]);
    Ok(url)
}

/// Open the progress stream for `session_id`.
pub(crate) async fn connect(
    credentials: &Credentials,
    session_id: &str,
) -> HistorianResult<WebSocketEventStream> {
    let url = stream_url(&credentials.server_url, session_id)?;

    let mut request = url.as_str().into_client_request().map_err(|e| {
        HistorianError::configuration(format!("Invalid stream URL {}: {}", url, e))
    })?;
    let key = HeaderValue::from_str(&credentials.api_key).map_err(|_| {
        HistorianError::configuration("API key contains characters not allowed in a header")
    })?;
    request.headers_mut().insert(API_KEY_HEADER, key);

    let (socket, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(request))
        .await
        .map_err(|_| {
            HistorianError::network(format!(
                "stream handshake timed out after {}s",
                CONNECT_TIMEOUT.as_secs()
            ))
        })?
        .map_err(|e| handshake_error(e, session_id))?;

    info!("Progress stream open for session {}", session_id);
    Ok(WebSocketEventStream {
        session_id: session_id.to_string(),
        socket: Some(socket),
    })
}

/// Classify a failed handshake.
fn handshake_error(err: WsError, session_id: &str) -> HistorianError {
    match err {
        WsError::Http(response) => match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => HistorianError::session_expired(format!(
                "server rejected session {} (HTTP {})",
                session_id,
                response.status().as_u16()
            )),
            status => HistorianError::server(format!(
                "stream handshake failed with HTTP {}",
                status.as_u16()
            )),
        },
        WsError::Url(e) => HistorianError::configuration(format!("Invalid stream URL: {}", e)),
        other => HistorianError::network(format!("stream connection failed: {}", other)),
    }
}

/// Progress events of one session, read from a WebSocket.
pub struct WebSocketEventStream {
    session_id: String,
    socket: Option<Socket>,
}

impl WebSocketEventStream {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn decode(&self, message: Message) -> Option<String> {
        match message {
            Message::Text(text) => Some(text),
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Some(text),
                Err(_) => {
                    warn!(
                        "Dropping non-UTF-8 binary frame on session {}",
                        self.session_id
                    );
                    None
                }
            },
            // ping/pong are answered by tungstenite
            _ => None,
        }
    }
}

#[async_trait]
impl EventStream for WebSocketEventStream {
    async fn next_event(&mut self) -> Option<ProgressEvent> {
        loop {
            let socket = self.socket.as_mut()?;
            let message = match socket.next().await {
                Some(Ok(Message::Close(frame))) => {
                    debug!(
                        "Server closed stream for session {}: {:?}",
                        self.session_id, frame
                    );
                    self.socket = None;
                    return None;
                }
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    warn!("Stream error on session {}: {}", self.session_id, e);
                    self.socket = None;
                    return None;
                }
                None => {
                    self.socket = None;
                    return None;
                }
            };

            let Some(text) = self.decode(message) else {
                continue;
            };
            match ProgressEvent::parse(&text) {
                Ok(event) => return Some(event),
                Err(e) => {
                    warn!(
                        "Dropping malformed frame on session {}: {}",
                        self.session_id, e
                    );
                }
            }
        }
    }

    async fn close(&mut self) {
        let Some(mut socket) = self.socket.take() else {
            return;
        };
        match tokio::time::timeout(CLOSE_TIMEOUT, socket.close(None)).await {
            Ok(Ok(())) => debug!("Closed stream for session {}", self.session_id),
            Ok(Err(e)) => debug!("Close of session {} stream failed: {}", self.session_id, e),
            Err(_) => debug!("Close of session {} stream timed out", self.session_id),
        }
    }
}
