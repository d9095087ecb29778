//! Transport Integration Tests
//!
//! Real loopback servers: a one-shot HTTP responder for the REST client and a
//! tungstenite server for the progress stream. Also runs one session end to
//! end over `HttpTransport`.

use std::sync::Arc;

use futures_util::SinkExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

use code_historian_client::models::api::StartAnalysisRequest;
use code_historian_client::models::settings::HistorianSettings;
use code_historian_client::services::transport::{
    AnalysisTransport, EventStream, HistorianApiClient, HttpTransport,
};
use code_historian_client::services::AnalysisSessionManager;
use code_historian_client::utils::error::HistorianError;
use code_historian_client::{AnalysisState, ProgressEvent};

use crate::support::*;

// ============================================================================
// Helpers
// ============================================================================

fn settings_for(base_url: &str) -> HistorianSettings {
    HistorianSettings {
        server_url: base_url.to_string(),
        api_key: Some("test-key".to_string()),
        ..Default::default()
    }
}

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    (listener, base_url)
}

/// Read one HTTP/1.1 request (head and body) from `socket`.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

async fn write_response(socket: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    socket.write_all(response.as_bytes()).await.unwrap();
    socket.shutdown().await.unwrap();
}

/// Answer one request with `status` and `body`; resolves to the raw request.
fn serve_once(listener: TcpListener, status: &'static str, body: &'static str) -> JoinHandle<String> {
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        write_response(&mut socket, status, body).await;
        request
    })
}

/// Path and `X-API-Key` of a WebSocket handshake
type Handshake = (String, Option<String>);

/// Accept one WebSocket connection, report its handshake and send `frames`
/// then close.
async fn serve_ws(
    listener: &TcpListener,
    frames: Vec<&'static str>,
    handshake_tx: oneshot::Sender<Handshake>,
) {
    let (socket, _) = listener.accept().await.unwrap();
    let callback = move |request: &Request, response: Response| {
        let key = request
            .headers()
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let _ = handshake_tx.send((request.uri().path().to_string(), key));
        Ok::<Response, ErrorResponse>(response)
    };
    let mut ws = tokio_tungstenite::accept_hdr_async(socket, callback)
        .await
        .unwrap();
    for frame in frames {
        ws.send(Message::Text(frame.to_string())).await.unwrap();
    }
    let _ = ws.close(None).await;
}

/// Reject one WebSocket handshake with `status`.
fn reject_ws(listener: TcpListener, status: StatusCode) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let callback = move |_request: &Request, _response: Response| {
            let mut rejection = ErrorResponse::new(None);
            *rejection.status_mut() = status;
            Err::<Response, ErrorResponse>(rejection)
        };
        let _ = tokio_tungstenite::accept_hdr_async(socket, callback).await;
    })
}

fn client_for(base_url: &str) -> HistorianApiClient {
    HistorianApiClient::new(Arc::new(settings_for(base_url))).unwrap()
}

fn start_request() -> StartAnalysisRequest {
    StartAnalysisRequest::from_settings(PROJECT, &HistorianSettings::default())
}

// ============================================================================
// REST client
// ============================================================================

#[tokio::test]
async fn test_start_posts_request_with_api_key() {
    let (listener, base_url) = bind().await;
    let server = serve_once(
        listener,
        "200 OK",
        r#"{"id":"abc123","status":"started","startTime":"2024-12-20T20:13:05Z"}"#,
    );

    let response = client_for(&base_url)
        .start_analysis(&start_request())
        .await
        .unwrap();
    assert_eq!(response.id, "abc123");
    assert_eq!(response.start_time.as_deref(), Some("2024-12-20T20:13:05Z"));

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/analysis/start HTTP/1.1"));
    assert!(request.to_ascii_lowercase().contains("x-api-key: test-key"));
    assert!(request.contains(r#""projectPath":"/work/repo""#));
    assert!(request.contains(r#""maxDepth":100"#));
    assert!(request.contains(r#""excludedPaths":["node_modules"]"#));
}

#[tokio::test]
async fn test_non_success_status_is_server_error() {
    let (listener, base_url) = bind().await;
    let _server = serve_once(listener, "500 Internal Server Error", r#"{"error":"boom"}"#);

    let err = client_for(&base_url)
        .start_analysis(&start_request())
        .await
        .unwrap_err();
    assert!(matches!(err, HistorianError::Server(_)), "{:?}", err);
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn test_malformed_body_is_server_error() {
    let (listener, base_url) = bind().await;
    let _server = serve_once(listener, "200 OK", "definitely not json");

    let err = client_for(&base_url)
        .start_analysis(&start_request())
        .await
        .unwrap_err();
    assert!(matches!(err, HistorianError::Server(_)), "{:?}", err);
}

#[tokio::test]
async fn test_refused_connection_is_network_error() {
    let (listener, base_url) = bind().await;
    drop(listener);

    let err = client_for(&base_url)
        .start_analysis(&start_request())
        .await
        .unwrap_err();
    assert!(matches!(err, HistorianError::Network(_)), "{:?}", err);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_file_history_encodes_path_query() {
    let (listener, base_url) = bind().await;
    let server = serve_once(
        listener,
        "200 OK",
        r#"{"changes":[{"timestamp":"2024-12-20T20:13:05Z","author":"dev","message":"init","impactScore":0.5}],
            "metrics":{"totalChanges":1,"totalAuthors":1,"avgImpactScore":0.5}}"#,
    );

    let history = client_for(&base_url)
        .file_history("src/main.rs")
        .await
        .unwrap();
    assert_eq!(history.changes[0].author, "dev");
    assert_eq!(history.metrics.total_changes, 1);

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /api/history/file?path=src%2Fmain.rs HTTP/1.1"));
}

#[tokio::test]
async fn test_custom_metrics_decode() {
    let (listener, base_url) = bind().await;
    let server = serve_once(listener, "200 OK", r#"{"churn":0.8,"ownership":0.25}"#);

    let metrics = client_for(&base_url).custom_metrics("churn").await.unwrap();
    assert_eq!(metrics.get("churn"), Some(&0.8));
    assert_eq!(metrics.get("ownership"), Some(&0.25));

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /api/metrics/custom/churn HTTP/1.1"));
}

#[tokio::test]
async fn test_project_metrics_decode() {
    let (listener, base_url) = bind().await;
    let _server = serve_once(
        listener,
        "200 OK",
        r#"{"totalFiles":3,"totalCommits":30,"totalAuthors":2,"avgCommitsPerFile":10.0,
            "avgAuthorsPerFile":1.5,"hotspots":[{"filePath":"src/lib.rs","score":0.9,"changes":20,"authors":2}]}"#,
    );

    let metrics = client_for(&base_url).project_metrics().await.unwrap();
    assert_eq!(metrics.total_files, 3);
    assert_eq!(metrics.hotspots[0].file_path, "src/lib.rs");
}

// ============================================================================
// Progress stream
// ============================================================================

#[tokio::test]
async fn test_stream_skips_malformed_frames() {
    let (listener, base_url) = bind().await;
    let (handshake_tx, handshake_rx) = oneshot::channel();
    let server = tokio::spawn(async move {
        serve_ws(
            &listener,
            vec![
                r#"{"progress":0.25}"#,
                "garbage",
                r#"{"progress":0.5,"completed":true}"#,
                r#"{"completed":true}"#,
            ],
            handshake_tx,
        )
        .await;
    });

    let transport = HttpTransport::new(Arc::new(settings_for(&base_url))).unwrap();
    let mut stream = transport.open_stream("abc123").await.unwrap();

    assert_eq!(stream.next_event().await, Some(ProgressEvent::Progress(0.25)));
    assert_eq!(stream.next_event().await, Some(ProgressEvent::Completed));
    assert_eq!(stream.next_event().await, None);
    stream.close().await;

    let (path, key) = handshake_rx.await.unwrap();
    assert_eq!(path, "/ws/analysis/abc123");
    assert_eq!(key.as_deref(), Some("test-key"));
    server.await.unwrap();
}

#[tokio::test]
async fn test_unknown_session_is_expired() {
    let (listener, base_url) = bind().await;
    let server = reject_ws(listener, StatusCode::NOT_FOUND);

    let transport = HttpTransport::new(Arc::new(settings_for(&base_url))).unwrap();
    let err = transport.open_stream("gone").await.err().unwrap();
    assert!(matches!(err, HistorianError::SessionExpired(_)), "{:?}", err);
    server.await.unwrap();
}

#[tokio::test]
async fn test_handshake_server_failure_is_server_error() {
    let (listener, base_url) = bind().await;
    let server = reject_ws(listener, StatusCode::INTERNAL_SERVER_ERROR);

    let transport = HttpTransport::new(Arc::new(settings_for(&base_url))).unwrap();
    let err = transport.open_stream("abc123").await.err().unwrap();
    assert!(matches!(err, HistorianError::Server(_)), "{:?}", err);
    server.await.unwrap();
}

#[tokio::test]
async fn test_stream_without_api_key_is_configuration_error() {
    let mut settings = settings_for("http://127.0.0.1:9");
    settings.api_key = None;
    let transport = HttpTransport::new(Arc::new(settings)).unwrap();

    let err = transport.open_stream("abc123").await.err().unwrap();
    assert!(matches!(err, HistorianError::Configuration(_)));
}

// ============================================================================
// End to end
// ============================================================================

#[tokio::test]
async fn test_session_over_http_transport() {
    let (listener, base_url) = bind().await;
    let (handshake_tx, handshake_rx) = oneshot::channel();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        write_response(&mut socket, "200 OK", r#"{"id":"e2e-1","status":"started"}"#).await;

        serve_ws(
            &listener,
            vec![r#"{"progress":0.5}"#, r#"{"completed":true}"#],
            handshake_tx,
        )
        .await;
        request
    });

    let settings = Arc::new(settings_for(&base_url));
    let transport = Arc::new(HttpTransport::new(settings.clone()).unwrap());
    let notifier = ScriptedNotifier::new();
    let manager = AnalysisSessionManager::spawn(PROJECT, transport, settings, notifier.clone());
    let (_sub, mut rx) = manager.subscribe_channel();

    manager.start_analysis().await.unwrap();
    assert_eq!(next_state(&mut rx).await, AnalysisState::Idle);
    assert_eq!(next_state(&mut rx).await, AnalysisState::Starting);
    let update = next_update(&mut rx).await;
    assert_eq!(update.state, running(0.0));
    assert_eq!(update.session_id.as_deref(), Some("e2e-1"));
    assert_eq!(next_state(&mut rx).await, running(0.5));
    assert_eq!(next_state(&mut rx).await, AnalysisState::Completed);

    let (path, _) = handshake_rx.await.unwrap();
    assert_eq!(path, "/ws/analysis/e2e-1");
    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/analysis/start"));

    manager.shutdown().await;
}
