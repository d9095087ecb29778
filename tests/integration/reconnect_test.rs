//! Reconnect Integration Tests
//!
//! Unexpected stream ends while running: bounded backoff, reopen of the same
//! session, fallback to a new session when the server forgot the old one,
//! and cancellation during backoff.

use code_historian_client::models::settings::ReconnectConfig;
use code_historian_client::services::recovery::{RecoveryPrompt, StatusNotice, CONNECTION_LOST};
use code_historian_client::services::StopOutcome;
use code_historian_client::utils::error::HistorianError;
use code_historian_client::{AnalysisState, ProgressEvent};

use crate::support::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exhausted_reconnects_end_in_connection_lost() {
    let transport = ScriptedTransport::new();
    let notifier = ScriptedNotifier::new();
    let feed = transport.script_stream();
    let manager = spawn_manager(&transport, &notifier, test_settings());
    let (_sub, mut rx) = manager.subscribe_channel();

    manager.start_analysis().await.unwrap();
    while next_state(&mut rx).await != running(0.0) {}

    // server hangs up; every reopen is refused
    drop(feed);

    assert_eq!(
        next_state(&mut rx).await,
        AnalysisState::Error {
            message: CONNECTION_LOST.to_string()
        }
    );
    assert_quiet(&mut rx).await;

    // one initial open plus three reconnect attempts
    assert_eq!(transport.open_calls(), 4);
    assert_eq!(transport.close_calls(), 1);
    assert_eq!(
        transport.opened_ids(),
        vec!["session-1", "session-1", "session-1", "session-1"]
    );

    wait_for(|| notifier.statuses().len() == 3).await;
    let attempts: Vec<u32> = notifier
        .statuses()
        .into_iter()
        .filter_map(|notice| match notice {
            StatusNotice::NetworkRecovery {
                attempt,
                max_attempts: 3,
            } => Some(attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![1, 2, 3]);

    wait_for(|| notifier.prompts().len() == 1).await;
    assert_eq!(
        notifier.prompts()[0],
        RecoveryPrompt::ErrorRecovery {
            message: "connection lost".to_string(),
            retryable: true,
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reopen_continues_same_session() {
    let transport = ScriptedTransport::new();
    let notifier = ScriptedNotifier::new();
    let first = transport.script_stream();
    let second = transport.script_stream();
    let manager = spawn_manager(&transport, &notifier, test_settings());
    let (_sub, mut rx) = manager.subscribe_channel();

    manager.start_analysis().await.unwrap();
    first.send(ProgressEvent::Progress(0.3));
    while next_state(&mut rx).await != running(0.3) {}
    drop(first);

    second.send(ProgressEvent::Progress(0.5));
    let update = next_update(&mut rx).await;
    assert_eq!(update.state, running(0.5));
    assert_eq!(update.session_id.as_deref(), Some("session-1"));

    second.send(ProgressEvent::Completed);
    assert_eq!(next_state(&mut rx).await, AnalysisState::Completed);

    assert_eq!(transport.start_calls(), 1);
    assert_eq!(transport.open_calls(), 2);
    wait_for(|| transport.close_calls() == 2).await;

    // notices reach the notifier in the order they were raised
    wait_for(|| notifier.statuses().len() == 2).await;
    assert_eq!(
        notifier.statuses(),
        vec![
            StatusNotice::NetworkRecovery {
                attempt: 1,
                max_attempts: 3,
            },
            StatusNotice::AnalysisCompleted,
        ]
    );
}

#[tokio::test]
async fn test_expired_session_falls_back_to_new_session() {
    let transport = ScriptedTransport::new();
    let notifier = ScriptedNotifier::new();
    let first = transport.script_stream();
    transport.fail_open(HistorianError::session_expired("HTTP 404"));
    let second = transport.script_stream();
    let manager = spawn_manager(&transport, &notifier, test_settings());
    let (_sub, mut rx) = manager.subscribe_channel();

    manager.start_analysis().await.unwrap();
    let update = loop {
        let update = next_update(&mut rx).await;
        if update.state == running(0.0) {
            break update;
        }
    };
    assert_eq!(update.session_id.as_deref(), Some("session-1"));
    drop(first);

    let restarting = next_update(&mut rx).await;
    assert_eq!(restarting.state, AnalysisState::Starting);
    assert_eq!(restarting.session_id, None);

    let resumed = next_update(&mut rx).await;
    assert_eq!(resumed.state, running(0.0));
    assert_eq!(resumed.session_id.as_deref(), Some("session-2"));

    second.send(ProgressEvent::Completed);
    assert_eq!(next_state(&mut rx).await, AnalysisState::Completed);
    assert_eq!(transport.start_calls(), 2);
}

#[tokio::test]
async fn test_healthy_stream_resets_attempt_budget() {
    let transport = ScriptedTransport::new();
    let notifier = ScriptedNotifier::new();
    let first = transport.script_stream();
    let second = transport.script_stream();
    let third = transport.script_stream();
    let mut settings = test_settings();
    settings.reconnect = ReconnectConfig {
        max_attempts: 1,
        base_delay_ms: 10,
        max_delay_ms: 10,
    };
    let manager = spawn_manager(&transport, &notifier, settings);
    let (_sub, mut rx) = manager.subscribe_channel();

    manager.start_analysis().await.unwrap();
    while next_state(&mut rx).await != running(0.0) {}
    drop(first);

    second.send(ProgressEvent::Progress(0.4));
    assert_eq!(next_state(&mut rx).await, running(0.4));
    drop(second);

    third.send(ProgressEvent::Completed);
    assert_eq!(next_state(&mut rx).await, AnalysisState::Completed);
    assert_eq!(transport.open_calls(), 3);
}

#[tokio::test]
async fn test_non_retryable_reopen_failure_fails_immediately() {
    let transport = ScriptedTransport::new();
    let notifier = ScriptedNotifier::new();
    let feed = transport.script_stream();
    transport.fail_open(HistorianError::configuration("API key is not configured"));
    let manager = spawn_manager(&transport, &notifier, test_settings());
    let (_sub, mut rx) = manager.subscribe_channel();

    manager.start_analysis().await.unwrap();
    while next_state(&mut rx).await != running(0.0) {}
    drop(feed);

    assert_eq!(
        next_state(&mut rx).await,
        AnalysisState::Error {
            message: "Configuration error: API key is not configured".to_string()
        }
    );
    assert_eq!(transport.open_calls(), 2);
}

#[tokio::test]
async fn test_stop_during_backoff_cancels_reconnect() {
    let transport = ScriptedTransport::new();
    let notifier = ScriptedNotifier::new();
    let feed = transport.script_stream();
    let mut settings = test_settings();
    settings.reconnect = ReconnectConfig {
        max_attempts: 3,
        base_delay_ms: 60_000,
        max_delay_ms: 60_000,
    };
    let manager = spawn_manager(&transport, &notifier, settings);
    let (_sub, mut rx) = manager.subscribe_channel();

    manager.start_analysis().await.unwrap();
    while next_state(&mut rx).await != running(0.0) {}
    drop(feed);
    wait_for(|| !notifier.statuses().is_empty()).await;

    assert_eq!(manager.stop_analysis().await.unwrap(), StopOutcome::Cancelled);
    assert_eq!(next_state(&mut rx).await, AnalysisState::Cancelled);
    assert_eq!(transport.open_calls(), 1);
    assert_eq!(transport.close_calls(), 1);
}
