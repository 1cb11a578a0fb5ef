//! Integration tests for debounced invalidation refreshes

mod common;

use std::time::Duration;

use serde_json::json;

use common::{service, service_with, settle, Reply, ScriptedTransport};
use fetch_cache::app::{FetchStatus, SchedulerKind, SessionOptions};

const SIGNAL: &str = "engineers-changed";

fn listening(signal: &str) -> SessionOptions {
    SessionOptions::default()
        .without_auto_fetch()
        .with_invalidation_signal(signal)
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn test_signal_burst_triggers_one_refetch() {
    let transport = ScriptedTransport::new();
    let service = service(&transport);
    let session = service.attach("/api/engineers", listening(SIGNAL));
    settle().await;

    for _ in 0..5 {
        assert_eq!(service.emit(SIGNAL), 1);
        sleep_ms(100).await;
    }
    assert_eq!(transport.calls(), 0);

    sleep_ms(1000).await;
    assert_eq!(transport.calls(), 1);

    let state = session.state();
    assert_eq!(state.status, FetchStatus::Success);
    assert_eq!(state.data.unwrap()["call"], json!(1));
}

#[tokio::test(start_paused = true)]
async fn test_debounced_refresh_bypasses_fresh_cache() {
    let transport = ScriptedTransport::new();
    let service = service(&transport);
    let session = service.attach("/x", listening(SIGNAL));

    session.request(false).await.unwrap();
    service.emit(SIGNAL);
    sleep_ms(1000).await;

    assert_eq!(transport.calls(), 2);
    assert_eq!(session.state().data.unwrap()["call"], json!(2));
}

#[tokio::test(start_paused = true)]
async fn test_debounced_failure_is_silent() {
    let transport = ScriptedTransport::new();
    transport.then(Reply::Status(500));
    let service = service(&transport);
    let session = service.attach("/x", listening(SIGNAL));
    settle().await;

    service.emit(SIGNAL);
    sleep_ms(1000).await;

    let state = session.state();
    assert_eq!(transport.calls(), 1);
    assert!(state.error.is_none());
    assert!(!state.loading);
    assert_eq!(state.status, FetchStatus::Idle);

    // A failed refresh frees the debouncer for the next burst.
    service.emit(SIGNAL);
    sleep_ms(1000).await;
    assert_eq!(transport.calls(), 2);
    assert_eq!(session.state().status, FetchStatus::Success);
}

#[tokio::test(start_paused = true)]
async fn test_silent_failure_keeps_newer_foreground_result() {
    let transport = ScriptedTransport::new();
    transport.then_after(Duration::from_secs(2), Reply::Status(500));
    let service = service(&transport);
    let session = service.attach("/x", listening(SIGNAL));
    settle().await;

    service.emit(SIGNAL);
    sleep_ms(600).await;
    assert_eq!(transport.calls(), 1);

    let value = session.refetch().await.unwrap();
    assert_eq!(session.state().status, FetchStatus::Success);

    sleep_ms(3000).await;
    let state = session.state();
    assert_eq!(state.status, FetchStatus::Success);
    assert_eq!(state.data, Some(value));
    assert!(state.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_detach_cancels_armed_refresh() {
    let transport = ScriptedTransport::new();
    let service = service(&transport);
    let session = service.attach("/x", listening(SIGNAL));
    settle().await;

    service.emit(SIGNAL);
    sleep_ms(100).await;
    session.detach();

    sleep_ms(1000).await;
    assert_eq!(transport.calls(), 0);
    assert_eq!(service.emit(SIGNAL), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconfigured_signal_replaces_old_one() {
    let transport = ScriptedTransport::new();
    let service = service(&transport);
    let session = service.attach("/x", listening("old-signal"));
    settle().await;

    session.reconfigure("/x", listening("new-signal"));
    settle().await;

    service.emit("old-signal");
    sleep_ms(1000).await;
    assert_eq!(transport.calls(), 0);

    service.emit("new-signal");
    sleep_ms(1000).await;
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_every_scheduler_runs_refresh() {
    for kind in [SchedulerKind::Immediate, SchedulerKind::Idle, SchedulerKind::Priority] {
        let transport = ScriptedTransport::new();
        let service = service_with(&transport, kind);
        let session = service.attach("/x", listening(SIGNAL));
        settle().await;

        service.emit(SIGNAL);
        sleep_ms(3000).await;

        assert_eq!(transport.calls(), 1, "scheduler {}", kind);
        assert_eq!(session.state().status, FetchStatus::Success, "scheduler {}", kind);
    }
}

#[tokio::test(start_paused = true)]
async fn test_burst_during_running_refresh_is_dropped() {
    let transport = ScriptedTransport::new();
    transport.then_after(Duration::from_secs(5), Reply::Json(json!("slow")));
    let service = service(&transport);
    let session = service.attach("/x", listening(SIGNAL));
    settle().await;

    service.emit(SIGNAL);
    sleep_ms(600).await;
    assert_eq!(transport.calls(), 1);
    assert!(session.state().loading);

    service.emit(SIGNAL);
    sleep_ms(600).await;
    assert_eq!(transport.calls(), 1);

    sleep_ms(5000).await;
    assert_eq!(transport.calls(), 1);
    assert_eq!(*session.state().data.unwrap(), json!("slow"));

    service.emit(SIGNAL);
    sleep_ms(1000).await;
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_signal_reaches_every_listening_session() {
    let transport = ScriptedTransport::new();
    let service = service(&transport);
    let first = service.attach("/a", listening(SIGNAL));
    let second = service.attach("/b", listening(SIGNAL));
    let deaf = service.attach("/c", SessionOptions::default().without_auto_fetch());
    settle().await;

    assert_eq!(service.emit(SIGNAL), 2);
    sleep_ms(1000).await;

    assert_eq!(transport.calls(), 2);
    assert_eq!(first.state().status, FetchStatus::Success);
    assert_eq!(second.state().status, FetchStatus::Success);
    assert_eq!(deaf.state().status, FetchStatus::Idle);
}
