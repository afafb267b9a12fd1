//! End-to-end read, touch and notify scenarios, plus preload

mod common;

use common::{init_tracing, MockTransport};
use fetchlito_async::{CacheEngine, ChangeBatch, TransportError};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_read_touch_notify_scenario() {
    init_tracing();
    let transport = MockTransport::new();
    transport.respond("/users/5", json!({"id": 5, "name": "A"}));
    let engine = CacheEngine::new(transport.clone());
    let reader = engine.reader();
    let runs = AtomicUsize::new(0);

    let name = reader
        .render(|pass| {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(pass.read("/users/5")?["name"].clone())
        })
        .await
        .unwrap();
    assert_eq!(name, "A");
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    let interest = reader.interest();
    let notified = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notified);
    engine.subscribe(move |batch: &ChangeBatch| {
        if batch.intersects(&interest) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    transport.respond("/users/5", json!({"id": 5, "name": "B"}));
    let report = engine.touch(["users"]).await;

    assert_eq!(report.refetched, vec!["/users/5"]);
    assert_eq!(transport.calls("/users/5"), 2);
    assert_eq!(notified.load(Ordering::SeqCst), 1);

    let name = reader
        .render(|pass| {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(pass.read("/users/5")?["name"].clone())
        })
        .await
        .unwrap();
    assert_eq!(name, "B");
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_fetch_resolution_notifies_once_with_derived_keys() {
    let transport = MockTransport::new();
    transport.respond("/teams", json!([{"id": "red"}, {"id": "blue"}]));
    let engine = CacheEngine::new(transport);
    let (_id, mut rx) = engine.subscribe_channel();

    let reader = engine.reader();
    reader.render(|pass| pass.read("/teams")).await.unwrap();

    let batch = rx.try_recv().unwrap();
    assert_eq!(batch.keys(), &["/teams", "/teams/red", "/teams/blue"].map(String::from));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_unsubscribed_listener_is_not_called() {
    let engine = CacheEngine::new(MockTransport::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let id = engine.subscribe(move |_: &ChangeBatch| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    engine.write("/a", json!(1));
    assert!(engine.unsubscribe(id));
    engine.write("/a", json!(2));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_preload_retries_until_everything_is_cached() {
    let transport = MockTransport::new();
    transport.respond("/a", json!(1)).respond("/b", json!(2));
    let engine = CacheEngine::new(transport.clone());
    let runs = AtomicUsize::new(0);

    let total = engine
        .preload(|pass| {
            runs.fetch_add(1, Ordering::SeqCst);
            let a = pass.read("/a")?;
            let b = pass.read("/b")?;
            Ok(a.as_i64().unwrap_or(0) + b.as_i64().unwrap_or(0))
        })
        .await
        .unwrap();

    assert_eq!(total, 3);
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(engine.subscriber_count("/a"), 0);
    assert_eq!(engine.subscriber_count("/b"), 0);

    // A later render is served from the preloaded entries.
    let reader = engine.reader();
    reader
        .render(|pass| {
            pass.read("/a")?;
            pass.read("/b")
        })
        .await
        .unwrap();
    assert_eq!(transport.total_calls(), 2);
}

#[tokio::test]
async fn test_preload_aborts_on_error() {
    let transport = MockTransport::new();
    transport.fail("/a", 500).respond("/b", json!(2));
    let engine = CacheEngine::new(transport.clone());
    let runs = AtomicUsize::new(0);

    let result = engine
        .preload(|pass| {
            runs.fetch_add(1, Ordering::SeqCst);
            pass.read("/a")?;
            pass.read("/b")
        })
        .await;

    assert_eq!(result.unwrap_err().status(), Some(500));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(transport.calls("/b"), 0);
}

#[tokio::test]
async fn test_error_then_recovery_via_queue() {
    let transport = MockTransport::new();
    transport
        .queue("/flaky", vec![Err(TransportError::status(503))])
        .respond("/flaky", json!("ok"));
    let engine = CacheEngine::new(transport.clone());
    let reader = engine.reader();

    let first = reader.render(|pass| pass.read("/flaky")).await;
    assert_eq!(first.unwrap_err().status(), Some(503));

    engine.touch(["flaky"]).await;
    let second = reader.render(|pass| pass.read("/flaky")).await.unwrap();
    assert_eq!(*second, json!("ok"));
}

#[tokio::test(start_paused = true)]
async fn test_fetches_settling_together_are_announced_once() {
    let transport = MockTransport::new();
    transport
        .respond("/a", json!(1))
        .respond("/b", json!(2))
        .delay("/a", Duration::from_millis(50))
        .delay("/b", Duration::from_millis(50));
    let engine = CacheEngine::new(transport);
    let (_id, mut rx) = engine.subscribe_channel();

    engine
        .preload(|pass| {
            let a = pass.read("/a");
            let b = pass.read("/b");
            Ok((a?, b?))
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;

    let batch = rx.try_recv().unwrap();
    let mut keys = batch.keys().to_vec();
    keys.sort();
    assert_eq!(keys, vec!["/a", "/b"]);
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_fetches_settling_apart_are_announced_separately() {
    let transport = MockTransport::new();
    transport
        .respond("/a", json!(1))
        .respond("/b", json!(2))
        .delay("/a", Duration::from_millis(10))
        .delay("/b", Duration::from_millis(50));
    let engine = CacheEngine::new(transport);
    let (_id, mut rx) = engine.subscribe_channel();

    engine
        .preload(|pass| {
            let a = pass.read("/a");
            let b = pass.read("/b");
            Ok((a?, b?))
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(rx.try_recv().unwrap().keys(), &["/a".to_string()]);
    assert_eq!(rx.try_recv().unwrap().keys(), &["/b".to_string()]);
    assert!(rx.try_recv().is_err());
}
