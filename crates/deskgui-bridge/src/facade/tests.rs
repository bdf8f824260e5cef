use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use deskgui_common::{BridgeError, BridgeEvent, CallId, HandlerError};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::*;
use crate::codec::{self, Envelope};
use crate::transport::Transport;

async fn within<F: Future>(f: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("timed out")
}

fn bridge() -> InMemoryBridge {
    InMemoryBridge::spawn(BridgeConfig::default())
}

// -- Async calls --

#[tokio::test]
async fn timestamp_round_trip_is_exact() {
    let b = bridge();
    b.host
        .register("get_timestamp", |_| Ok(json!("1700000000000")));

    let ts = within(b.page.invoke_async("get_timestamp", Value::Null))
        .await
        .unwrap();
    assert_eq!(ts, json!("1700000000000"));

    let millis: i64 = ts.as_str().unwrap().parse().unwrap();
    assert_eq!(millis, 1_700_000_000_000);
    assert_eq!(b.page.pending_count(), 0);
}

#[tokio::test]
async fn native_i64_result_is_exact() {
    let b = bridge();
    b.host.register("big", |_| Ok(json!(i64::MAX)));
    let v = within(b.page.invoke_async("big", Value::Null)).await.unwrap();
    assert_eq!(v.as_i64(), Some(i64::MAX));
}

#[tokio::test]
async fn unregistered_function_rejects_with_reason() {
    let b = bridge();
    let err = within(b.page.invoke_async("nope", Value::Null))
        .await
        .unwrap_err();
    assert_eq!(err, BridgeError::NoSuchFunction("nope".into()));
    assert_eq!(err.to_string(), "no such function: nope");
}

#[tokio::test]
async fn handler_failure_rejects_with_description() {
    let b = bridge();
    b.host
        .register("fail", |_| Err(HandlerError::new("counter overflow")));
    let err = within(b.page.invoke_async("fail", Value::Null))
        .await
        .unwrap_err();
    assert_eq!(err, BridgeError::HandlerFailure("counter overflow".into()));
}

#[tokio::test]
async fn failure_does_not_affect_other_calls() {
    let b = bridge();
    b.host.register("fail", |_| Err(HandlerError::new("bad")));
    b.host.register("ok", |v| Ok(v));

    let bad = b.page.invoke_async("fail", Value::Null);
    let good = b.page.invoke_async("ok", json!(5));
    assert!(within(bad).await.is_err());
    assert_eq!(within(good).await, Ok(json!(5)));
}

#[tokio::test]
async fn later_issued_call_may_settle_first() {
    let b = bridge();
    b.host.register_async("a", |_| async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok::<_, HandlerError>(json!("from a"))
    });
    b.host
        .register_async("b", |_| async { Ok::<_, HandlerError>(json!("from b")) });

    let a = b.page.invoke_async("a", Value::Null);
    let second = b.page.invoke_async("b", Value::Null);

    assert_eq!(within(second).await, Ok(json!("from b")));
    assert_eq!(b.page.pending_count(), 1);
    assert_eq!(within(a).await, Ok(json!("from a")));
    assert_eq!(b.page.pending_count(), 0);
}

#[tokio::test]
async fn concurrent_calls_resolve_to_their_own_results() {
    let b = bridge();
    b.host.register_async("delayed_echo", |v: Value| async move {
        let i = v.as_u64().unwrap_or(0);
        // Later calls finish sooner.
        tokio::time::sleep(Duration::from_millis((20 - i) * 3)).await;
        Ok::<_, HandlerError>(json!(i))
    });

    let calls: Vec<_> = (0..20u64)
        .map(|i| b.page.invoke_async("delayed_echo", json!(i)))
        .collect();
    for (i, call) in calls.into_iter().enumerate() {
        assert_eq!(within(call).await, Ok(json!(i)));
    }
}

#[tokio::test]
async fn handler_text_cannot_pose_as_missing_function() {
    let b = bridge();
    b.host
        .register("fail", |_| Err(HandlerError::new("no such function: spoof")));
    assert_eq!(
        within(b.page.invoke_async("fail", Value::Null)).await,
        Err(BridgeError::HandlerFailure("no such function: spoof".into()))
    );
}

#[tokio::test]
async fn abandoned_calls_free_their_slots() {
    let config = BridgeConfig {
        max_pending: 2,
        ..Default::default()
    };
    let b = InMemoryBridge::spawn(config);
    b.host
        .register_async("hang", |_| std::future::pending::<Result<Value, HandlerError>>());
    b.host.register("ok", |_| Ok(json!("ok")));

    for _ in 0..4 {
        let call = b.page.invoke_async("hang", Value::Null);
        assert!(tokio::time::timeout(Duration::from_millis(10), call)
            .await
            .is_err());
    }
    assert_eq!(b.page.pending_count(), 0);
    assert_eq!(
        within(b.page.invoke_async("ok", Value::Null)).await,
        Ok(json!("ok"))
    );
}

// -- Ordering --

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fire_and_forget_calls_run_in_send_order() {
    let b = bridge();
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        b.host.register_callback("counter_value", move |v| {
            seen.lock().unwrap().push(v.as_u64().unwrap_or(u64::MAX));
        });
    }
    b.host.register("barrier", |_| Ok(Value::Null));

    for i in 0..2000u64 {
        b.page.invoke("counter_value", json!(i)).unwrap();
    }
    within(b.page.invoke_async("barrier", Value::Null))
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(*seen, (0..2000u64).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reset_after_updates_wins() {
    let b = bridge();
    let counter = Arc::new(AtomicU64::new(0));
    {
        let counter = Arc::clone(&counter);
        b.host.register_callback("counter_value", move |v| {
            counter.store(v.as_u64().unwrap_or(0), Ordering::SeqCst);
        });
    }
    {
        let counter = Arc::clone(&counter);
        b.host.register_callback("counter_reset", move |_| {
            counter.store(0, Ordering::SeqCst);
        });
    }

    for i in 1..=200u64 {
        b.page.invoke("counter_value", json!(i)).unwrap();
    }
    within(b.page.invoke_async("counter_reset", Value::Null))
        .await
        .unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

// -- Fire-and-forget and push events --

#[tokio::test]
async fn fire_and_forget_and_push_event() {
    let b = bridge();
    let mut host_events = b.host.events();

    let counter = Arc::new(AtomicU64::new(0));
    let (hit_tx, mut hit_rx) = mpsc::unbounded_channel();
    {
        let counter = Arc::clone(&counter);
        b.host.register_callback("counter_value", move |v| {
            counter.store(v.as_u64().unwrap_or(0), Ordering::SeqCst);
            let _ = hit_tx.send(());
        });
    }

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    b.page.on_event(move |e| {
        let _ = event_tx.send(e.clone());
    });

    b.page.invoke("counter_value", json!(3)).unwrap();
    within(hit_rx.recv()).await.unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(b.page.pending_count(), 0);

    b.host.emit("onMessage", json!("hi")).unwrap();
    let event = within(event_rx.recv()).await.unwrap();
    assert_eq!(event.name, "onMessage");
    assert_eq!(event.payload, json!("hi"));

    // Exactly once.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(event_rx.try_recv().is_err());

    // The fire-and-forget call was received but never completed with a reply.
    let mut saw_received = false;
    while let Ok(e) = host_events.try_recv() {
        match e {
            BridgeEvent::CallReceived { id, name } => {
                assert_eq!(id, None);
                assert_eq!(name, "counter_value");
                saw_received = true;
            }
            BridgeEvent::CallCompleted { .. } => panic!("no reply expected"),
            _ => {}
        }
    }
    assert!(saw_received);
}

#[tokio::test]
async fn events_keep_emit_order() {
    let b = bridge();
    let (tx, mut rx) = mpsc::unbounded_channel();
    b.page.on_event(move |e| {
        let _ = tx.send(e.payload.clone());
    });

    for i in 0..10 {
        b.host.emit("tick", json!(i)).unwrap();
    }
    for i in 0..10 {
        assert_eq!(within(rx.recv()).await, Some(json!(i)));
    }
}

#[tokio::test]
async fn replacing_event_handler_discards_previous() {
    let b = bridge();
    let (old_tx, mut old_rx) = mpsc::unbounded_channel::<()>();
    let (new_tx, mut new_rx) = mpsc::unbounded_channel::<()>();
    b.page.on_event(move |_| {
        let _ = old_tx.send(());
    });
    b.page.on_event(move |_| {
        let _ = new_tx.send(());
    });

    b.host.emit("onMessage", json!("hi")).unwrap();
    within(new_rx.recv()).await.unwrap();
    assert!(old_rx.try_recv().is_err());
}

// -- Teardown --

#[tokio::test]
async fn closing_page_rejects_all_outstanding() {
    let b = bridge();
    b.host
        .register_async("never", |_| std::future::pending::<Result<Value, HandlerError>>());

    let calls: Vec<_> = (0..3)
        .map(|_| b.page.invoke_async("never", Value::Null))
        .collect();
    assert_eq!(b.page.pending_count(), 3);

    assert!(b.page.close());
    assert_eq!(b.page.pending_count(), 0);
    for call in calls {
        assert_eq!(within(call).await, Err(BridgeError::TransportClosed));
    }

    // Idempotent, and later calls fail immediately.
    assert!(!b.page.close());
    assert_eq!(
        within(b.page.invoke_async("never", Value::Null)).await,
        Err(BridgeError::TransportClosed)
    );
    assert_eq!(
        b.page.invoke("never", Value::Null),
        Err(BridgeError::TransportClosed)
    );
}

#[tokio::test]
async fn host_teardown_rejects_page_calls() {
    let b = bridge();
    b.host
        .register_async("never", |_| std::future::pending::<Result<Value, HandlerError>>());

    let call = b.page.invoke_async("never", Value::Null);
    // Let the host pick the call up before it goes away.
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(b.host.close());
    assert!(!b.host.close());
    assert_eq!(within(call).await, Err(BridgeError::TransportClosed));
    within(b.page_task).await.unwrap();
    assert!(b.page.is_closed());
}

struct BrokenPipe;

impl Transport for BrokenPipe {
    fn send(&self, _frame: String) -> Result<(), BridgeError> {
        Err(BridgeError::Transport("pipe broken".into()))
    }
}

#[tokio::test]
async fn host_closes_when_reply_write_fails() {
    let host = HostBridge::new(Arc::new(BrokenPipe), BridgeConfig::default());
    let mut events = host.events();
    host.register("ok", |_| Ok(json!(1)));

    let frame = codec::encode(&Envelope::call(CallId(1), "ok", Value::Null));
    assert!(host.handle_frame(&frame).is_none());
    assert!(host.is_closed());

    let mut saw_closed = false;
    while let Ok(e) = events.try_recv() {
        saw_closed |= matches!(e, BridgeEvent::Closed);
    }
    assert!(saw_closed);
}

#[tokio::test]
async fn emit_after_close_fails() {
    let b = bridge();
    b.host.close();
    assert_eq!(
        b.host.emit("onMessage", json!("hi")),
        Err(BridgeError::TransportClosed)
    );
}

#[tokio::test]
async fn unbind_rejects_pending_calls_to_that_function() {
    let b = bridge();
    b.host
        .register_async("never", |_| std::future::pending::<Result<Value, HandlerError>>());

    let call = b.page.invoke_async("never", Value::Null);
    assert!(b.host.unregister("never"));
    assert_eq!(b.page.unbind("never"), 1);
    assert_eq!(
        within(call).await,
        Err(BridgeError::HandlerFailure("function unbound".into()))
    );

    let err = within(b.page.invoke_async("never", Value::Null))
        .await
        .unwrap_err();
    assert_eq!(err, BridgeError::NoSuchFunction("never".into()));
}

// -- Malformed and stray frames --

#[tokio::test]
async fn host_survives_malformed_frames() {
    let b = bridge();
    let mut events = b.host.events();
    b.host.register("ok", |_| Ok(json!(true)));

    assert!(b.host.handle_frame("{\"kind\":\"call\",").is_none());
    assert!(b.host.handle_frame("{\"kind\":\"teleport\"}").is_none());
    assert!(matches!(
        events.try_recv(),
        Ok(BridgeEvent::DecodeFailed { .. })
    ));

    assert_eq!(
        within(b.page.invoke_async("ok", Value::Null)).await,
        Ok(json!(true))
    );
}

#[tokio::test]
async fn page_survives_malformed_and_stray_frames() {
    let b = bridge();
    b.host.register("ok", |_| Ok(json!(1)));

    b.page.handle_frame("not json at all");
    b.page
        .handle_frame(&codec::encode(&Envelope::result(CallId(999), json!("late"))));
    b.page
        .handle_frame(&codec::encode(&Envelope::call(CallId(1), "x", Value::Null)));

    assert_eq!(
        within(b.page.invoke_async("ok", Value::Null)).await,
        Ok(json!(1))
    );
}

#[tokio::test]
async fn host_reports_call_lifecycle() {
    let b = bridge();
    let mut events = b.host.events();
    b.host.register("ok", |_| Ok(Value::Null));

    within(b.page.invoke_async("ok", Value::Null)).await.unwrap();

    assert!(matches!(
        within(events.recv()).await,
        Ok(BridgeEvent::CallReceived { id: Some(_), ref name }) if name == "ok"
    ));
    assert!(matches!(
        within(events.recv()).await,
        Ok(BridgeEvent::CallCompleted { ok: true, ref name, .. }) if name == "ok"
    ));
}

#[tokio::test]
async fn bootstrap_script_lists_registered_functions() {
    let b = bridge();
    b.host.register("get_timestamp", |_| Ok(Value::Null));
    b.host.register_callback("counter_value", |_| {});

    let js = b.host.bootstrap_script();
    assert!(js.contains(r#"var OBJECT = "webview";"#));
    assert!(js.contains(r#"window["counter_value"] = function()"#));
    assert!(js.contains(r#"window["get_timestamp"] = function()"#));

    let unbind = b.host.unbind_script("get_timestamp");
    assert!(unbind.contains("function unbound"));
}

#[tokio::test]
async fn pending_limit_rejects_immediately() {
    let config = BridgeConfig {
        max_pending: 1,
        ..Default::default()
    };
    let b = InMemoryBridge::spawn(config);
    b.host
        .register_async("never", |_| std::future::pending::<Result<Value, HandlerError>>());

    let _first = b.page.invoke_async("never", Value::Null);
    assert_eq!(
        within(b.page.invoke_async("never", Value::Null)).await,
        Err(BridgeError::TooManyPending(1))
    );
}
