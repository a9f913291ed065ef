//! Connection lifecycle tests over the in-memory transport.
//!
//! Time is paused, so reconnect delays are observed exactly.

mod common;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use proptest::prelude::*;
use resilient_stream::{
    CloseReason, ConnectionState, FixedJitter, MemoryTransport, ThreadRngJitter,
};

use common::{Counter, assert_near, builder, offsets_ms, settle};

/// interval 1000ms, 3 attempts: opens at 0, ~1000, ~3000, ~7000, then Closed.
#[tokio::test(start_paused = true)]
async fn test_exhaustion_schedule() {
    let transport = MemoryTransport::refusing();
    let terminal = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&terminal);

    let connection = builder(&transport)
        .reconnect_interval(Duration::from_millis(1000))
        .max_reconnect_attempts(3)
        .on_terminal(move |reason| sink.lock().push(reason))
        .build()
        .unwrap();
    let mut updates = connection.subscribe();

    connection.connect().unwrap();
    let snapshot = updates
        .wait_for(|s| s.state == ConnectionState::Closed)
        .await
        .unwrap()
        .clone();

    assert_eq!(snapshot.attempts, 3);
    assert_eq!(snapshot.close_reason, Some(CloseReason::Exhausted));
    assert!(!snapshot.reconnect_pending);
    assert!(snapshot.needs_manual_retry());
    assert!(snapshot.last_error.is_some());

    let offsets = offsets_ms(&transport.open_times());
    assert_eq!(offsets.len(), 4);
    for (actual, expected) in offsets.iter().zip([0, 1000, 3000, 7000]) {
        assert_near(*actual, expected);
    }

    // No timer left behind
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.open_count(), 4);
    assert_eq!(*terminal.lock(), vec![CloseReason::Exhausted]);
}

#[tokio::test(start_paused = true)]
async fn test_delay_capped_at_max() {
    let transport = MemoryTransport::refusing();
    let connection = builder(&transport)
        .reconnect_interval(Duration::from_millis(1000))
        .max_reconnect_delay(Duration::from_millis(2500))
        .max_reconnect_attempts(4)
        .build()
        .unwrap();
    let mut updates = connection.subscribe();

    connection.connect().unwrap();
    updates.wait_for(|s| s.state.is_terminal()).await.unwrap();

    let offsets = offsets_ms(&transport.open_times());
    for (actual, expected) in offsets.iter().zip([0, 1000, 3000, 5500, 8000]) {
        assert_near(*actual, expected);
    }
}

#[tokio::test(start_paused = true)]
async fn test_random_jitter_stays_in_window() {
    let transport = MemoryTransport::refusing();
    let connection = builder(&transport)
        .reconnect_interval(Duration::from_millis(1000))
        .max_reconnect_attempts(3)
        .jitter(ThreadRngJitter)
        .build()
        .unwrap();
    let mut updates = connection.subscribe();

    connection.connect().unwrap();
    updates.wait_for(|s| s.state.is_terminal()).await.unwrap();

    let times = transport.open_times();
    let gaps: Vec<u64> = times
        .windows(2)
        .map(|pair| pair[1].duration_since(pair[0]).as_millis() as u64)
        .collect();

    assert_eq!(gaps.len(), 3);
    for (gap, base) in gaps.iter().zip([1000u64, 2000, 4000]) {
        assert!(*gap >= base && *gap < base + 1000 + 5, "gap {gap}ms for base {base}ms");
    }
}

#[tokio::test(start_paused = true)]
async fn test_fixed_jitter_added_to_delay() {
    let transport = MemoryTransport::refusing();
    let connection = builder(&transport)
        .reconnect_interval(Duration::from_millis(1000))
        .max_reconnect_attempts(1)
        .jitter(FixedJitter(Duration::from_millis(250)))
        .build()
        .unwrap();
    let mut updates = connection.subscribe();

    connection.connect().unwrap();
    updates.wait_for(|s| s.state.is_terminal()).await.unwrap();

    let offsets = offsets_ms(&transport.open_times());
    assert_eq!(offsets.len(), 2);
    assert_near(offsets[1], 1250);
}

/// Two failures then success: counter back to 0, next failure restarts at base.
#[tokio::test(start_paused = true)]
async fn test_successful_open_resets_attempts() {
    let transport = MemoryTransport::accepting();
    transport.push_refusals(2);

    let connection = builder(&transport)
        .reconnect_interval(Duration::from_millis(1000))
        .max_reconnect_attempts(5)
        .build()
        .unwrap();
    let mut updates = connection.subscribe();

    connection.connect().unwrap();
    let snapshot = updates.wait_for(|s| s.is_connected()).await.unwrap().clone();
    assert_eq!(snapshot.attempts, 0);
    assert_eq!(transport.open_count(), 3);

    let offsets = offsets_ms(&transport.open_times());
    assert_near(offsets[1], 1000);
    assert_near(offsets[2], 3000);

    // Lose the handle; the next delay starts from the base again
    let peer = transport.next_peer().await.unwrap();
    let lost_at = tokio::time::Instant::now();
    peer.close();

    updates.wait_for(|s| s.reconnect_pending).await.unwrap();
    assert_eq!(connection.attempts(), 1);

    updates.wait_for(|s| s.is_connected()).await.unwrap();
    let reopened = *transport.open_times().last().unwrap();
    assert_near(reopened.duration_since(lost_at).as_millis() as u64, 1000);
    assert_eq!(connection.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_and_unknown_frames_are_ignored() {
    let transport = MemoryTransport::accepting();
    let delivered = Counter::default();
    let hits = delivered.clone();

    let connection = builder(&transport)
        .on_kind("node_started", move |_| hits.hit())
        .build()
        .unwrap();
    let mut updates = connection.subscribe();

    connection.connect().unwrap();
    updates.wait_for(|s| s.is_connected()).await.unwrap();
    let peer = transport.next_peer().await.unwrap();

    assert!(peer.send("{not json"));
    assert!(peer.send(r#"{"no_type":true}"#));
    assert!(peer.send(r#"{"type":"surprise"}"#));
    assert!(peer.send(r#"{"type":"node_started","node_id":"n1"}"#));

    let snapshot = updates
        .wait_for(|s| s.last_message.is_some())
        .await
        .unwrap()
        .clone();

    assert_eq!(snapshot.state, ConnectionState::Open);
    assert_eq!(snapshot.attempts, 0);
    assert!(snapshot.last_error.is_none());
    assert_eq!(snapshot.last_message.unwrap().kind, "node_started");
    assert_eq!(delivered.get(), 1);
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_messages_delivered_in_order() {
    let transport = MemoryTransport::accepting();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let connection = builder(&transport)
        .on_message(move |message| sink.lock().push(message.get_str("seq").map(str::to_owned)))
        .build()
        .unwrap();

    connection.connect().unwrap();
    let peer = transport.next_peer().await.unwrap();
    for seq in 1..=5 {
        peer.send(format!(r#"{{"type":"log","seq":"{seq}"}}"#));
    }
    settle().await;

    let seen: Vec<String> = seen.lock().iter().flatten().cloned().collect();
    assert_eq!(seen, ["1", "2", "3", "4", "5"]);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_kind_handler_keeps_connection_open() {
    let transport = MemoryTransport::accepting();
    let delivered = Counter::default();
    let hits = delivered.clone();

    let connection = builder(&transport)
        .on_kind("boom", |_| panic!("handler failed"))
        .on_kind("log", move |_| hits.hit())
        .build()
        .unwrap();
    let mut updates = connection.subscribe();

    connection.connect().unwrap();
    updates.wait_for(|s| s.is_connected()).await.unwrap();
    let peer = transport.next_peer().await.unwrap();

    assert!(peer.send(r#"{"type":"boom"}"#));
    assert!(peer.send(r#"{"type":"log","seq":"1"}"#));
    updates
        .wait_for(|s| s.last_message.as_ref().is_some_and(|m| m.kind == "log"))
        .await
        .unwrap();

    assert_eq!(connection.state(), ConnectionState::Open);
    assert_eq!(delivered.get(), 1);
    assert_eq!(transport.live_handles(), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connection.state(), ConnectionState::Open);
    assert_eq!(transport.open_count(), 1);
    assert!(!peer.closed_by_client());
}

#[tokio::test(start_paused = true)]
async fn test_panicking_callbacks_do_not_stall_reconnect() {
    let transport = MemoryTransport::accepting();
    let seen = Counter::default();
    let hits = seen.clone();

    let connection = builder(&transport)
        .on_open(|| panic!("open callback failed"))
        .on_message(move |message| {
            hits.hit();
            if message.kind == "boom" {
                panic!("message callback failed");
            }
        })
        .on_close(|| panic!("close callback failed"))
        .build()
        .unwrap();
    let mut updates = connection.subscribe();

    connection.connect().unwrap();
    updates.wait_for(|s| s.is_connected()).await.unwrap();
    let peer = transport.next_peer().await.unwrap();

    assert!(peer.send(r#"{"type":"boom"}"#));
    assert!(peer.send(r#"{"type":"log"}"#));
    updates
        .wait_for(|s| s.last_message.as_ref().is_some_and(|m| m.kind == "log"))
        .await
        .unwrap();
    assert_eq!(seen.get(), 2);
    assert_eq!(connection.state(), ConnectionState::Open);

    // Loss is still detected and retried after the callbacks panicked
    peer.fail("reset by peer");
    updates.wait_for(|s| s.reconnect_pending).await.unwrap();
    updates.wait_for(|s| s.is_connected()).await.unwrap();
    settle().await;

    assert_eq!(transport.open_count(), 2);
    assert_eq!(transport.live_handles(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_is_noop_while_active() {
    let transport = MemoryTransport::accepting();
    let connection = builder(&transport).build().unwrap();
    let mut updates = connection.subscribe();

    connection.connect().unwrap();
    connection.connect().unwrap();
    updates.wait_for(|s| s.is_connected()).await.unwrap();
    connection.connect().unwrap();
    settle().await;

    assert_eq!(transport.open_count(), 1);
    assert_eq!(transport.live_handles(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_idempotent_and_closes_normally() {
    let transport = MemoryTransport::accepting();
    let closed = Counter::default();
    let close_hits = closed.clone();

    let connection = builder(&transport)
        .on_close(move || close_hits.hit())
        .build()
        .unwrap();
    let mut updates = connection.subscribe();

    connection.connect().unwrap();
    updates.wait_for(|s| s.is_connected()).await.unwrap();
    let peer = transport.next_peer().await.unwrap();

    updates.mark_unchanged();
    connection.disconnect();
    assert!(updates.has_changed().unwrap());
    updates.mark_unchanged();

    connection.disconnect();
    assert!(!updates.has_changed().unwrap());

    connection.shutdown().await;

    let snapshot = connection.snapshot();
    assert_eq!(snapshot.state, ConnectionState::Closed);
    assert_eq!(snapshot.close_reason, Some(CloseReason::Disconnected));
    assert!(!snapshot.needs_manual_retry());
    assert!(peer.closed_by_client());
    assert_eq!(transport.live_handles(), 0);
    assert_eq!(closed.get(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnect() {
    let transport = MemoryTransport::refusing();
    let connection = builder(&transport)
        .reconnect_interval(Duration::from_millis(1000))
        .build()
        .unwrap();
    let mut updates = connection.subscribe();

    connection.connect().unwrap();
    updates.wait_for(|s| s.reconnect_pending).await.unwrap();
    assert_eq!(connection.state(), ConnectionState::Failed);

    connection.disconnect();
    assert!(!connection.is_reconnect_pending());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_drop_cancels_pending_reconnect() {
    let transport = MemoryTransport::refusing();
    let connection = builder(&transport).build().unwrap();
    let mut updates = connection.subscribe();

    connection.connect().unwrap();
    updates.wait_for(|s| s.reconnect_pending).await.unwrap();
    let opens = transport.open_count();

    drop(connection);
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(transport.open_count(), opens);
}

#[tokio::test(start_paused = true)]
async fn test_drop_releases_open_handle() {
    let transport = MemoryTransport::accepting();
    let connection = builder(&transport).build().unwrap();
    let mut updates = connection.subscribe();

    connection.connect().unwrap();
    updates.wait_for(|s| s.is_connected()).await.unwrap();
    let peer = transport.next_peer().await.unwrap();

    drop(connection);
    settle().await;

    assert!(peer.closed_by_client());
    assert_eq!(transport.live_handles(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_disabled_closes_on_loss() {
    let transport = MemoryTransport::accepting();
    let terminal = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&terminal);

    let connection = builder(&transport)
        .reconnect(false)
        .on_terminal(move |reason| sink.lock().push(reason))
        .build()
        .unwrap();
    let mut updates = connection.subscribe();

    connection.connect().unwrap();
    updates.wait_for(|s| s.is_connected()).await.unwrap();
    transport.next_peer().await.unwrap().close();

    let snapshot = updates
        .wait_for(|s| s.state.is_terminal())
        .await
        .unwrap()
        .clone();

    assert_eq!(snapshot.close_reason, Some(CloseReason::ReconnectDisabled));
    assert_eq!(snapshot.attempts, 0);
    assert!(snapshot.needs_manual_retry());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(*terminal.lock(), vec![CloseReason::ReconnectDisabled]);
}

#[tokio::test(start_paused = true)]
async fn test_callbacks_follow_lifecycle() {
    let transport = MemoryTransport::accepting();
    let opened = Counter::default();
    let errored = Counter::default();
    let closed = Counter::default();

    let (o, e, c) = (opened.clone(), errored.clone(), closed.clone());
    let connection = builder(&transport)
        .max_reconnect_attempts(1)
        .on_open(move || o.hit())
        .on_error(move |_| e.hit())
        .on_close(move || c.hit())
        .build()
        .unwrap();
    let mut updates = connection.subscribe();

    connection.connect().unwrap();
    updates.wait_for(|s| s.is_connected()).await.unwrap();
    transport.next_peer().await.unwrap().fail("reset by peer");

    updates.wait_for(|s| s.reconnect_pending).await.unwrap();
    assert_eq!(opened.get(), 1);
    assert_eq!(errored.get(), 1);
    assert_eq!(closed.get(), 1);
    assert!(
        connection
            .snapshot()
            .last_error
            .unwrap()
            .message
            .contains("reset by peer")
    );

    // Clean remote close: close fires, error does not
    updates.wait_for(|s| s.is_connected()).await.unwrap();
    transport.next_peer().await.unwrap().close();
    updates.wait_for(|s| s.reconnect_pending).await.unwrap();

    assert_eq!(opened.get(), 2);
    assert_eq!(errored.get(), 1);
    assert_eq!(closed.get(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reset_returns_to_idle() {
    let transport = MemoryTransport::refusing();
    let connection = builder(&transport).max_reconnect_attempts(1).build().unwrap();
    let mut updates = connection.subscribe();

    connection.connect().unwrap();
    updates.wait_for(|s| s.state.is_terminal()).await.unwrap();
    assert_eq!(connection.attempts(), 1);

    connection.reset();
    let snapshot = connection.snapshot();
    assert_eq!(snapshot.state, ConnectionState::Idle);
    assert_eq!(snapshot.attempts, 0);
    assert!(snapshot.last_error.is_none());
    assert!(snapshot.last_message.is_none());
    assert!(snapshot.close_reason.is_none());

    // Usable again after reset
    transport.push_accept();
    connection.connect().unwrap();
    updates.wait_for(|s| s.is_connected()).await.unwrap();
    assert_eq!(transport.open_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_after_exhaustion() {
    let transport = MemoryTransport::refusing();
    let connection = builder(&transport).max_reconnect_attempts(0).build().unwrap();
    let mut updates = connection.subscribe();

    connection.connect().unwrap();
    updates.wait_for(|s| s.state.is_terminal()).await.unwrap();
    assert_eq!(transport.open_count(), 1);

    transport.push_accept();
    connection.connect().unwrap();
    let snapshot = updates.wait_for(|s| s.is_connected()).await.unwrap().clone();

    assert!(snapshot.close_reason.is_none());
    assert_eq!(transport.open_count(), 2);
}

// ============================================================================
// Random Lifecycle Sequences
// ============================================================================

#[derive(Debug, Clone)]
enum Step {
    Connect,
    Disconnect,
    Reset,
    Sleep(u64),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Connect),
        Just(Step::Disconnect),
        Just(Step::Reset),
        (1u64..8_000).prop_map(Step::Sleep),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_random_lifecycle_keeps_one_handle(
        refusals in 0usize..6,
        steps in prop::collection::vec(step(), 1..24),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();

        runtime.block_on(async {
            let transport = MemoryTransport::accepting();
            transport.push_refusals(refusals);
            let connection = builder(&transport)
                .max_reconnect_attempts(3)
                .build()
                .unwrap();

            for step in &steps {
                match step {
                    Step::Connect => connection.connect().unwrap(),
                    Step::Disconnect => connection.disconnect(),
                    Step::Reset => connection.reset(),
                    Step::Sleep(ms) => tokio::time::sleep(Duration::from_millis(*ms)).await,
                }
                settle().await;

                let live = transport.live_handles();
                let state = connection.state();
                assert!(live <= 1, "{live} live handles after {step:?}");
                if state == ConnectionState::Open {
                    assert_eq!(live, 1, "open without a handle after {step:?}");
                }
                if matches!(state, ConnectionState::Idle | ConnectionState::Closed) {
                    assert_eq!(live, 0, "{state:?} with a live handle after {step:?}");
                }
            }

            connection.disconnect();
            settle().await;
            let opens = transport.open_count();
            tokio::time::sleep(Duration::from_secs(120)).await;

            assert_eq!(transport.live_handles(), 0);
            assert_eq!(transport.open_count(), opens);
            assert!(!connection.is_reconnect_pending());
        });
    }
}
