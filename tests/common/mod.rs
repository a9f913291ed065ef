//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use resilient_stream::{Connection, ConnectionBuilder, MemoryTransport, NoJitter};
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

/// Installs a test subscriber once. Controlled by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builder wired to `transport` with deterministic backoff.
pub fn builder(transport: &MemoryTransport) -> ConnectionBuilder {
    init_tracing();
    Connection::builder()
        .endpoint("ws://memory/stream")
        .transport(transport.clone())
        .jitter(NoJitter)
}

/// Milliseconds of each open relative to the first one.
pub fn offsets_ms(times: &[Instant]) -> Vec<u64> {
    let Some(first) = times.first() else {
        return Vec::new();
    };
    times
        .iter()
        .map(|t| t.duration_since(*first).as_millis() as u64)
        .collect()
}

/// Asserts `actual` is within a few milliseconds of `expected`.
pub fn assert_near(actual: u64, expected: u64) {
    assert!(
        actual.abs_diff(expected) <= 5,
        "expected ~{expected}ms, got {actual}ms"
    );
}

/// Shared counter for callback assertions.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lets the session task run without advancing far in time.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
