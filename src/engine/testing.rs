//! Shared fixtures for engine unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

use super::{EngineConfig, EngineEvent};
use crate::session::{Session, SessionCore, SessionFactory};

pub(super) const WAIT: Duration = Duration::from_secs(5);

/// Session that counts its termination hook calls
pub(super) struct CountingSession {
    core: SessionCore,
    terminations: Arc<AtomicUsize>,
}

impl Session for CountingSession {
    fn core(&self) -> &SessionCore {
        &self.core
    }

    fn on_terminated(&self) {
        self.terminations.fetch_add(1, Ordering::SeqCst);
    }
}

pub(super) fn counting_factory(
    terminations: &Arc<AtomicUsize>,
) -> impl SessionFactory<CountingSession> {
    let terminations = terminations.clone();
    move |core: SessionCore| CountingSession {
        core,
        terminations: terminations.clone(),
    }
}

pub(super) fn loopback_config(capacity: usize, buffer_size: usize) -> EngineConfig {
    EngineConfig {
        bind_address: "127.0.0.1".to_string(),
        port: 0,
        backlog: 16,
        capacity,
        buffer_size,
    }
}

pub(super) async fn next_accepted(
    events: &mut UnboundedReceiver<EngineEvent<CountingSession>>,
) -> Arc<CountingSession> {
    let event = tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for accept")
        .expect("observer channel closed");
    match event {
        EngineEvent::Accepted(session) => session,
        other => panic!("expected Accepted, got {:?}", other),
    }
}

pub(super) async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
