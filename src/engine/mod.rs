//! Connection engine
//!
//! Drives the accept, receive and send state machines over pooled operation
//! slots, a fixed buffer arena and an admission gate. After startup the
//! engine allocates nothing per operation except the copy handed to the
//! data-received observer.

mod accept;
mod observer;
mod receive;
mod send;
mod slot;
#[cfg(test)]
mod testing;

pub use observer::{ChannelObserver, EngineEvent, EngineObserver, NoopObserver};
pub use slot::{OperationSlot, SlotKind};

use bytes::Bytes;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use crate::cipher::CipherRegistry;
use crate::error::{EngineError, Result};
use crate::pool::{AdmissionGate, BufferArena, Segment, SlotPool, SlotPoolStats, DEFAULT_BUF_SIZE};
use crate::session::{Session, SessionFactory};

/// Engine construction parameters
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Address (IP literal or host name) to bind
    pub bind_address: String,
    /// Port to bind (0 picks an ephemeral port)
    pub port: u16,
    /// Listen backlog
    pub backlog: u32,
    /// Maximum concurrent connections and slot count of every pool
    pub capacity: usize,
    /// Size of every arena segment
    pub buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 0,
            backlog: 1024,
            capacity: 1024,
            buffer_size: DEFAULT_BUF_SIZE,
        }
    }
}

impl EngineConfig {
    /// Resolve the bind address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let invalid = |reason: String| EngineError::InvalidAddress {
            address: self.bind_address.clone(),
            reason,
        };

        (self.bind_address.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| invalid(e.to_string()))?
            .next()
            .ok_or_else(|| invalid("resolved to no address".to_string()))
    }

    /// Validate pool sizing
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(EngineError::InvalidCapacity(self.capacity));
        }
        let arena_fits = self
            .capacity
            .checked_mul(self.buffer_size)
            .and_then(|n| n.checked_mul(2))
            .is_some();
        if self.buffer_size == 0 || !arena_fits {
            return Err(EngineError::InvalidBufferSize {
                buffer_size: self.buffer_size,
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

/// Builder for [`Engine`]
pub struct EngineBuilder<S> {
    config: EngineConfig,
    factory: Option<Box<dyn SessionFactory<S>>>,
    observer: Arc<dyn EngineObserver<S>>,
    ciphers: Arc<CipherRegistry>,
}

impl<S: Session> EngineBuilder<S> {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            factory: None,
            observer: Arc::new(NoopObserver),
            ciphers: Arc::new(CipherRegistry::new()),
        }
    }

    /// Session factory invoked once per accepted connection (required)
    pub fn factory(mut self, factory: impl SessionFactory<S>) -> Self {
        self.factory = Some(Box::new(factory));
        self
    }

    pub fn observer(mut self, observer: impl EngineObserver<S>) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Share an existing cipher registry instead of an empty one
    pub fn ciphers(mut self, ciphers: Arc<CipherRegistry>) -> Self {
        self.ciphers = ciphers;
        self
    }

    /// Bind the listener, build the pools and start accepting
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> Result<Engine<S>> {
        let Self {
            config,
            factory,
            observer,
            ciphers,
        } = self;

        config.validate()?;
        let address = config.socket_addr()?;
        let factory = factory.ok_or(EngineError::MissingFactory)?;

        let std_listener = crate::util::create_tcp_listener(address, config.backlog)
            .map_err(|source| EngineError::Bind { address, source })?;
        let listener = TcpListener::from_std(std_listener)?;
        let local_addr = listener.local_addr()?;

        let shared = Arc::new(EngineShared::new(
            local_addr,
            config.capacity,
            config.buffer_size,
            factory,
            observer,
            ciphers,
        ));

        info!(
            %local_addr,
            capacity = config.capacity,
            buffer_size = config.buffer_size,
            backlog = config.backlog,
            "Engine listening"
        );

        tokio::spawn(shared.clone().accept_loop(listener));

        Ok(Engine { shared })
    }
}

/// Running connection engine
pub struct Engine<S: Session> {
    shared: Arc<EngineShared<S>>,
}

impl<S: Session> Engine<S> {
    pub fn builder(config: EngineConfig) -> EngineBuilder<S> {
        EngineBuilder::new(config)
    }

    /// Queue `bytes` for chunked transmission to `session`
    ///
    /// Best-effort: silently dropped if no send slot is free. Must be called
    /// from within a tokio runtime.
    pub fn send(&self, session: &Arc<S>, bytes: impl Into<Bytes>) {
        self.shared.send(session, bytes.into());
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    /// Segment size (and maximum chunk size)
    pub fn buf_size(&self) -> usize {
        self.shared.buf_size
    }

    pub fn capacity(&self) -> usize {
        self.shared.gate.capacity()
    }

    pub fn ciphers(&self) -> &Arc<CipherRegistry> {
        &self.shared.ciphers
    }

    /// Snapshot of pool and admission state
    pub fn stats(&self) -> EngineStats {
        self.shared.stats()
    }

    /// Stop accepting new connections
    ///
    /// The accept loop returns any slot and permit it holds and drops the
    /// listener. Live sessions keep running until their receive path ends
    /// them.
    pub fn shutdown(&self) {
        self.shared.stop();
        self.shared.gate.close();
        info!(local_addr = %self.shared.local_addr, "Engine stopped accepting");
    }
}

impl<S: Session> Drop for Engine<S> {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

/// Pool and admission snapshot
#[derive(Debug, Clone, Copy)]
pub struct EngineStats {
    pub capacity: usize,
    pub buf_size: usize,
    pub accept: SlotPoolStats,
    pub receive: SlotPoolStats,
    pub send: SlotPoolStats,
    pub permits_available: usize,
    pub permits_outstanding: usize,
}

/// State shared by the accept loop and every session task
pub(crate) struct EngineShared<S> {
    local_addr: SocketAddr,
    buf_size: usize,
    accept_pool: SlotPool<OperationSlot<S>>,
    receive_pool: SlotPool<OperationSlot<S>>,
    send_pool: SlotPool<OperationSlot<S>>,
    gate: AdmissionGate,
    ciphers: Arc<CipherRegistry>,
    factory: Box<dyn SessionFactory<S>>,
    observer: Arc<dyn EngineObserver<S>>,
    next_session_id: AtomicU64,
    stopping: watch::Sender<bool>,
}

impl<S: Session> EngineShared<S> {
    fn new(
        local_addr: SocketAddr,
        capacity: usize,
        buf_size: usize,
        factory: Box<dyn SessionFactory<S>>,
        observer: Arc<dyn EngineObserver<S>>,
        ciphers: Arc<CipherRegistry>,
    ) -> Self {
        let arena = BufferArena::new(capacity, buf_size);
        let arena_bytes = arena.total_size();
        let (receive_segments, send_segments) = arena.into_segments();

        let accept_pool = SlotPool::filled(capacity, |id| OperationSlot::new(id, SlotKind::Accept));
        let receive_pool = SlotPool::filled(capacity, |id| OperationSlot::new(id, SlotKind::Receive));
        let send_pool = SlotPool::filled(capacity, |id| OperationSlot::new(id, SlotKind::Send));

        attach_segments(&receive_pool, receive_segments);
        attach_segments(&send_pool, send_segments);

        info!(capacity, buf_size, arena_bytes, "Slot pools initialized");

        Self {
            local_addr,
            buf_size,
            accept_pool,
            receive_pool,
            send_pool,
            gate: AdmissionGate::new(capacity),
            ciphers,
            factory,
            observer,
            next_session_id: AtomicU64::new(1),
            stopping: watch::channel(false).0,
        }
    }

    /// Signal the accept loop to stop
    fn stop(&self) {
        self.stopping.send_replace(true);
    }

    /// Resolves once the engine is stopping
    async fn stopped(&self) {
        let mut rx = self.stopping.subscribe();
        // The sender lives in self, so this cannot observe a dropped channel
        let _ = rx.wait_for(|stopping| *stopping).await;
    }

    /// Route a finished receive or send to its state machine
    ///
    /// Returns the slot when the operation should be re-issued on it.
    pub(crate) async fn dispatch(
        &self,
        slot: OperationSlot<S>,
        result: io::Result<usize>,
    ) -> Option<OperationSlot<S>> {
        match slot.kind() {
            SlotKind::Receive => self.complete_receive(slot, result).await,
            SlotKind::Send => self.complete_send(slot, result),
            SlotKind::Accept => {
                error!(slot_id = slot.id(), "Accept slot routed to transfer dispatch");
                self.accept_pool.release(slot.reset());
                None
            }
        }
    }

    fn stats(&self) -> EngineStats {
        EngineStats {
            capacity: self.gate.capacity(),
            buf_size: self.buf_size,
            accept: self.accept_pool.stats(),
            receive: self.receive_pool.stats(),
            send: self.send_pool.stats(),
            permits_available: self.gate.available(),
            permits_outstanding: self.gate.outstanding(),
        }
    }
}

/// Give every slot in `pool` its permanent segment
fn attach_segments<S>(pool: &SlotPool<OperationSlot<S>>, segments: Vec<Segment>) {
    // Collected first so re-released slots are not drained again
    let slots: Vec<_> = pool.drain_all().collect();
    for (mut slot, segment) in slots.into_iter().zip(segments) {
        slot.attach(segment);
        pool.release(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_rejects_zero_capacity() {
        let config = EngineConfig {
            capacity: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::InvalidCapacity(0))));
    }

    #[test]
    fn test_config_rejects_zero_buffer() {
        let config = EngineConfig {
            buffer_size: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidBufferSize { .. })
        ));
    }

    #[test]
    fn test_config_rejects_bad_address() {
        let config = EngineConfig {
            bind_address: "not an address".to_string(),
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.socket_addr(),
            Err(EngineError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_attach_segments_covers_every_slot() {
        let pool: SlotPool<OperationSlot<()>> =
            SlotPool::filled(3, |id| OperationSlot::new(id, SlotKind::Send));
        let (_, send) = BufferArena::new(3, 16).into_segments();

        attach_segments(&pool, send);

        let slots: Vec<_> = pool.drain_all().collect();
        assert_eq!(slots.len(), 3);
        let mut offsets: Vec<usize> = slots.iter().filter_map(|s| s.segment_offset()).collect();
        offsets.sort_unstable();
        assert_eq!(offsets, vec![48, 64, 80]);
    }
}
