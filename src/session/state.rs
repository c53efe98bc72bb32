//! Per-connection session state

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::watch;
use tracing::{debug, trace};

/// Unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Create from raw u64
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Get raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Outbound payload being flushed in chunks
#[derive(Debug, Clone, Default)]
pub struct Outbound {
    payload: Bytes,
    sent: usize,
    remaining: usize,
}

impl Outbound {
    /// Start flushing a new payload
    pub fn begin(&mut self, payload: Bytes) {
        self.sent = 0;
        self.remaining = payload.len();
        self.payload = payload;
    }

    /// Copy the next unsent chunk into `segment`
    ///
    /// Copies the whole tail if it fits, otherwise exactly `segment.len()`
    /// bytes. Returns the chunk length.
    pub fn stage(&self, segment: &mut [u8]) -> usize {
        let len = self.remaining.min(segment.len());
        segment[..len].copy_from_slice(&self.payload[self.sent..self.sent + len]);
        len
    }

    /// Account for `transferred` bytes written, returning what is left
    pub fn advance(&mut self, transferred: usize) -> usize {
        let transferred = transferred.min(self.remaining);
        self.remaining -= transferred;
        self.sent += transferred;
        self.remaining
    }

    /// The full payload being flushed
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Bytes already written
    pub fn sent(&self) -> usize {
        self.sent
    }

    /// Bytes still to write
    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

/// Engine-owned part of every session
///
/// Holds the socket write half, outbound counters, peer identity and the
/// close/termination latches. The read half lives with the receive loop.
pub struct SessionCore {
    id: SessionId,
    peer_addr: SocketAddr,
    /// Peer IP as a string; the cipher registry key
    peer_address: String,
    local_addr: SocketAddr,
    connected_at: Instant,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    outbound: Mutex<Outbound>,
    closed: watch::Sender<bool>,
    terminated: AtomicBool,
    bytes_rx: AtomicU64,
    bytes_tx: AtomicU64,
}

impl SessionCore {
    /// Create session state around an accepted socket's write half
    pub fn new(
        id: SessionId,
        peer_addr: SocketAddr,
        local_addr: SocketAddr,
        writer: OwnedWriteHalf,
    ) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id,
            peer_addr,
            peer_address: peer_addr.ip().to_string(),
            local_addr,
            connected_at: Instant::now(),
            writer: tokio::sync::Mutex::new(Some(writer)),
            outbound: Mutex::new(Outbound::default()),
            closed,
            terminated: AtomicBool::new(false),
            bytes_rx: AtomicU64::new(0),
            bytes_tx: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Peer address string used for cipher lookup
    pub fn peer_address(&self) -> &str {
        &self.peer_address
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get session duration
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }

    /// Snapshot of the outbound counters
    pub fn outbound(&self) -> Outbound {
        self.outbound.lock().clone()
    }

    pub(crate) fn outbound_mut(&self) -> MutexGuard<'_, Outbound> {
        self.outbound.lock()
    }

    /// Bytes delivered to the observer
    pub fn bytes_rx(&self) -> u64 {
        self.bytes_rx.load(Ordering::Relaxed)
    }

    /// Bytes written to the socket
    pub fn bytes_tx(&self) -> u64 {
        self.bytes_tx.load(Ordering::Relaxed)
    }

    pub(crate) fn record_rx(&self, bytes: usize) {
        self.bytes_rx.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_tx(&self, bytes: usize) {
        self.bytes_tx.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Check if the session has been closed
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Mark the session closed and wake its pending receive and send
    ///
    /// Idempotent: returns true only for the call that actually closed it.
    pub fn close(&self) -> bool {
        let first = self.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        });
        if first {
            debug!(session_id = %self.id, peer = %self.peer_addr, "Session closed");
        }
        first
    }

    /// Resolves once the session is closed
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives in self, so this cannot observe a dropped channel
        let _ = rx.wait_for(|closed| *closed).await;
    }

    pub(crate) async fn writer(
        &self,
    ) -> tokio::sync::MutexGuard<'_, Option<OwnedWriteHalf>> {
        self.writer.lock().await
    }

    /// Shut down and drop the write half
    ///
    /// Safe to call more than once; shutdown failures are expected when the
    /// peer already reset the connection and are suppressed.
    pub(crate) async fn release_socket(&self) {
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                trace!(session_id = %self.id, error = %e, "Shutdown failed during teardown");
            }
        }
    }

    /// Latch the termination hook; true only the first time
    pub(crate) fn mark_terminated(&self) -> bool {
        !self.terminated.swap(true, Ordering::AcqRel)
    }
}

impl std::fmt::Debug for SessionCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCore")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("local_addr", &self.local_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn test_outbound_chunks_tail() {
        let mut outbound = Outbound::default();
        outbound.begin(Bytes::from_static(b"abcdefghij"));

        let mut segment = [0u8; 4];
        let mut chunks = Vec::new();
        while outbound.remaining() > 0 {
            let len = outbound.stage(&mut segment);
            chunks.push(segment[..len].to_vec());
            outbound.advance(len);
        }

        assert_eq!(chunks, vec![b"abcd".to_vec(), b"efgh".to_vec(), b"ij".to_vec()]);
        assert_eq!(outbound.sent(), 10);
    }

    #[test]
    fn test_outbound_partial_transfer() {
        let mut outbound = Outbound::default();
        outbound.begin(Bytes::from_static(b"abcdef"));

        let mut segment = [0u8; 4];
        assert_eq!(outbound.stage(&mut segment), 4);
        assert_eq!(outbound.advance(3), 3);

        let len = outbound.stage(&mut segment);
        assert_eq!(&segment[..len], b"def");
    }

    async fn connected_core() -> (SessionCore, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        let local = server.local_addr().unwrap();
        let (_read, write) = server.into_split();
        (SessionCore::new(SessionId(1), peer, local, write), client)
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (core, _client) = connected_core().await;

        assert!(!core.is_closed());
        assert!(core.close());
        assert!(!core.close());
        assert!(core.is_closed());

        core.release_socket().await;
        core.release_socket().await;
        assert!(core.writer().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_wakes_waiter() {
        let (core, _client) = connected_core().await;
        let core = std::sync::Arc::new(core);

        let waiter = {
            let core = core.clone();
            tokio::spawn(async move { core.closed().await })
        };
        core.close();

        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_peer_address_is_ip() {
        let (core, _client) = connected_core().await;
        assert_eq!(core.peer_address(), "127.0.0.1");
        assert!(core.mark_terminated());
        assert!(!core.mark_terminated());
    }
}
