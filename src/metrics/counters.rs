//! Atomic counters for hot-path metrics
//!
//! Lock-free counters that can be safely updated from any completion.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics instance
pub static METRICS: Metrics = Metrics::new();

/// Atomic metrics counters
pub struct Metrics {
    // Connection metrics
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub accept_failures: AtomicU64,

    // Traffic metrics
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub chunks_received: AtomicU64,
    pub chunks_sent: AtomicU64,
    pub chunks_decrypted: AtomicU64,

    // Pool metrics
    pub send_drops: AtomicU64,
    pub receive_slot_misses: AtomicU64,

    // Error metrics
    pub receive_errors: AtomicU64,
    pub send_errors: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            accept_failures: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            chunks_received: AtomicU64::new(0),
            chunks_sent: AtomicU64::new(0),
            chunks_decrypted: AtomicU64::new(0),
            send_drops: AtomicU64::new(0),
            receive_slot_misses: AtomicU64::new(0),
            receive_errors: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
        }
    }

    // Connection tracking
    #[inline]
    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn accept_failed(&self) {
        self.accept_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Traffic tracking
    #[inline]
    pub fn bytes_rx(&self, count: u64) {
        self.bytes_received.fetch_add(count, Ordering::Relaxed);
        self.chunks_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn bytes_tx(&self, count: u64) {
        self.bytes_sent.fetch_add(count, Ordering::Relaxed);
        self.chunks_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn chunk_decrypted(&self) {
        self.chunks_decrypted.fetch_add(1, Ordering::Relaxed);
    }

    // Pool tracking
    #[inline]
    pub fn send_dropped(&self) {
        self.send_drops.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn receive_slot_miss(&self) {
        self.receive_slot_misses.fetch_add(1, Ordering::Relaxed);
    }

    // Error tracking
    #[inline]
    pub fn receive_error(&self) {
        self.receive_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            accept_failures: self.accept_failures.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            chunks_received: self.chunks_received.load(Ordering::Relaxed),
            chunks_sent: self.chunks_sent.load(Ordering::Relaxed),
            chunks_decrypted: self.chunks_decrypted.load(Ordering::Relaxed),
            send_drops: self.send_drops.load(Ordering::Relaxed),
            receive_slot_misses: self.receive_slot_misses.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics for reporting
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub accept_failures: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub chunks_received: u64,
    pub chunks_sent: u64,
    pub chunks_decrypted: u64,
    pub send_drops: u64,
    pub receive_slot_misses: u64,
    pub receive_errors: u64,
    pub send_errors: u64,
}
