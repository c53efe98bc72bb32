//! Bounded slot pool
//!
//! Fixed-capacity, lock-free container of reusable objects. The pool is
//! filled once at construction and never grows or shrinks afterwards.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;
use tracing::warn;

/// Lock-free pool of pre-built reusable items
pub struct SlotPool<T> {
    idle: ArrayQueue<T>,
    /// Wakes a waiter in `acquire` after every release
    released: Notify,

    // Metrics
    acquires: AtomicU64,
    misses: AtomicU64,
}

impl<T> SlotPool<T> {
    /// Create a pool holding `capacity` items built by `make`
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn filled(capacity: usize, mut make: impl FnMut(usize) -> T) -> Self {
        let idle = ArrayQueue::new(capacity);
        for index in 0..capacity {
            let _ = idle.push(make(index));
        }

        Self {
            idle,
            released: Notify::new(),
            acquires: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Take an idle item without waiting
    /// Returns None if every item is in flight
    pub fn try_acquire(&self) -> Option<T> {
        match self.idle.pop() {
            Some(item) => {
                self.acquires.fetch_add(1, Ordering::Relaxed);
                Some(item)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Take an idle item, waiting for a release if the pool is empty
    pub async fn acquire(&self) -> T {
        loop {
            // Registered before the pop so a release in between is not missed
            let released = self.released.notified();
            if let Some(item) = self.idle.pop() {
                self.acquires.fetch_add(1, Ordering::Relaxed);
                return item;
            }
            released.await;
        }
    }

    /// Return an item to the idle set
    ///
    /// The caller must not keep any other reference to the item's resources.
    /// Releasing into a full pool drops the item instead of growing the pool.
    pub fn release(&self, item: T) {
        if self.idle.push(item).is_err() {
            warn!(
                capacity = self.capacity(),
                "Release into a full slot pool, dropping item"
            );
            return;
        }
        self.released.notify_one();
    }

    /// Remove every idle item
    ///
    /// Only meant for startup wiring, before any item has been acquired.
    pub fn drain_all(&self) -> impl Iterator<Item = T> + '_ {
        std::iter::from_fn(move || self.idle.pop())
    }

    /// Number of idle items
    pub fn idle(&self) -> usize {
        self.idle.len()
    }

    /// Number of items currently checked out
    pub fn in_flight(&self) -> usize {
        self.capacity() - self.idle()
    }

    /// Fixed pool capacity
    pub fn capacity(&self) -> usize {
        self.idle.capacity()
    }

    /// Get pool statistics
    pub fn stats(&self) -> SlotPoolStats {
        let idle = self.idle();
        SlotPoolStats {
            capacity: self.capacity(),
            idle,
            in_flight: self.capacity() - idle,
            acquires: self.acquires.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Slot pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotPoolStats {
    pub capacity: usize,
    pub idle: usize,
    pub in_flight: usize,
    pub acquires: u64,
    pub misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_slot_pool_acquire_release() {
        let pool = SlotPool::filled(3, |i| i);

        let a = pool.try_acquire().unwrap();
        let b = pool.try_acquire().unwrap();
        assert_eq!(pool.idle(), 1);
        assert_eq!(pool.in_flight(), 2);

        pool.release(a);
        pool.release(b);
        assert_eq!(pool.idle(), 3);
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn test_slot_pool_exhaustion() {
        let pool = SlotPool::filled(2, |i| i);

        let _a = pool.try_acquire().unwrap();
        let _b = pool.try_acquire().unwrap();
        assert!(pool.try_acquire().is_none());

        let stats = pool.stats();
        assert_eq!(stats.acquires, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.idle + stats.in_flight, stats.capacity);
    }

    #[test]
    fn test_release_never_exceeds_capacity() {
        let pool = SlotPool::filled(2, |i| i);

        pool.release(99);
        assert_eq!(pool.idle(), 2);
        assert_eq!(pool.capacity(), 2);
    }

    #[test]
    fn test_drain_all_then_refill() {
        let pool = SlotPool::filled(4, |i| i * 10);

        let drained: Vec<usize> = pool.drain_all().collect();
        assert_eq!(drained, vec![0, 10, 20, 30]);
        assert_eq!(pool.idle(), 0);

        for item in drained {
            pool.release(item + 1);
        }
        assert_eq!(pool.idle(), 4);
        assert_eq!(pool.try_acquire(), Some(1));
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let pool = Arc::new(SlotPool::filled(1, |i| i));
        let held = pool.try_acquire().unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        pool.release(held);
        let item = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item, 0);
    }
}
