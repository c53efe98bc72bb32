//! Admission gate
//!
//! Counting semaphore that bounds the number of simultaneously accepted
//! and alive connections, independent of the listen backlog.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting permit store sized to the engine capacity
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionGate {
    /// Create a gate with `capacity` permits
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait until a permit is free and take it
    ///
    /// Returns None once the gate has been closed.
    pub async fn wait(&self) -> Option<AdmissionPermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .ok()
            .map(|permit| AdmissionPermit { _permit: permit })
    }

    /// Take a permit if one is free right now
    pub fn try_wait(&self) -> Option<AdmissionPermit> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| AdmissionPermit { _permit: permit })
    }

    /// Permits currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Permits currently held by connections
    pub fn outstanding(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// Configured maximum concurrent connections
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reject all current and future waiters
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// One connection's admission
///
/// Releasing (or dropping) returns exactly one permit to the gate, so a
/// permit can never be returned twice.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionPermit {
    /// Return the permit, waking one blocked waiter if any
    pub fn release(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_gate_bounds_outstanding() {
        let gate = AdmissionGate::new(2);

        let a = gate.try_wait().unwrap();
        let _b = gate.try_wait().unwrap();
        assert!(gate.try_wait().is_none());
        assert_eq!(gate.outstanding(), 2);

        a.release();
        assert_eq!(gate.outstanding(), 1);
        assert_eq!(gate.available(), 1);
    }

    #[test]
    fn test_wait_blocks_until_release() {
        let gate = AdmissionGate::new(1);
        let held = gate.try_wait().unwrap();

        let mut waiter = task::spawn(gate.wait());
        assert_pending!(waiter.poll());

        held.release();
        assert!(waiter.is_woken());
        let permit = assert_ready!(waiter.poll());
        assert!(permit.is_some());
        assert_eq!(gate.outstanding(), 1);
    }

    #[test]
    fn test_closed_gate_rejects_waiters() {
        let gate = AdmissionGate::new(1);
        let _held = gate.try_wait().unwrap();

        let mut waiter = task::spawn(gate.wait());
        assert_pending!(waiter.poll());

        gate.close();
        assert!(assert_ready!(waiter.poll()).is_none());
    }
}
