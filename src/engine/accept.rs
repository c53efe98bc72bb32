//! Accept state machine
//!
//! idle -> waiting-for-slot -> permit-pending -> accept-in-flight -> idle.
//! One accept is kept outstanding; successful completions are handled on
//! their own task so the loop re-enters immediately.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use super::slot::OperationSlot;
use super::EngineShared;
use crate::metrics::METRICS;
use crate::pool::AdmissionPermit;
use crate::session::{Session, SessionCore, SessionId};

impl<S: Session> EngineShared<S> {
    /// Perpetual accept loop; ends when the engine stops or the gate closes
    ///
    /// A stop observed while waiting returns whatever slot and permit the
    /// loop holds.
    pub(super) async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            let mut slot = tokio::select! {
                biased;
                _ = self.stopped() => break,
                slot = self.accept_pool.acquire() => slot,
            };

            let permit = tokio::select! {
                biased;
                _ = self.stopped() => {
                    self.accept_pool.release(slot);
                    break;
                }
                permit = self.gate.wait() => permit,
            };
            let Some(permit) = permit else {
                self.accept_pool.release(slot);
                debug!("Admission gate closed, accept loop stopping");
                return;
            };

            let accepted = tokio::select! {
                biased;
                _ = self.stopped() => {
                    self.accept_pool.release(slot);
                    permit.release();
                    break;
                }
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    slot.record_success(0);
                    tokio::spawn(self.clone().admit(slot, permit, stream, peer_addr));
                }
                Err(e) => self.accept_failed(slot, permit, e),
            }
        }

        debug!("Engine stopping, accept loop stopped");
    }

    /// Recycle the slot of a failed accept
    ///
    /// No session was created, so the permit taken for it is returned at
    /// once instead of shrinking capacity.
    fn accept_failed(&self, mut slot: OperationSlot<S>, permit: AdmissionPermit, error: io::Error) {
        slot.record_error(error.kind());
        METRICS.accept_failed();
        debug!(slot_id = slot.id(), error = %error, "Accept failed");

        self.accept_pool.release(slot.reset());
        permit.release();
    }

    /// Turn an accepted socket into a session and run its receive loop
    async fn admit(
        self: Arc<Self>,
        accept_slot: OperationSlot<S>,
        permit: AdmissionPermit,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) {
        let mut receive_slot = self.acquire_receive_slot(peer_addr).await;

        crate::util::tune_stream(&stream);
        let local_addr = stream.local_addr().unwrap_or(self.local_addr);
        let (reader, writer) = stream.into_split();

        let id = SessionId::from_raw(self.next_session_id.fetch_add(1, Ordering::Relaxed));
        let session = Arc::new(
            self.factory
                .create(SessionCore::new(id, peer_addr, local_addr, writer)),
        );

        receive_slot.bind(session.clone());
        receive_slot.bind_permit(permit);
        self.accept_pool.release(accept_slot.reset());

        METRICS.connection_opened();
        info!(
            session_id = %id,
            %peer_addr,
            receive_slot = receive_slot.id(),
            "Connection accepted"
        );

        self.observer.on_connection_accepted(&session);
        self.receive_loop(receive_slot, reader).await;
    }

    /// Take a receive slot for a freshly accepted connection
    ///
    /// Receive capacity equals admission capacity and slots are returned
    /// before permits, so a miss here means the pools are mis-sized. The same
    /// accepted socket is retried after yielding.
    async fn acquire_receive_slot(&self, peer_addr: SocketAddr) -> OperationSlot<S> {
        let mut warned = false;
        loop {
            if let Some(slot) = self.receive_pool.try_acquire() {
                return slot;
            }
            METRICS.receive_slot_miss();
            if !warned {
                warn!(%peer_addr, "No free receive slot for accepted connection, retrying");
                warned = true;
            }
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::CipherRegistry;
    use crate::engine::testing::{counting_factory, eventually, loopback_config, CountingSession};
    use crate::engine::{Engine, NoopObserver};
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_accept_failure_returns_slot_and_permit() {
        let terminations = Arc::new(AtomicUsize::new(0));
        let shared: EngineShared<CountingSession> = EngineShared::new(
            SocketAddr::from(([127, 0, 0, 1], 0)),
            2,
            16,
            Box::new(counting_factory(&terminations)),
            Arc::new(NoopObserver),
            Arc::new(CipherRegistry::new()),
        );
        let before = shared.stats();

        let slot = shared.accept_pool.try_acquire().unwrap();
        let permit = shared.gate.try_wait().unwrap();
        assert_eq!(shared.stats().permits_outstanding, before.permits_outstanding + 1);

        shared.accept_failed(slot, permit, io::Error::from(io::ErrorKind::ConnectionReset));

        let after = shared.stats();
        assert_eq!(after.permits_outstanding, before.permits_outstanding);
        assert_eq!(after.accept.idle, before.accept.idle);
        assert_eq!(after.accept.in_flight, 0);
        assert_eq!(terminations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_returns_held_slot_and_permit() {
        let terminations = Arc::new(AtomicUsize::new(0));
        let engine = Engine::<CountingSession>::builder(loopback_config(2, 16))
            .factory(counting_factory(&terminations))
            .start()
            .unwrap();

        // Parked in accept() with one slot and one permit
        eventually("accept loop to park", || {
            let stats = engine.stats();
            stats.accept.in_flight == 1 && stats.permits_outstanding == 1
        })
        .await;

        engine.shutdown();

        eventually("accept resources to return", || {
            let stats = engine.stats();
            stats.accept.idle == 2 && stats.permits_outstanding == 0
        })
        .await;
    }
}
