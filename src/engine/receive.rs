//! Receive loop
//!
//! Exactly one read is outstanding per session. A zero-length read or any
//! error is the only way a connection ends, and the only place its
//! admission permit is returned.

use bytes::BytesMut;
use std::io;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tracing::{debug, error, info};

use super::slot::OperationSlot;
use super::EngineShared;
use crate::metrics::METRICS;
use crate::session::Session;

impl<S: Session> EngineShared<S> {
    /// Read into the slot's segment until the connection ends
    pub(super) async fn receive_loop(&self, mut slot: OperationSlot<S>, mut reader: OwnedReadHalf) {
        let Some(session) = slot.session().cloned() else {
            error!(slot_id = slot.id(), "Receive loop started on an unbound slot");
            self.receive_pool.release(slot.reset());
            return;
        };

        loop {
            // A close from the send path fails the pending read
            let result = tokio::select! {
                biased;
                _ = session.core().closed() => Err(io::Error::from(io::ErrorKind::ConnectionAborted)),
                result = reader.read(slot.buffer_mut()) => result,
            };

            match self.dispatch(slot, result).await {
                Some(next) => slot = next,
                None => break,
            }
        }
    }

    /// Handle one receive completion
    pub(super) async fn complete_receive(
        &self,
        mut slot: OperationSlot<S>,
        result: io::Result<usize>,
    ) -> Option<OperationSlot<S>> {
        let Some(session) = slot.session().cloned() else {
            error!(slot_id = slot.id(), "Receive completed on an unbound slot");
            self.receive_pool.release(slot.reset());
            return None;
        };
        let core = session.core();

        match result {
            Ok(0) => {
                slot.record_success(0);
                debug!(session_id = %core.id(), "Peer closed connection");
            }
            Ok(n) => {
                slot.record_success(n);

                // Copy out so the segment is free for the next read
                let mut data = BytesMut::from(&slot.buffer()[..n]);
                if self.ciphers.decrypt(core.peer_address(), &mut data) {
                    METRICS.chunk_decrypted();
                }

                core.record_rx(n);
                METRICS.bytes_rx(n as u64);
                self.observer.on_data_received(&session, data.freeze(), n);
                return Some(slot);
            }
            Err(e) => {
                slot.record_error(e.kind());
                METRICS.receive_error();
                debug!(session_id = %core.id(), error = %e, "Receive failed");
            }
        }

        self.terminate(slot, &session).await;
        None
    }

    /// Tear the connection down and recycle its receive slot and permit
    async fn terminate(&self, mut slot: OperationSlot<S>, session: &Arc<S>) {
        let core = session.core();

        core.close();
        core.release_socket().await;
        if core.mark_terminated() {
            session.on_terminated();
        }

        // Slot before permit: an admitted connection always finds a slot
        let permit = slot.take_permit();
        self.receive_pool.release(slot.reset());
        if let Some(permit) = permit {
            permit.release();
        }

        METRICS.connection_closed();
        info!(
            session_id = %core.id(),
            peer_addr = %core.peer_addr(),
            duration_secs = core.duration().as_secs_f64(),
            bytes_rx = core.bytes_rx(),
            bytes_tx = core.bytes_tx(),
            "Connection closed"
        );
    }
}
