//! Chunked send loop
//!
//! A payload is copied through the send slot's segment at most
//! `buf_size` bytes at a time until it is flushed or a write fails.

use bytes::Bytes;
use std::io;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, trace};

use super::slot::OperationSlot;
use super::EngineShared;
use crate::metrics::METRICS;
use crate::session::Session;

impl<S: Session> EngineShared<S> {
    /// Start flushing `payload` to `session` if a send slot is free
    pub(super) fn send(self: &Arc<Self>, session: &Arc<S>, payload: Bytes) {
        let Some(mut slot) = self.send_pool.try_acquire() else {
            METRICS.send_dropped();
            trace!(
                session_id = %session.core().id(),
                len = payload.len(),
                "No free send slot, dropping payload"
            );
            return;
        };

        slot.bind(session.clone());
        tokio::spawn(self.clone().send_loop(slot, payload));
    }

    async fn send_loop(self: Arc<Self>, mut slot: OperationSlot<S>, payload: Bytes) {
        let Some(session) = slot.session().cloned() else {
            error!(slot_id = slot.id(), "Send started on an unbound slot");
            self.send_pool.release(slot.reset());
            return;
        };
        let core = session.core();

        // Held for the whole payload so payloads on one session never interleave
        let mut writer = core.writer().await;
        core.outbound_mut().begin(payload);

        loop {
            let staged = core.outbound_mut().stage(slot.buffer_mut());
            slot.set_staged(staged);

            let result = match writer.as_mut() {
                Some(stream) => tokio::select! {
                    biased;
                    _ = core.closed() => Err(io::Error::from(io::ErrorKind::ConnectionAborted)),
                    result = stream.write(&slot.buffer()[..staged]) => result,
                },
                None => Err(io::Error::from(io::ErrorKind::NotConnected)),
            };

            match self.dispatch(slot, result).await {
                Some(next) => slot = next,
                None => break,
            }
        }
    }

    /// Handle one send completion
    pub(super) fn complete_send(
        &self,
        mut slot: OperationSlot<S>,
        result: io::Result<usize>,
    ) -> Option<OperationSlot<S>> {
        let Some(session) = slot.session().cloned() else {
            error!(slot_id = slot.id(), "Send completed on an unbound slot");
            self.send_pool.release(slot.reset());
            return None;
        };
        let core = session.core();

        let result = match result {
            Ok(0) if slot.staged() > 0 => Err(io::Error::from(io::ErrorKind::WriteZero)),
            other => other,
        };

        match result {
            Ok(n) => {
                slot.record_success(n);
                let (remaining, payload) = {
                    let mut outbound = core.outbound_mut();
                    let remaining = outbound.advance(n);
                    (remaining, outbound.payload().clone())
                };
                core.record_tx(n);
                METRICS.bytes_tx(n as u64);

                let next = if remaining == 0 {
                    self.send_pool.release(slot.reset());
                    None
                } else {
                    Some(slot)
                };

                self.observer.on_data_sent(&session, &payload, n);
                next
            }
            Err(e) => {
                slot.record_error(e.kind());
                METRICS.send_error();
                debug!(session_id = %core.id(), error = %e, "Send failed, closing session");

                // The pending receive observes the close and returns the permit
                core.close();
                self.send_pool.release(slot.reset());
                None
            }
        }
    }
}
