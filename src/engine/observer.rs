//! Engine observers
//!
//! Callbacks fire synchronously from completion handling. Implementations
//! must not block, or they stall the session that produced the event.

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receives connection and traffic notifications
pub trait EngineObserver<S>: Send + Sync + 'static {
    /// A connection was admitted and its session created
    fn on_connection_accepted(&self, _session: &Arc<S>) {}

    /// A chunk arrived (already decrypted if the peer has a cipher)
    fn on_data_received(&self, _session: &Arc<S>, _data: Bytes, _transferred: usize) {}

    /// One chunk of `payload` was written
    fn on_data_sent(&self, _session: &Arc<S>, _payload: &Bytes, _transferred: usize) {}
}

/// Observer that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl<S: Send + Sync + 'static> EngineObserver<S> for NoopObserver {}

/// Events forwarded by [`ChannelObserver`]
pub enum EngineEvent<S> {
    Accepted(Arc<S>),
    Received {
        session: Arc<S>,
        data: Bytes,
        transferred: usize,
    },
    Sent {
        session: Arc<S>,
        payload: Bytes,
        transferred: usize,
    },
}

impl<S> std::fmt::Debug for EngineEvent<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accepted(_) => f.write_str("Accepted"),
            Self::Received { transferred, .. } => {
                f.debug_struct("Received").field("transferred", transferred).finish()
            }
            Self::Sent { transferred, .. } => {
                f.debug_struct("Sent").field("transferred", transferred).finish()
            }
        }
    }
}

/// Observer that forwards events to a single consumer over a channel
pub struct ChannelObserver<S> {
    tx: mpsc::UnboundedSender<EngineEvent<S>>,
}

impl<S> ChannelObserver<S> {
    /// Create the observer and the receiving end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent<S>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: EngineEvent<S>) {
        // Consumer gone: events are dropped
        let _ = self.tx.send(event);
    }
}

impl<S: Send + Sync + 'static> EngineObserver<S> for ChannelObserver<S> {
    fn on_connection_accepted(&self, session: &Arc<S>) {
        self.emit(EngineEvent::Accepted(session.clone()));
    }

    fn on_data_received(&self, session: &Arc<S>, data: Bytes, transferred: usize) {
        self.emit(EngineEvent::Received {
            session: session.clone(),
            data,
            transferred,
        });
    }

    fn on_data_sent(&self, session: &Arc<S>, payload: &Bytes, transferred: usize) {
        self.emit(EngineEvent::Sent {
            session: session.clone(),
            payload: payload.clone(),
            transferred,
        });
    }
}
