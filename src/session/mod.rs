//! Session contract
//!
//! The engine creates one session per accepted connection through a
//! caller-supplied factory. The concrete type is the caller's; the engine
//! only touches the embedded [`SessionCore`].

mod state;

pub use state::{Outbound, SessionCore, SessionId};

/// Per-connection state supplied by the caller
pub trait Session: Send + Sync + 'static {
    /// Engine-required fields
    fn core(&self) -> &SessionCore;

    /// Called exactly once when the connection is torn down
    fn on_terminated(&self) {}
}

/// Builds a session for every accepted connection
pub trait SessionFactory<S>: Send + Sync + 'static {
    fn create(&self, core: SessionCore) -> S;
}

impl<S, F> SessionFactory<S> for F
where
    F: Fn(SessionCore) -> S + Send + Sync + 'static,
{
    fn create(&self, core: SessionCore) -> S {
        self(core)
    }
}
