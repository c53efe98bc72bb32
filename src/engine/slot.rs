//! Reusable operation descriptors

use std::io;
use std::sync::Arc;

use crate::pool::{AdmissionPermit, Segment};

/// Operation kind a slot is dedicated to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Accept,
    Receive,
    Send,
}

/// A reusable descriptor for one in-flight accept, receive or send
///
/// Slots are created once at startup and moved between their pool and the
/// operation using them, so a slot is never owned by both at once.
pub struct OperationSlot<S> {
    id: usize,
    kind: SlotKind,
    /// Permanently attached buffer; none for accept slots
    segment: Option<Segment>,
    session: Option<Arc<S>>,
    /// Held by receive slots for the lifetime of their connection
    permit: Option<AdmissionPermit>,
    staged: usize,
    bytes_transferred: usize,
    last_error: Option<io::ErrorKind>,
}

impl<S> OperationSlot<S> {
    pub(crate) fn new(id: usize, kind: SlotKind) -> Self {
        Self {
            id,
            kind,
            segment: None,
            session: None,
            permit: None,
            staged: 0,
            bytes_transferred: 0,
            last_error: None,
        }
    }

    /// Attach the slot's permanent segment (startup only)
    pub(crate) fn attach(&mut self, segment: Segment) {
        debug_assert!(self.segment.is_none(), "segment reassigned");
        self.segment = Some(segment);
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    /// Arena offset of the attached segment
    pub fn segment_offset(&self) -> Option<usize> {
        self.segment.as_ref().map(|s| s.offset())
    }

    /// The attached segment; empty for accept slots
    pub(crate) fn buffer(&self) -> &[u8] {
        self.segment.as_deref().unwrap_or(&[])
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut [u8] {
        self.segment.as_deref_mut().unwrap_or(&mut [])
    }

    /// Session currently using the slot
    pub fn session(&self) -> Option<&Arc<S>> {
        self.session.as_ref()
    }

    pub(crate) fn bind(&mut self, session: Arc<S>) {
        self.session = Some(session);
    }

    pub(crate) fn bind_permit(&mut self, permit: AdmissionPermit) {
        self.permit = Some(permit);
    }

    pub(crate) fn take_permit(&mut self) -> Option<AdmissionPermit> {
        self.permit.take()
    }

    /// Length of the chunk staged in the segment for the pending send
    pub(crate) fn staged(&self) -> usize {
        self.staged
    }

    pub(crate) fn set_staged(&mut self, len: usize) {
        self.staged = len;
    }

    pub fn bytes_transferred(&self) -> usize {
        self.bytes_transferred
    }

    pub fn last_error(&self) -> Option<io::ErrorKind> {
        self.last_error
    }

    pub(crate) fn record_success(&mut self, transferred: usize) {
        self.bytes_transferred = transferred;
        self.last_error = None;
    }

    pub(crate) fn record_error(&mut self, kind: io::ErrorKind) {
        self.bytes_transferred = 0;
        self.last_error = Some(kind);
    }

    /// Detach the session before the slot goes back to its pool
    ///
    /// The segment stays attached; metadata is left for inspection.
    pub(crate) fn reset(mut self) -> Self {
        debug_assert!(self.permit.is_none(), "slot recycled while holding a permit");
        self.session = None;
        self.staged = 0;
        self
    }
}

impl<S> std::fmt::Debug for OperationSlot<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationSlot")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("segment", &self.segment)
            .field("bound", &self.session.is_some())
            .field("bytes_transferred", &self.bytes_transferred)
            .field("last_error", &self.last_error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::BufferArena;

    #[test]
    fn test_accept_slot_has_no_buffer() {
        let slot: OperationSlot<()> = OperationSlot::new(0, SlotKind::Accept);
        assert!(slot.buffer().is_empty());
        assert_eq!(slot.segment_offset(), None);
    }

    #[test]
    fn test_reset_keeps_segment() {
        let (mut receive, _) = BufferArena::new(1, 32).into_segments();
        let mut slot = OperationSlot::new(0, SlotKind::Receive);
        slot.attach(receive.remove(0));
        slot.bind(Arc::new(()));
        slot.record_error(io::ErrorKind::ConnectionReset);

        let slot = slot.reset();
        assert!(slot.session().is_none());
        assert_eq!(slot.buffer().len(), 32);
        assert_eq!(slot.segment_offset(), Some(0));
        assert_eq!(slot.last_error(), Some(io::ErrorKind::ConnectionReset));
    }
}
