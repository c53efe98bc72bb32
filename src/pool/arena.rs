//! Fixed buffer arena
//!
//! One contiguous allocation carved into fixed-size segments at startup.
//! Half of the segments back receive slots, the other half send slots.
//! Nothing is allocated after the arena has been split.

use bytes::BytesMut;
use std::ops::{Deref, DerefMut};

/// Default segment size in bytes
pub const DEFAULT_BUF_SIZE: usize = 8192;

/// A fixed-size byte range carved from the arena
///
/// Each segment is an exclusive view of its range; no two segments overlap.
/// Only slice access is exposed, so a segment can never be resized.
pub struct Segment {
    data: BytesMut,
    offset: usize,
}

impl Segment {
    /// Byte offset of this segment within the arena
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Deref for Segment {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl DerefMut for Segment {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("offset", &self.offset)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Single-allocation arena sized for `capacity` receive and `capacity` send segments
pub struct BufferArena {
    storage: BytesMut,
    capacity: usize,
    buf_size: usize,
}

impl BufferArena {
    /// Allocate the whole arena up front
    ///
    /// # Panics
    ///
    /// Panics if `2 * capacity * buf_size` overflows `usize`.
    pub fn new(capacity: usize, buf_size: usize) -> Self {
        let total = capacity
            .checked_mul(buf_size)
            .and_then(|n| n.checked_mul(2))
            .expect("arena size overflows usize");

        Self {
            storage: BytesMut::zeroed(total),
            capacity,
            buf_size,
        }
    }

    /// Size of every segment
    pub fn buf_size(&self) -> usize {
        self.buf_size
    }

    /// Number of segments per slot kind
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total arena size in bytes
    pub fn total_size(&self) -> usize {
        self.storage.len()
    }

    /// Split the arena into receive and send segments, in arena order
    ///
    /// Consumes the arena: segment identity is fixed from here on.
    pub fn into_segments(self) -> (Vec<Segment>, Vec<Segment>) {
        let Self {
            mut storage,
            capacity,
            buf_size,
        } = self;

        let mut offset = 0;
        let mut carve = |count: usize| {
            let mut segments = Vec::with_capacity(count);
            for _ in 0..count {
                segments.push(Segment {
                    data: storage.split_to(buf_size),
                    offset,
                });
                offset += buf_size;
            }
            segments
        };

        let receive = carve(capacity);
        let send = carve(capacity);
        (receive, send)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_sizes() {
        let arena = BufferArena::new(4, 128);
        assert_eq!(arena.total_size(), 2 * 4 * 128);
        assert_eq!(arena.buf_size(), 128);

        let (receive, send) = arena.into_segments();
        assert_eq!(receive.len(), 4);
        assert_eq!(send.len(), 4);
        assert!(receive.iter().chain(send.iter()).all(|s| s.len() == 128));
    }

    #[test]
    fn test_segments_do_not_overlap() {
        let (receive, send) = BufferArena::new(3, 64).into_segments();

        let mut offsets: Vec<usize> = receive
            .iter()
            .chain(send.iter())
            .map(|s| s.offset())
            .collect();
        offsets.sort_unstable();

        let expected: Vec<usize> = (0..6).map(|i| i * 64).collect();
        assert_eq!(offsets, expected);
    }

    #[test]
    fn test_segment_writes_are_isolated() {
        let (mut receive, mut send) = BufferArena::new(2, 16).into_segments();

        receive[0].fill(0xAA);
        send[1].fill(0x55);

        assert!(receive[0].iter().all(|&b| b == 0xAA));
        assert!(receive[1].iter().all(|&b| b == 0));
        assert!(send[0].iter().all(|&b| b == 0));
        assert!(send[1].iter().all(|&b| b == 0x55));
    }
}
