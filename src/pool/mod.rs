//! Resource pooling
//!
//! Pre-allocated slots, buffer segments and admission permits. Everything
//! here is sized once at startup; the hot path never allocates from it.

mod arena;
mod gate;
mod slot;

pub use arena::{BufferArena, Segment, DEFAULT_BUF_SIZE};
pub use gate::{AdmissionGate, AdmissionPermit};
pub use slot::{SlotPool, SlotPoolStats};
