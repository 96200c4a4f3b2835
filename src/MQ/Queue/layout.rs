use crossbeam_utils::CachePadded;
use std::sync::atomic::AtomicUsize;

/// Producer and consumer cursors of one [`BoundedRingQueue`](super::BoundedRingQueue).
///
/// Positions grow monotonically and are reduced to a slot index only when a
/// slot is addressed. `tail - head` is the number of claimed entries.
#[repr(C)]
pub struct Cursors {
    /// The "tail" cursor for producers. Atomically incremented to claim a slot for writing.
    /// Padded to prevent false sharing with the consumer cursor.
    pub tail: CachePadded<AtomicUsize>,

    /// The "head" cursor for consumers. Atomically incremented to claim a slot for reading.
    /// Padded to prevent false sharing with the producer cursor.
    pub head: CachePadded<AtomicUsize>,
}

impl Cursors {
    pub fn new() -> Self {
        Self {
            tail: CachePadded::new(AtomicUsize::new(0)),
            head: CachePadded::new(AtomicUsize::new(0)),
        }
    }
}

impl Default for Cursors {
    fn default() -> Self {
        Self::new()
    }
}
