// Bounded MPMC slot queue: the backpressure primitive under every message pool

use super::layout::Cursors;

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::AtomicUsize;

/// A single slot in the queue.
pub struct Slot<K, V> {
    /// The sequence number of the slot. This is the core of the synchronization.
    /// - A producer claims a `tail` position and waits for the `sequence` in
    ///   the target slot to equal that position.
    /// - After writing, it sets the `sequence` to `tail + 1`, signaling completion.
    /// - A consumer waits for the `sequence` in its `head` slot to equal
    ///   `head + 1`, and after reading stores `head + capacity` to free it.
    pub(crate) sequence: AtomicUsize,

    /// The `(key, value)` pair, initialized only while the slot is filled.
    pub(crate) entry: UnsafeCell<MaybeUninit<(K, V)>>,
}

/// A fixed-capacity, lock-free, multi-producer, multi-consumer queue of
/// `(key, value)` pairs.
///
/// ### Concurrency Design:
/// - **Producers (push)**: claim a position by CAS on `tail`, write the pair,
///   then publish it through the slot's `sequence`.
/// - **Consumers (pop)**: claim a position by CAS on `head`, read the pair,
///   then hand the slot back to producers through its `sequence`.
///
/// `push` returns `false` only when `capacity` entries are claimed. A slot that
/// is claimed but not yet published (or not yet freed) is waited out with a
/// short backoff, so neither side reports a spurious full/empty result.
///
/// The queue owns only the pairs pushed into it. It is a mechanism, not a
/// resource owner.
pub struct BoundedRingQueue<K, V> {
    pub(crate) cursors: Cursors,

    pub(crate) slots: Box<[Slot<K, V>]>,

    /// The capacity of the queue (number of slots).
    pub(crate) capacity: usize,

    /// `capacity - 1` when the capacity is a power of two, used to wrap
    /// positions with a mask instead of a division.
    pub(crate) mask: Option<usize>,
}

unsafe impl<K: Send, V: Send> Send for BoundedRingQueue<K, V> {}
unsafe impl<K: Send, V: Send> Sync for BoundedRingQueue<K, V> {}

/// Outcome of [`BoundedRingQueue::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    /// More entries are claimed than the queue has slots; a walk would lap itself.
    Loop,
    /// Fewer entries than the expected minimum.
    MissingElements,
    /// More entries than the expected maximum.
    ExtraElements,
    /// A slot's sequence does not match its position.
    OutOfOrder,
    /// The cursors themselves are inconsistent.
    Error,
}
