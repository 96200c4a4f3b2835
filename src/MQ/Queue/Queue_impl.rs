use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release, SeqCst};
use std::sync::atomic::{fence, AtomicUsize};

use crossbeam_utils::Backoff;

use super::layout::Cursors;
use super::Queue::{BoundedRingQueue, Slot, Validity};
use crate::Core::error::{MqError, Result};

impl<K, V> BoundedRingQueue<K, V> {
    /// Create a queue with `capacity` slots.
    ///
    /// Any positive capacity works; a power of two lets positions wrap with a
    /// mask.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(MqError::invalid_config(
                "capacity",
                "Capacity must be greater than zero",
            ));
        }

        // Initialize per-slot sequence numbers to k for k in 0..capacity.
        let slots = (0..capacity)
            .map(|k| Slot {
                sequence: AtomicUsize::new(k),
                entry: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            cursors: Cursors::new(),
            slots,
            capacity,
            mask: capacity.is_power_of_two().then(|| capacity - 1),
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Smallest power of two that can hold `request` entries.
    pub fn min_queue_size(request: usize) -> usize {
        request.max(1).next_power_of_two()
    }

    #[inline]
    fn slot(&self, position: usize) -> &Slot<K, V> {
        let index = match self.mask {
            Some(mask) => position & mask,
            None => position % self.capacity,
        };
        &self.slots[index]
    }

    /// Store `(key, value)` at the back of the queue.
    ///
    /// Returns `false` without blocking if the queue is full; the pair is
    /// dropped in that case, so callers push `Copy` handles.
    pub fn push(&self, key: K, value: V) -> bool {
        let backoff = Backoff::new();
        let mut tail = self.cursors.tail.load(Relaxed);

        loop {
            let slot = self.slot(tail);
            let seq = slot.sequence.load(Acquire);
            let dif = seq.wrapping_sub(tail) as isize;

            if dif == 0 {
                match self.cursors.tail.compare_exchange_weak(
                    tail,
                    tail.wrapping_add(1),
                    AcqRel,
                    Relaxed,
                ) {
                    Ok(_) => {
                        // We own this slot now
                        unsafe {
                            (*slot.entry.get()).write((key, value));
                        }
                        // Publish
                        slot.sequence.store(tail.wrapping_add(1), Release);
                        return true;
                    }
                    Err(current) => {
                        tail = current;
                        backoff.spin();
                    }
                }
            } else if dif < 0 {
                // The slot still holds last lap's entry. Full only if the
                // consumers are a whole lap behind; otherwise one of them is
                // mid-read and hands the slot back shortly.
                fence(SeqCst);
                let head = self.cursors.head.load(Relaxed);
                if head.wrapping_add(self.capacity) == tail {
                    return false;
                }
                backoff.snooze();
                tail = self.cursors.tail.load(Relaxed);
            } else {
                // someone else is producing; reload and retry
                backoff.spin();
                tail = self.cursors.tail.load(Relaxed);
            }
        }
    }

    /// Remove the oldest surviving pair, or `None` if the queue is empty.
    pub fn pop(&self) -> Option<(K, V)> {
        let backoff = Backoff::new();
        let mut head = self.cursors.head.load(Relaxed);

        loop {
            let slot = self.slot(head);
            let seq = slot.sequence.load(Acquire);
            let dif = seq.wrapping_sub(head.wrapping_add(1)) as isize;

            if dif == 0 {
                match self.cursors.head.compare_exchange_weak(
                    head,
                    head.wrapping_add(1),
                    AcqRel,
                    Relaxed,
                ) {
                    Ok(_) => {
                        let entry = unsafe { (*slot.entry.get()).assume_init_read() };
                        // free slot for future producers
                        slot.sequence
                            .store(head.wrapping_add(self.capacity), Release);
                        return Some(entry);
                    }
                    Err(current) => {
                        head = current;
                        backoff.spin();
                    }
                }
            } else if dif < 0 {
                // Nothing published here yet. Empty unless a producer has
                // claimed the position and is still writing.
                fence(SeqCst);
                let tail = self.cursors.tail.load(Relaxed);
                if tail == head {
                    return None;
                }
                backoff.snooze();
                head = self.cursors.head.load(Relaxed);
            } else {
                // another consumer took it; retry
                backoff.spin();
                head = self.cursors.head.load(Relaxed);
            }
        }
    }

    /// Best-effort number of claimed entries. Racy; diagnostics and tests only.
    pub fn approximate_count(&self) -> usize {
        // head first: tail never trails a head read before it
        let head = self.cursors.head.load(SeqCst);
        let tail = self.cursors.tail.load(SeqCst);
        tail.wrapping_sub(head).min(self.capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.approximate_count() == 0
    }

    /// Walk the slots and check the structure against the cursors.
    ///
    /// `&mut self` keeps every other thread out for the duration of the walk.
    /// With `min_expected == max_expected == 0` only the structure is checked;
    /// otherwise the entry count must also fall within the given bounds.
    pub fn validate(&mut self, min_expected: usize, max_expected: usize) -> Validity {
        let head = *self.cursors.head.get_mut();
        let tail = *self.cursors.tail.get_mut();
        let count = tail.wrapping_sub(head);

        if (count as isize) < 0 {
            return Validity::Error;
        }
        if count > self.capacity {
            return Validity::Loop;
        }

        for offset in 0..self.capacity {
            let position = head.wrapping_add(offset);
            let expected = if offset < count {
                position.wrapping_add(1)
            } else {
                position
            };
            if *self.slot_mut(position).sequence.get_mut() != expected {
                return Validity::OutOfOrder;
            }
        }

        if min_expected != 0 || max_expected != 0 {
            if count < min_expected {
                return Validity::MissingElements;
            }
            if count > max_expected {
                return Validity::ExtraElements;
            }
        }
        Validity::Valid
    }

    #[inline]
    fn slot_mut(&mut self, position: usize) -> &mut Slot<K, V> {
        let index = match self.mask {
            Some(mask) => position & mask,
            None => position % self.capacity,
        };
        &mut self.slots[index]
    }
}

impl<K, V> Drop for BoundedRingQueue<K, V> {
    fn drop(&mut self) {
        if std::mem::needs_drop::<(K, V)>() {
            while self.pop().is_some() {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            BoundedRingQueue::<u32, u32>::new(0),
            Err(MqError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn odd_capacity_wraps_many_laps() {
        let queue = BoundedRingQueue::<usize, usize>::new(3).unwrap();
        for lap in 0..50 {
            assert!(queue.push(lap, lap * 10));
            assert!(queue.push(lap + 1, 0));
            assert_eq!(queue.pop(), Some((lap, lap * 10)));
            assert_eq!(queue.pop(), Some((lap + 1, 0)));
            assert_eq!(queue.pop(), None);
        }
        assert_eq!(queue.mask, None);
    }

    #[test]
    fn validate_spots_a_corrupted_sequence() {
        let mut queue = BoundedRingQueue::<u8, u8>::new(4).unwrap();
        assert!(queue.push(1, 1));
        assert!(queue.push(2, 2));
        assert_eq!(queue.validate(0, 0), Validity::Valid);

        // pretend the second entry was never published
        *queue.slots[1].sequence.get_mut() = 1;
        assert_eq!(queue.validate(0, 0), Validity::OutOfOrder);
    }

    #[test]
    fn validate_spots_inconsistent_cursors() {
        let mut queue = BoundedRingQueue::<u8, u8>::new(4).unwrap();
        *queue.cursors.tail.get_mut() = 9;
        assert_eq!(queue.validate(0, 0), Validity::Loop);

        *queue.cursors.tail.get_mut() = 0;
        *queue.cursors.head.get_mut() = 2;
        assert_eq!(queue.validate(0, 0), Validity::Error);
    }

    #[test]
    fn remaining_entries_are_dropped_with_the_queue() {
        use std::sync::Arc;

        let token = Arc::new(());
        {
            let queue = BoundedRingQueue::<Arc<()>, u8>::new(2).unwrap();
            assert!(queue.push(token.clone(), 0));
            assert!(queue.push(token.clone(), 1));
            assert_eq!(Arc::strong_count(&token), 3);
        }
        assert_eq!(Arc::strong_count(&token), 1);
    }
}
