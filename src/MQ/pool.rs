//! Allocation-free message recycling.
//!
//! A [`MessagePool`] pre-allocates `capacity` messages in an arena and moves
//! their ids between two [`BoundedRingQueue`]s: `ready` (free) and `active`
//! (filled, waiting for a consumer). In between, a message is *held* by
//! exactly one caller.
//!
//! ```text
//!   ready --acquire--> held --publish--> active --consume--> held --release--> ready
//! ```
//!
//! Every arena entry carries a tag packing `(generation, state)` into one
//! atomic word. All transitions are a single compare-and-swap on that word, so
//! a stale or duplicated [`MessageId`] can never move a message twice.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::trace::warn;
use crate::Core::error::{MqError, Result};
use crate::MQ::Queue::{BoundedRingQueue, Validity};
use crate::MQ::Structs::{Kind, Message, MessageId};

const READY: u32 = 0;
const HELD: u32 = 1;
const ACTIVE: u32 = 2;

#[inline]
const fn tag(generation: u32, state: u32) -> u64 {
    ((generation as u64) << 32) | state as u64
}

#[inline]
const fn tag_state(tag: u64) -> u32 {
    tag as u32
}

pub(crate) struct Entry {
    pub(crate) tag: AtomicU64,
    pub(crate) message: Mutex<Message>,
}

pub struct MessagePool {
    pub(crate) arena: Box<[Entry]>,
    pub(crate) ready: BoundedRingQueue<u32, u32>,
    pub(crate) active: BoundedRingQueue<u32, u32>,
    pub(crate) message_size: usize,
}

impl MessagePool {
    /// Build a pool of `capacity` messages, each reserving `message_size` bytes.
    pub fn new(capacity: usize, message_size: usize) -> Result<Self> {
        if capacity == 0 || capacity > u32::MAX as usize {
            return Err(MqError::invalid_config(
                "capacity",
                format!("must be in 1..={}, got {capacity}", u32::MAX),
            ));
        }
        if message_size == 0 {
            return Err(MqError::invalid_config(
                "message_size",
                "must be greater than zero",
            ));
        }

        let arena = (0..capacity)
            .map(|_| Entry {
                tag: AtomicU64::new(tag(0, READY)),
                message: Mutex::new(Message::with_capacity(message_size)),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let ready = BoundedRingQueue::new(capacity)?;
        let active = BoundedRingQueue::new(capacity)?;
        for index in 0..capacity as u32 {
            let pushed = ready.push(index, 0);
            debug_assert!(pushed);
        }

        Ok(Self {
            arena,
            ready,
            active,
            message_size,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.arena.len()
    }

    /// Bytes reserved per message at construction.
    #[inline]
    pub fn message_size(&self) -> usize {
        self.message_size
    }

    /// Move `id` from `from` to `to`, bumping the generation by `bump`.
    fn transition(&self, id: MessageId, from: u32, to: u32, bump: u32) -> Result<&Entry> {
        let entry = self
            .arena
            .get(id.index as usize)
            .ok_or(MqError::Expired)?;
        entry
            .tag
            .compare_exchange(
                tag(id.generation, from),
                tag(id.generation.wrapping_add(bump), to),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| MqError::Expired)?;
        Ok(entry)
    }

    /// Take a free message out of `ready`.
    ///
    /// `QueueFull` means every message is in use: the caller has no capacity
    /// and must apply backpressure.
    pub fn acquire(&self) -> Result<MessageId> {
        let (index, generation) = self.ready.pop().ok_or(MqError::QueueFull)?;
        let id = MessageId { index, generation };
        self.transition(id, READY, HELD, 0)?;
        Ok(id)
    }

    /// Lock a message the caller currently holds.
    pub fn message(&self, id: MessageId) -> Result<MutexGuard<'_, Message>> {
        let entry = self
            .arena
            .get(id.index as usize)
            .ok_or(MqError::Expired)?;
        if entry.tag.load(Ordering::Acquire) != tag(id.generation, HELD) {
            return Err(MqError::Expired);
        }
        Ok(entry.message.lock())
    }

    /// Run `f` on a message the caller currently holds.
    pub fn with_message<R>(&self, id: MessageId, f: impl FnOnce(&mut Message) -> R) -> Result<R> {
        let mut message = self.message(id)?;
        Ok(f(&mut message))
    }

    /// Hand a held, filled message to `active`, making it visible to consumers.
    pub fn publish(&self, id: MessageId) -> Result<()> {
        self.transition(id, HELD, ACTIVE, 0)?;
        if self.active.push(id.index, id.generation) {
            Ok(())
        } else {
            // active has one slot per message, so this cannot happen unless
            // the arena and the queues disagree
            self.transition(id, ACTIVE, HELD, 0)?;
            Err(MqError::QueueFull)
        }
    }

    /// Take the oldest published message out of `active`.
    pub fn consume(&self) -> Result<MessageId> {
        let (index, generation) = self.active.pop().ok_or(MqError::NotFound)?;
        let id = MessageId { index, generation };
        self.transition(id, ACTIVE, HELD, 0)?;
        Ok(id)
    }

    /// Clear a held message and return it to `ready`.
    ///
    /// Releasing a handle that is not held (twice, or after it was recycled)
    /// returns `Expired` and leaves the pool untouched.
    pub fn release(&self, id: MessageId) -> Result<()> {
        let entry = match self.transition(id, HELD, READY, 1) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(index = id.index, generation = id.generation, "release of a message that is not held");
                return Err(err);
            }
        };
        entry.message.lock().clear();
        self.push_ready(id);
        Ok(())
    }

    /// `release` for a caller that already cleared the message under its own lock.
    fn recycle(&self, id: MessageId) -> Result<()> {
        self.transition(id, HELD, READY, 1)?;
        self.push_ready(id);
        Ok(())
    }

    fn push_ready(&self, id: MessageId) {
        let pushed = self.ready.push(id.index, id.generation.wrapping_add(1));
        debug_assert!(pushed, "ready queue holds one slot per message");
    }

    /// acquire, copy `data`, publish. Never blocks and never retries.
    pub fn enqueue(&self, kind: Kind, data: &[u8]) -> Result<()> {
        let id = self.acquire()?;
        self.with_message(id, |message| message.fill(kind, data))?;
        if let Err(err) = self.publish(id) {
            self.release(id)?;
            return Err(err);
        }
        Ok(())
    }

    /// Consume the next message. It goes back to `ready` when the returned
    /// guard is dropped.
    pub fn dequeue(&self) -> Result<PooledMessage<'_>> {
        let id = self.consume()?;
        let entry = &self.arena[id.index as usize];
        Ok(PooledMessage {
            pool: self,
            id,
            message: entry.message.lock(),
        })
    }

    /// Consume the next message, copy its payload into `buf` and release it.
    pub fn dequeue_into(&self, buf: &mut Vec<u8>) -> Result<Kind> {
        let message = self.dequeue()?;
        buf.clear();
        buf.extend_from_slice(message.payload());
        Ok(message.kind())
    }

    /// Return every active message to `ready` without dispatching it.
    pub fn clear(&self) -> usize {
        let mut cleared = 0;
        while let Ok(id) = self.consume() {
            if self.release(id).is_ok() {
                cleared += 1;
            }
        }
        cleared
    }

    /// Free messages. Racy snapshot.
    pub fn ready_count(&self) -> usize {
        self.ready.approximate_count()
    }

    /// Published messages awaiting a consumer. Racy snapshot.
    pub fn active_count(&self) -> usize {
        self.active.approximate_count()
    }

    /// Messages checked out by callers. Walks the arena; diagnostics only.
    pub fn held_count(&self) -> usize {
        self.arena
            .iter()
            .filter(|entry| tag_state(entry.tag.load(Ordering::Acquire)) == HELD)
            .count()
    }

    pub fn validate_ready(&mut self, min: usize, max: usize) -> Validity {
        self.ready.validate(min, max)
    }

    pub fn validate_active(&mut self, min: usize, max: usize) -> Validity {
        self.active.validate(min, max)
    }
}

/// A consumed message, held until dropped.
pub struct PooledMessage<'a> {
    pool: &'a MessagePool,
    id: MessageId,
    message: MutexGuard<'a, Message>,
}

impl PooledMessage<'_> {
    pub fn id(&self) -> MessageId {
        self.id
    }
}

impl Deref for PooledMessage<'_> {
    type Target = Message;

    fn deref(&self) -> &Message {
        &self.message
    }
}

impl Drop for PooledMessage<'_> {
    fn drop(&mut self) {
        self.message.clear();
        // An acquirer that wins the slot before our guard unlocks waits on the
        // message lock for the few instructions that remain.
        let _ = self.pool.recycle(self.id);
    }
}
