//! Outbound event queue: any thread enqueues, one event loop drains.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::Backoff;
use parking_lot::Mutex;

use crate::trace::debug;
use crate::Core::error::{MqError, Result};
use crate::Core::signal::Wake;
use crate::MQ::pool::MessagePool;
use crate::MQ::Queue::Validity;
use crate::MQ::Structs::Kind;

/// Consumer-side handler invoked by [`SendChannel::drain`].
///
/// Any `FnMut(&[u8])` is a `Dispatch` that ignores control messages.
pub trait Dispatch {
    /// A data payload ready to go out on the transport.
    fn on_send(&mut self, payload: &[u8]);

    /// A control message enqueued with [`SendChannel::enqueue_control`].
    fn on_control(&mut self, _payload: &[u8]) {}
}

impl<F> Dispatch for F
where
    F: FnMut(&[u8]),
{
    fn on_send(&mut self, payload: &[u8]) {
        self(payload)
    }
}

/// A [`MessagePool`] whose producers wake a single consumer.
///
/// `enqueue` never blocks: it either publishes the message and wakes the
/// consumer, or returns `QueueFull` / `Closed`. `drain` runs on the consumer's
/// thread and is serialized, so at most one drain is in progress at a time.
pub struct SendChannel {
    pub(crate) pool: MessagePool,
    pub(crate) waker: Arc<dyn Wake>,
    pub(crate) closed: AtomicBool,
    /// Producers between the closed check and the publish.
    pub(crate) enqueuing: AtomicUsize,
    pub(crate) consumer: Mutex<()>,
}

impl SendChannel {
    pub fn new(capacity: usize, message_size: usize, waker: Arc<dyn Wake>) -> Result<Self> {
        Ok(Self {
            pool: MessagePool::new(capacity, message_size)?,
            waker,
            closed: AtomicBool::new(false),
            enqueuing: AtomicUsize::new(0),
            consumer: Mutex::new(()),
        })
    }

    /// Queue a data payload for the consumer.
    pub fn enqueue(&self, data: &[u8]) -> Result<()> {
        self.publish(Kind::Data, data)
    }

    /// Queue a control message; it is drained through [`Dispatch::on_control`].
    pub fn enqueue_control(&self, data: &[u8]) -> Result<()> {
        self.publish(Kind::Control, data)
    }

    fn publish(&self, kind: Kind, data: &[u8]) -> Result<()> {
        // Producers rejected after close are never counted.
        if self.closed.load(Ordering::SeqCst) {
            return Err(MqError::Closed);
        }
        // Announce first, then look at `closed` again: `close` stores `closed`
        // first, then waits for this counter, so one of the two always sees
        // the other.
        self.enqueuing.fetch_add(1, Ordering::SeqCst);
        let result = if self.closed.load(Ordering::SeqCst) {
            Err(MqError::Closed)
        } else {
            self.pool.enqueue(kind, data)
        };
        self.enqueuing.fetch_sub(1, Ordering::SeqCst);

        if result.is_ok() {
            self.waker.wake();
        }
        result
    }

    /// Dispatch every active message, oldest first, and recycle it.
    ///
    /// Returns the number of messages dispatched. Works after [`close`](Self::close)
    /// too. `dispatch` must not call back into `drain`.
    pub fn drain<D>(&self, dispatch: &mut D) -> usize
    where
        D: Dispatch + ?Sized,
    {
        self.drain_limit(dispatch, usize::MAX)
    }

    /// Dispatch at most one message. Returns `true` if one was dispatched.
    pub fn drain_one<D>(&self, dispatch: &mut D) -> bool
    where
        D: Dispatch + ?Sized,
    {
        self.drain_limit(dispatch, 1) == 1
    }

    /// Dispatch at most `limit` messages, so a reactor can bound one turn.
    pub fn drain_limit<D>(&self, dispatch: &mut D, limit: usize) -> usize
    where
        D: Dispatch + ?Sized,
    {
        let _consumer = self.consumer.lock();
        let mut dispatched = 0;
        while dispatched < limit {
            let Ok(message) = self.pool.dequeue() else {
                break;
            };
            match message.kind() {
                Kind::Control => dispatch.on_control(message.payload()),
                _ => dispatch.on_send(message.payload()),
            }
            dispatched += 1;
        }
        dispatched
    }

    /// Stop accepting work and wake the consumer for its final drain.
    ///
    /// Messages already queued are kept. When `close` returns, every enqueue
    /// that succeeded is visible to `drain`. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let backoff = Backoff::new();
        while self.enqueuing.load(Ordering::SeqCst) > 0 {
            backoff.snooze();
        }
        debug!(pending = self.pending(), "send channel closed");
        self.waker.wake();
    }

    pub(crate) fn wake(&self) {
        self.waker.wake();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Closed, and nothing left for the consumer.
    pub fn is_drained(&self) -> bool {
        self.is_closed() && self.pool.active_count() == 0
    }

    /// Messages waiting to be drained. Racy snapshot.
    pub fn pending(&self) -> usize {
        self.pool.active_count()
    }

    /// Free slots left before `enqueue` reports `QueueFull`. Racy snapshot.
    pub fn available(&self) -> usize {
        self.pool.ready_count()
    }

    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    pub fn pool(&self) -> &MessagePool {
        &self.pool
    }

    pub fn validate_ready(&mut self, min: usize, max: usize) -> Validity {
        self.pool.validate_ready(min, max)
    }
}
