//! Wake-up primitive between producers and the event loop.
//!
//! [`Wake`] is the only thing a [`SendChannel`](crate::MQ::channel::SendChannel)
//! needs from a reactor: a way to ask to be drained again. [`Signal`] is the
//! futex-backed implementation used by [`EventLoop`](crate::MQ::event_loop::EventLoop).

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crossbeam_utils::CachePadded;

use super::futex::{futex_wait, futex_wake};

/// "Schedule a drain" hook implemented by the reactor.
///
/// A wake must eventually lead to exactly one drain on the reactor's own
/// thread. Calls may coalesce. Implementations must not drain inline.
pub trait Wake: Send + Sync {
    fn wake(&self);
}

impl<F> Wake for F
where
    F: Fn() + Send + Sync,
{
    fn wake(&self) {
        self()
    }
}

/// Monotonic wake counter a single loop thread can sleep on.
///
/// The loop reads [`Signal::epoch`] before draining and then sleeps with
/// [`Signal::wait`] on that value, so a wake that lands while it is draining
/// is never lost.
pub struct Signal {
    word: CachePadded<AtomicU32>,
}

impl Signal {
    pub fn new() -> Self {
        Self {
            word: CachePadded::new(AtomicU32::new(0)),
        }
    }

    /// Current wake epoch.
    #[inline]
    pub fn epoch(&self) -> u32 {
        self.word.load(Ordering::Acquire)
    }

    /// Bump the epoch and wake the sleeping loop.
    pub fn notify(&self) {
        self.word.fetch_add(1, Ordering::Release);
        futex_wake(&self.word, i32::MAX);
    }

    /// Sleep until the epoch moves past `seen` or `timeout` elapses.
    ///
    /// Returns `true` if the epoch moved.
    pub fn wait(&self, seen: u32, timeout: Option<Duration>) -> bool {
        if self.epoch() != seen {
            return true;
        }
        futex_wait(&self.word, seen, timeout);
        self.epoch() != seen
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Wake for Signal {
    fn wake(&self) {
        self.notify();
    }
}
