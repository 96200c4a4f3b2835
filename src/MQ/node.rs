//! One end of a node-to-node channel: an outbound [`SendChannel`], an inbound
//! mailbox and the lifecycle that ties them together.
//!
//! ```text
//!   Ready --start--> Running --close--> Closing --drained--> Closed
//! ```
//!
//! `send` is accepted only while `Running`. `close` moves to `Closing`, which
//! turns new sends away and wakes every blocked `recv_wait`. It then waits for
//! sends already in flight, closes the channel, flushes what is left to the
//! sink, and finally enters `Closed`.
//!
//! Drains and closes take one reentrant consumer lock. A sink may call
//! [`Node::close`] from inside its own dispatch: the close is left at
//! `Closing` and the drain that is running on that thread finishes it.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_utils::Backoff;
use parking_lot::{Condvar, Mutex, ReentrantMutex};

use super::builder::NodeConfig;
use super::channel::{Dispatch, SendChannel};
use super::pool::{MessagePool, PooledMessage};
use super::Structs::Kind;
use crate::trace::{debug, info};
use crate::Core::error::{MqError, Result};
use crate::Core::signal::Wake;

/// Consumes an inbound payload before it reaches the mailbox when it returns `true`.
pub type InboundHook = Box<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// Runs once, right after the node reaches `Closed`.
pub type CloseHook = Box<dyn FnOnce() + Send>;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeState {
    Ready = 0,
    Running = 1,
    Closing = 2,
    Closed = 3,
}

impl NodeState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Ready,
            1 => Self::Running,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

pub struct Node {
    pub(crate) config: NodeConfig,
    pub(crate) state: AtomicU8,
    /// Sends between the state check and the end of their enqueue.
    pub(crate) sending: AtomicUsize,
    pub(crate) outbound: SendChannel,
    pub(crate) inbound: MessagePool,
    pub(crate) sink: Mutex<Box<dyn Dispatch + Send>>,
    pub(crate) inbound_hook: Option<InboundHook>,
    pub(crate) wait_lock: Mutex<()>,
    pub(crate) wait_cond: Condvar,
    /// Held by `drain` and `close`; reentrant so a sink can close its node.
    pub(crate) consumer: ReentrantMutex<()>,
    /// A close found the sink busy on its own thread and left the last step
    /// to that drain.
    pub(crate) close_deferred: AtomicBool,
    pub(crate) close_hook: Mutex<Option<CloseHook>>,
}

impl Node {
    pub(crate) fn new(
        config: NodeConfig,
        waker: Arc<dyn Wake>,
        sink: Box<dyn Dispatch + Send>,
        inbound_hook: Option<InboundHook>,
        close_hook: Option<CloseHook>,
    ) -> Result<Self> {
        let outbound = SendChannel::new(
            config.outbound_capacity,
            config.outbound_message_size,
            waker,
        )?;
        let inbound = MessagePool::new(config.inbound_capacity, config.inbound_message_size)?;

        Ok(Self {
            config,
            state: AtomicU8::new(NodeState::Ready as u8),
            sending: AtomicUsize::new(0),
            outbound,
            inbound,
            sink: Mutex::new(sink),
            inbound_hook,
            wait_lock: Mutex::new(()),
            wait_cond: Condvar::new(),
            consumer: ReentrantMutex::new(()),
            close_deferred: AtomicBool::new(false),
            close_hook: Mutex::new(close_hook),
        })
    }

    #[inline]
    pub fn state(&self) -> NodeState {
        NodeState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Change state under the wait lock and wake every waiter.
    fn set_state(&self, state: NodeState) {
        {
            let _guard = self.wait_lock.lock();
            self.state.store(state as u8, Ordering::SeqCst);
        }
        self.wait_cond.notify_all();
        info!(?state, "node state changed");
    }

    /// `Ready` -> `Running`.
    pub fn start(&self) -> Result<()> {
        {
            let _guard = self.wait_lock.lock();
            self.state
                .compare_exchange(
                    NodeState::Ready as u8,
                    NodeState::Running as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .map_err(|current| MqError::illegal_state(NodeState::from_u8(current)))?;
        }
        self.wait_cond.notify_all();
        info!(state = ?NodeState::Running, "node state changed");
        Ok(())
    }

    /// Block until the node is `Running`.
    ///
    /// `Cancelled` if it is closing or closed, `TimedOut` if `timeout` elapses
    /// first. `None` waits without a deadline.
    pub fn wait_running(&self, timeout: Option<Duration>) -> Result<()> {
        let deadline = deadline_after(timeout);

        let mut guard = self.wait_lock.lock();
        loop {
            match self.state() {
                NodeState::Running => return Ok(()),
                NodeState::Closing | NodeState::Closed => return Err(MqError::Cancelled),
                NodeState::Ready => {}
            }
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Err(MqError::TimedOut);
                    }
                    self.wait_cond.wait_until(&mut guard, deadline);
                }
                None => self.wait_cond.wait(&mut guard),
            }
        }
    }

    /// Queue `data` for the transport. Non-blocking.
    pub fn send(&self, data: &[u8]) -> Result<()> {
        self.send_kind(Kind::Data, data)
    }

    /// Queue a control message for the sink's [`Dispatch::on_control`].
    pub fn send_control(&self, data: &[u8]) -> Result<()> {
        self.send_kind(Kind::Control, data)
    }

    fn send_kind(&self, kind: Kind, data: &[u8]) -> Result<()> {
        let result = self.try_send(kind, data);
        if self.config.verbose && result.is_err() {
            debug!(error = ?result.as_ref().err(), len = data.len(), "send rejected");
        }
        result
    }

    fn try_send(&self, kind: Kind, data: &[u8]) -> Result<()> {
        // Rejections after `close` began are never counted.
        let state = self.state();
        if state != NodeState::Running {
            return Err(MqError::illegal_state(state));
        }

        // Count first, then read the state again; `close` does the reverse.
        // With SeqCst on both sides either this send sees `Closing` or `close`
        // waits for it, so an accepted message is always enqueued before the
        // channel closes.
        self.sending.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        if state != NodeState::Running {
            self.sending.fetch_sub(1, Ordering::SeqCst);
            return Err(MqError::illegal_state(state));
        }
        let enqueued = match kind {
            Kind::Control => self.outbound.enqueue_control(data),
            _ => self.outbound.enqueue(data),
        };
        self.sending.fetch_sub(1, Ordering::SeqCst);

        enqueued.map_err(|err| match err {
            MqError::Closed => MqError::illegal_state(self.state()),
            other => other,
        })
    }

    /// Pop one inbound message without blocking.
    ///
    /// `NotFound` when the mailbox is empty, `Cancelled` once the node is closed.
    pub fn recv(&self) -> Result<PooledMessage<'_>> {
        if self.state() == NodeState::Closed {
            return Err(MqError::Cancelled);
        }
        self.inbound.dequeue()
    }

    /// Block until an inbound message arrives, the node starts closing
    /// (`Cancelled`), or `timeout` elapses (`TimedOut`).
    ///
    /// `None` waits without a deadline.
    pub fn recv_wait(&self, timeout: Option<Duration>) -> Result<PooledMessage<'_>> {
        let deadline = deadline_after(timeout);

        let mut guard = self.wait_lock.lock();
        loop {
            let state = self.state();
            if state == NodeState::Closed {
                return Err(MqError::Cancelled);
            }
            match self.inbound.dequeue() {
                Ok(message) => return Ok(message),
                Err(MqError::NotFound) => {}
                Err(err) => return Err(err),
            }
            if state == NodeState::Closing {
                return Err(MqError::Cancelled);
            }

            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Err(MqError::TimedOut);
                    }
                    // spurious or not, the loop re-checks everything
                    self.wait_cond.wait_until(&mut guard, deadline);
                }
                None => self.wait_cond.wait(&mut guard),
            }
        }
    }

    /// Transport entry point for received bytes.
    ///
    /// Accepted while `Running` or `Closing`. `QueueFull` when the mailbox has
    /// no free message.
    pub fn deliver_inbound(&self, data: &[u8]) -> Result<()> {
        let state = self.state();
        if !matches!(state, NodeState::Running | NodeState::Closing) {
            return Err(MqError::illegal_state(state));
        }

        if let Some(hook) = &self.inbound_hook {
            if hook(data) {
                return Ok(());
            }
        }

        let result = {
            let _guard = self.wait_lock.lock();
            self.inbound.enqueue(Kind::Data, data)
        };
        if result.is_ok() {
            self.wait_cond.notify_one();
        }
        if self.config.verbose {
            debug!(
                error = ?result.as_ref().err(),
                remaining = self.inbound.active_count(),
                "inbound enqueue"
            );
        }
        result
    }

    /// Flush active outbound messages into the sink. Called by the reactor.
    ///
    /// Returns 0 when called from inside the sink itself. Finishes a close
    /// that the sink started during this drain.
    pub fn drain(&self) -> usize {
        let _consumer = self.consumer.lock();
        let Some(mut sink) = self.sink.try_lock() else {
            return 0;
        };
        let dispatched = self.outbound.drain(&mut **sink);
        drop(sink);

        if self.close_deferred.swap(false, Ordering::SeqCst) {
            self.finish_close();
        }
        dispatched
    }

    /// Shut the node down.
    ///
    /// `IllegalState` if the node never started. A node that is already
    /// closing or closed is left alone. Called from inside the sink, it
    /// returns at `Closing` and the enclosing drain completes it.
    pub fn close(&self) -> Result<()> {
        let _consumer = self.consumer.lock();
        match self.state() {
            NodeState::Ready => return Err(MqError::illegal_state(NodeState::Ready)),
            NodeState::Closing | NodeState::Closed => return Ok(()),
            NodeState::Running => {}
        }

        self.set_state(NodeState::Closing);
        let backoff = Backoff::new();
        while self.sending.load(Ordering::SeqCst) > 0 {
            backoff.snooze();
        }
        // From this moment on, there is no send-queue producer.
        self.outbound.close();

        // Other threads are shut out by `consumer`, so a busy sink means
        // this thread is inside a dispatch.
        let Some(mut sink) = self.sink.try_lock() else {
            self.close_deferred.store(true, Ordering::SeqCst);
            debug!("close deferred to the running drain");
            return Ok(());
        };
        self.outbound.drain(&mut **sink);
        drop(sink);

        self.finish_close();
        Ok(())
    }

    /// `Closing` -> `Closed` once the channel is closed and empty.
    fn finish_close(&self) {
        debug_assert_eq!(self.outbound.pending(), 0);
        self.set_state(NodeState::Closed);
        // let a reactor sleeping on the waker observe `Closed`
        self.outbound.wake();
        if let Some(hook) = self.close_hook.lock().take() {
            hook();
        }
        info!("node closed");
    }

    /// Outbound messages waiting for the reactor.
    pub fn active_send_count(&self) -> usize {
        self.outbound.pending()
    }

    /// Inbound messages waiting in the mailbox.
    pub fn active_recv_count(&self) -> usize {
        self.inbound.active_count()
    }

    pub fn outbound(&self) -> &SendChannel {
        &self.outbound
    }

    pub fn inbound(&self) -> &MessagePool {
        &self.inbound
    }
}

/// `None` when there is no timeout or the deadline is not representable.
fn deadline_after(timeout: Option<Duration>) -> Option<Instant> {
    timeout.and_then(|timeout| Instant::now().checked_add(timeout))
}

impl Drop for Node {
    fn drop(&mut self) {
        if self.state() == NodeState::Running {
            let _ = self.close();
        }
    }
}
