//! A minimal reactor: one thread that sleeps on a [`Signal`] and drains a
//! [`Node`] whenever it is woken, until the node is closed.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::builder::NodeBuilder;
use super::channel::Dispatch;
use super::node::{Node, NodeState};
use crate::trace::debug;
use crate::Core::signal::Signal;

/// Upper bound on one sleep, so a missed wake can only delay a drain.
const IDLE_POLL: Duration = Duration::from_millis(100);

pub struct EventLoop {
    handle: JoinHandle<usize>,
}

impl EventLoop {
    /// Run the drain loop for `node` on a new thread.
    ///
    /// `signal` must be the waker the node was built with.
    pub fn spawn(node: Arc<Node>, signal: Arc<Signal>) -> io::Result<Self> {
        let handle = thread::Builder::new()
            .name("dmxp-mq-loop".into())
            .spawn(move || run(&node, &signal))?;
        Ok(Self { handle })
    }

    /// Build a node wired to a fresh [`Signal`], start it, and spawn its loop.
    pub fn start<D>(builder: NodeBuilder, sink: D) -> io::Result<(Arc<Node>, Self)>
    where
        D: Dispatch + Send + 'static,
    {
        let signal = Arc::new(Signal::new());
        let node = Arc::new(builder.build(signal.clone(), sink)?);
        node.start()?;
        let event_loop = Self::spawn(node.clone(), signal)?;
        Ok((node, event_loop))
    }

    /// Wait for the loop to exit (after the node is closed). Returns the
    /// number of messages the loop itself dispatched.
    pub fn join(self) -> thread::Result<usize> {
        self.handle.join()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

fn run(node: &Node, signal: &Signal) -> usize {
    let mut dispatched = 0;
    loop {
        // read the epoch before draining so a wake during the drain is kept
        let seen = signal.epoch();
        dispatched += node.drain();
        if node.state() == NodeState::Closed {
            break;
        }
        signal.wait(seen, Some(IDLE_POLL));
    }
    debug!(dispatched, "event loop finished");
    dispatched
}
