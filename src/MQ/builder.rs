use std::sync::Arc;

use super::channel::Dispatch;
use super::node::{CloseHook, InboundHook, Node};
use crate::Core::error::{MqError, Result};
use crate::Core::signal::Wake;

/// Sizes fixed at construction. Capacities bound the number of in-flight
/// messages per direction; message sizes are the bytes reserved per slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub outbound_capacity: usize,
    pub outbound_message_size: usize,
    pub inbound_capacity: usize,
    pub inbound_message_size: usize,
    /// Log routine outcomes (backpressure, rejected deliveries) at debug level.
    pub verbose: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 1024, // 1024 slots
            outbound_message_size: 1024,
            inbound_capacity: 1024,
            inbound_message_size: 1024,
            verbose: false,
        }
    }
}

impl NodeConfig {
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("outbound_capacity", self.outbound_capacity),
            ("outbound_message_size", self.outbound_message_size),
            ("inbound_capacity", self.inbound_capacity),
            ("inbound_message_size", self.inbound_message_size),
        ];
        for (parameter, value) in sizes {
            if value == 0 {
                return Err(MqError::invalid_config(
                    parameter,
                    "must be a positive integer",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct NodeBuilder {
    config: NodeConfig,
    inbound_hook: Option<InboundHook>,
    close_hook: Option<CloseHook>,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: NodeConfig) -> Self {
        Self {
            config,
            inbound_hook: None,
            close_hook: None,
        }
    }

    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.config.outbound_capacity = capacity;
        self
    }

    pub fn with_outbound_message_size(mut self, size: usize) -> Self {
        self.config.outbound_message_size = size;
        self
    }

    pub fn with_inbound_capacity(mut self, capacity: usize) -> Self {
        self.config.inbound_capacity = capacity;
        self
    }

    pub fn with_inbound_message_size(mut self, size: usize) -> Self {
        self.config.inbound_message_size = size;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    /// Offer every inbound payload to `hook` before it reaches the mailbox.
    /// Returning `true` consumes it.
    pub fn with_inbound_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        self.inbound_hook = Some(Box::new(hook));
        self
    }

    /// Run `hook` once the node has reached `Closed` and flushed its sink.
    pub fn with_close_hook<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.close_hook = Some(Box::new(hook));
        self
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Build a node in the `Ready` state.
    ///
    /// `waker` is the reactor's wake hook; `sink` receives drained outbound
    /// messages (the transport adapter).
    pub fn build<D>(self, waker: Arc<dyn Wake>, sink: D) -> Result<Node>
    where
        D: Dispatch + Send + 'static,
    {
        self.config.validate()?;
        Node::new(
            self.config,
            waker,
            Box::new(sink),
            self.inbound_hook,
            self.close_hook,
        )
    }
}
