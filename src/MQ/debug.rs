use std::fmt;

use super::channel::SendChannel;
use super::node::Node;
use super::pool::{MessagePool, PooledMessage};
use super::Queue::BoundedRingQueue;

// Debug proxy implementations that call the standalone debug functions
impl<K, V> fmt::Debug for BoundedRingQueue<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_ring_queue(self, f)
    }
}

impl fmt::Debug for MessagePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_message_pool(self, f)
    }
}

impl fmt::Debug for SendChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_send_channel(self, f)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_node(self, f)
    }
}

impl fmt::Debug for PooledMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledMessage")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("len", &self.len())
            .finish()
    }
}
