use std::fmt;
use std::sync::atomic::Ordering;

use crate::MQ::channel::SendChannel;
use crate::MQ::node::Node;
use crate::MQ::pool::MessagePool;
use crate::MQ::Queue::BoundedRingQueue;

/// Debug function for BoundedRingQueue
///
/// Shows the raw cursors rather than the entries, which may be mid-write.
pub fn debug_ring_queue<K, V>(
    queue: &BoundedRingQueue<K, V>,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    f.debug_struct("BoundedRingQueue")
        .field("capacity", &queue.capacity)
        .field("head", &queue.cursors.head.load(Ordering::Relaxed))
        .field("tail", &queue.cursors.tail.load(Ordering::Relaxed))
        .field("masked", &queue.mask.is_some())
        .finish()
}

/// Debug function for MessagePool
pub fn debug_message_pool(pool: &MessagePool, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MessagePool")
        .field("capacity", &pool.capacity())
        .field("message_size", &pool.message_size)
        .field("ready", &pool.ready_count())
        .field("active", &pool.active_count())
        .finish()
}

/// Debug function for SendChannel
///
/// The waker is opaque; the consumer lock is not touched.
pub fn debug_send_channel(channel: &SendChannel, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SendChannel")
        .field("pool", &channel.pool)
        .field("closed", &channel.closed.load(Ordering::Relaxed))
        .field("enqueuing", &channel.enqueuing.load(Ordering::Relaxed))
        .field("waker", &"<opaque>")
        .finish()
}

/// Debug function for Node
pub fn debug_node(node: &Node, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Node")
        .field("state", &node.state())
        .field("sending", &node.sending.load(Ordering::Relaxed))
        .field("outbound", &node.outbound)
        .field("inbound", &node.inbound)
        .field("inbound_hook", &node.inbound_hook.is_some())
        .finish_non_exhaustive()
}
