pub mod Queue {
    pub mod Queue;
    pub mod Queue_impl;
    pub mod layout;
    pub use Queue::{BoundedRingQueue, Slot, Validity}; // re-export for stable path
}

pub mod Structs {
    pub mod Message_Structs;
    pub use Message_Structs::{Kind, Message, MessageId}; // re-export for stable path
}

mod debug;

pub mod builder;
pub mod channel;
pub mod event_loop;
pub mod node;
pub mod pool;

pub use builder::{NodeBuilder, NodeConfig};
pub use channel::{Dispatch, SendChannel};
pub use event_loop::EventLoop;
pub use node::{Node, NodeState};
pub use pool::{MessagePool, PooledMessage};
