// Module naming follows project convention (MQ = Message Queue)
#[allow(non_snake_case)]
pub mod MQ;

#[allow(non_snake_case)]
pub mod Core;

#[allow(non_snake_case)]
mod Debug {
    pub mod StructDebug;
}

pub mod trace;

pub use Core::error::{MqError, Result};
pub use MQ::{
    Dispatch, EventLoop, MessagePool, Node, NodeBuilder, NodeConfig, NodeState, PooledMessage,
    SendChannel,
};
