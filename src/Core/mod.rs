pub mod error;
pub mod futex;
pub mod signal;

pub use error::{MqError, Result};
pub use signal::{Signal, Wake};
