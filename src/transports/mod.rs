//! Transport implementations
//!
//! - [`zmq`]: ZeroMQ SUB/REQ sockets against a running controller
//! - [`memory`]: in-process controller double for tests and offline replay

pub mod memory;
pub mod zmq;

pub use memory::{MemoryController, MemoryTransport};
pub use zmq::ZmqTransport;
