//! Client-side protocol engine for the Open Ephys ZMQ interface.
//!
//! The engine subscribes to a controller's data channel, decodes continuous
//! samples, events and spikes, and keeps a request/reply command channel alive
//! with heartbeats, rebuilding it when the controller stops answering.
//!
//! # Features
//!
//! - **Continuous data**: per-channel blocks assembled into a
//!   `[samples, channels]` matrix per cycle
//! - **Events and spikes**: TTL, TIMESTAMP and spike payloads decoded into
//!   typed values
//! - **Lazy-pirate recovery**: a silent command channel is discarded and
//!   reopened without touching the data channel
//! - **Pluggable transport**: ZeroMQ for real controllers, an in-memory
//!   controller for tests
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ephys_link::{EphysLink, LinkConfig, LoggingConsumer};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> ephys_link::Result<()> {
//!     let mut engine = EphysLink::connect(LinkConfig::default(), LoggingConsumer::new())?;
//!
//!     loop {
//!         engine.run_cycle().await?;
//!         tokio::time::sleep(std::time::Duration::from_millis(10)).await;
//!     }
//! }
//! ```

// Core types and error handling
mod error;
pub mod config;
pub mod types;

// Protocol engine
pub mod connection;
pub mod consumer;
pub mod decoder;
pub mod dispatcher;
pub mod heartbeat;
pub mod session;

// Channels
pub mod transport;
pub mod transports;

// Core exports
pub use config::LinkConfig;
pub use error::*;
pub use types::*;

// Engine exports
pub use connection::{ConnectionState, Readiness, Supervisor};
pub use consumer::{Consumer, LoggingConsumer, ParamKind, ParamSpec};
pub use decoder::MessageDecoder;
pub use dispatcher::EventDispatcher;
pub use heartbeat::{HeartbeatAction, HeartbeatMonitor, HeartbeatState};
pub use session::{Session, SessionStats};
pub use transport::{CommandChannel, DataChannel, Transport};
pub use transports::{MemoryController, MemoryTransport, ZmqTransport};

/// Entry point for engines talking to a real controller.
///
/// # Examples
///
/// ```rust,no_run
/// use ephys_link::{EphysLink, LinkConfig, LoggingConsumer};
///
/// # fn main() -> ephys_link::Result<()> {
/// let config = LinkConfig::from_file("link.yaml")?;
/// let engine = EphysLink::connect(config, LoggingConsumer::new())?;
/// # Ok(())
/// # }
/// ```
pub struct EphysLink;

impl EphysLink {
    /// Create a ZeroMQ-backed engine.
    ///
    /// Sockets are opened lazily by the first tick, so this only validates the
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Config`] if the configuration is invalid.
    pub fn connect<C: Consumer>(config: LinkConfig, consumer: C) -> Result<Supervisor<ZmqTransport, C>> {
        Supervisor::new(config, ZmqTransport::new(), consumer)
    }

    /// Create an engine served by an in-process controller.
    pub fn in_memory<C: Consumer>(
        config: LinkConfig,
        consumer: C,
    ) -> Result<(Supervisor<MemoryTransport, C>, MemoryController)> {
        let (transport, controller) = MemoryTransport::new();
        Ok((Supervisor::new(config, transport, consumer)?, controller))
    }
}
