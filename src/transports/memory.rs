//! In-process controller double
//!
//! [`MemoryTransport`] hands the supervisor channels whose other ends are held
//! by a [`MemoryController`]. The controller publishes data-channel messages,
//! sees every request the engine sent (tagged with the command channel that
//! carried it), and answers them.
//!
//! ```rust
//! use ephys_link::transports::MemoryTransport;
//!
//! let (transport, controller) = MemoryTransport::new();
//! assert_eq!(controller.command_channels_opened(), 0);
//! # drop(transport);
//! ```

use bytes::Bytes;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;

use crate::transport::{CommandChannel, DataChannel, Transport};
use crate::types::Multipart;
use crate::{LinkError, Result};

/// A request as observed by the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedRequest {
    /// Which command channel carried it, counting from 1.
    pub generation: u64,
    pub payload: Bytes,
}

impl ReceivedRequest {
    /// The request parsed as JSON.
    pub fn json(&self) -> Result<Value> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| LinkError::decode("recorded request", e.to_string()))
    }
}

#[derive(Default)]
struct Shared {
    data_tx: Option<mpsc::UnboundedSender<Multipart>>,
    data_rx: Option<mpsc::UnboundedReceiver<Multipart>>,
    reply_tx: Option<mpsc::UnboundedSender<Bytes>>,
    generation: u64,
    requests: Vec<ReceivedRequest>,
    refuse_command: bool,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Transport whose channels are served by a [`MemoryController`].
pub struct MemoryTransport {
    shared: Arc<Mutex<Shared>>,
}

/// Controller end of a [`MemoryTransport`].
#[derive(Clone)]
pub struct MemoryController {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryTransport {
    pub fn new() -> (Self, MemoryController) {
        let (data_tx, data_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(Shared {
            data_tx: Some(data_tx),
            data_rx: Some(data_rx),
            ..Shared::default()
        }));
        (Self { shared: Arc::clone(&shared) }, MemoryController { shared })
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    type Data = MemoryDataChannel;
    type Command = MemoryCommandChannel;

    async fn open_data(&mut self, endpoint: &str) -> Result<MemoryDataChannel> {
        let frames = lock(&self.shared)
            .data_rx
            .take()
            .ok_or_else(|| LinkError::connection_failed(endpoint, "data channel already open"))?;
        debug!(endpoint, "Memory data channel opened");
        Ok(MemoryDataChannel { frames })
    }

    async fn open_command(&mut self, endpoint: &str) -> Result<MemoryCommandChannel> {
        let mut shared = lock(&self.shared);
        if shared.refuse_command {
            return Err(LinkError::connection_failed(endpoint, "connection refused"));
        }

        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        shared.reply_tx = Some(reply_tx);
        shared.generation += 1;
        debug!(endpoint, generation = shared.generation, "Memory command channel opened");

        Ok(MemoryCommandChannel {
            generation: shared.generation,
            replies: reply_rx,
            shared: Arc::clone(&self.shared),
        })
    }
}

pub struct MemoryDataChannel {
    frames: mpsc::UnboundedReceiver<Multipart>,
}

#[async_trait::async_trait]
impl DataChannel for MemoryDataChannel {
    async fn recv(&mut self) -> Result<Multipart> {
        self.frames
            .recv()
            .await
            .ok_or_else(|| LinkError::transport("data channel receive", "controller hung up"))
    }

    async fn close(self) {}
}

pub struct MemoryCommandChannel {
    generation: u64,
    replies: mpsc::UnboundedReceiver<Bytes>,
    shared: Arc<Mutex<Shared>>,
}

impl MemoryCommandChannel {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[async_trait::async_trait]
impl CommandChannel for MemoryCommandChannel {
    async fn send(&mut self, request: Bytes) -> Result<()> {
        lock(&self.shared)
            .requests
            .push(ReceivedRequest { generation: self.generation, payload: request });
        Ok(())
    }

    async fn recv(&mut self) -> Result<Bytes> {
        self.replies
            .recv()
            .await
            .ok_or_else(|| LinkError::transport("command channel receive", "controller hung up"))
    }

    async fn close(self) {}
}

impl MemoryController {
    /// Publish a multipart message on the data channel.
    pub fn publish(&self, frames: Multipart) {
        if let Some(tx) = lock(&self.shared).data_tx.as_ref() {
            let _ = tx.send(frames);
        }
    }

    /// Publish `[topic, header, payload?]` with a JSON header.
    pub fn publish_json(&self, topic: &str, header: &Value, payload: Option<Bytes>) {
        let mut frames = vec![Bytes::copy_from_slice(topic.as_bytes()), Bytes::from(header.to_string())];
        frames.extend(payload);
        self.publish(frames);
    }

    /// Reply on the most recently opened command channel.
    pub fn reply(&self, payload: impl Into<Bytes>) {
        if let Some(tx) = lock(&self.shared).reply_tx.as_ref() {
            let _ = tx.send(payload.into());
        }
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<ReceivedRequest> {
        lock(&self.shared).requests.clone()
    }

    pub fn command_channels_opened(&self) -> u64 {
        lock(&self.shared).generation
    }

    /// Make subsequent command-channel opens fail.
    pub fn refuse_command_channel(&self, refuse: bool) {
        lock(&self.shared).refuse_command = refuse;
    }

    /// Close the data channel from the controller side.
    pub fn hang_up(&self) {
        lock(&self.shared).data_tx = None;
    }
}
