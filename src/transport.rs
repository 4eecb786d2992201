//! Transport traits for the two controller channels

use bytes::Bytes;

use crate::Result;
use crate::types::Multipart;

/// Subscribe side of the data channel.
#[async_trait::async_trait]
pub trait DataChannel: Send + 'static {
    /// Receive the next multipart message.
    ///
    /// Must be cancel-safe: the supervisor races this against the command
    /// channel and the poll timeout, and drops the future of the loser.
    ///
    /// Returns:
    /// - `Ok(frames)` - One complete message
    /// - `Err(e)` - Transport failure; fatal for the tick
    async fn recv(&mut self) -> Result<Multipart>;

    /// Release the channel.
    async fn close(self);
}

/// Request side of the command channel.
///
/// The wire underneath is strictly alternating: exactly one reply follows each
/// request. The dispatcher enforces that; implementations may assume it.
#[async_trait::async_trait]
pub trait CommandChannel: Send + 'static {
    async fn send(&mut self, request: Bytes) -> Result<()>;

    /// Receive the reply to the outstanding request. Must be cancel-safe.
    async fn recv(&mut self) -> Result<Bytes>;

    async fn close(self);
}

/// Opens channels against controller endpoints.
///
/// The supervisor calls `open_command` again every time it rebuilds the
/// command channel, so each call must produce an independent channel.
#[async_trait::async_trait]
pub trait Transport: Send + 'static {
    type Data: DataChannel;
    type Command: CommandChannel;

    /// Open the data channel subscribed to all topics.
    async fn open_data(&mut self, endpoint: &str) -> Result<Self::Data>;

    async fn open_command(&mut self, endpoint: &str) -> Result<Self::Command>;
}
