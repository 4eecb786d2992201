//! Connection state and the supervisor that owns both channels
//!
//! [`ConnectionState`] tracks the acknowledgement discipline of the command
//! channel. [`Supervisor`] owns the channel handles and runs the poll loop.

mod supervisor;
#[cfg(test)]
mod tests;

pub use supervisor::Supervisor;

use tokio::time::Instant;

use crate::heartbeat::HeartbeatState;

/// Which channels had work during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub data: bool,
    pub command: bool,
}

impl Readiness {
    /// No channel was ready; the scheduler's round is done.
    pub fn is_empty(&self) -> bool {
        !self.data && !self.command
    }
}

/// Acknowledgement and heartbeat timing for the command channel.
///
/// `awaiting_ack` is true strictly between a send and its acknowledgement, or
/// until a forced reconnect clears it.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    awaiting_ack: bool,
    last_heartbeat: Option<Instant>,
    last_ack: Instant,
    last_send: Option<Instant>,
    command_generation: u64,
}

impl ConnectionState {
    pub fn new(now: Instant) -> Self {
        Self {
            awaiting_ack: false,
            last_heartbeat: None,
            last_ack: now,
            last_send: None,
            command_generation: 0,
        }
    }

    pub fn awaiting_ack(&self) -> bool {
        self.awaiting_ack
    }

    pub fn heartbeat_state(&self) -> HeartbeatState {
        if self.awaiting_ack { HeartbeatState::AwaitingAck } else { HeartbeatState::Idle }
    }

    /// Heartbeat schedule anchor; `None` until the first heartbeat.
    pub fn last_heartbeat(&self) -> Option<Instant> {
        self.last_heartbeat
    }

    pub fn last_ack(&self) -> Instant {
        self.last_ack
    }

    pub fn last_send(&self) -> Option<Instant> {
        self.last_send
    }

    /// How many command channels have been opened, counting from 1.
    pub fn command_generation(&self) -> u64 {
        self.command_generation
    }

    pub(crate) fn mark_sent(&mut self, now: Instant, heartbeat: bool) {
        self.awaiting_ack = true;
        self.last_send = Some(now);
        if heartbeat {
            self.last_heartbeat = Some(now);
        }
    }

    /// Clear the outstanding request. Returns `false` if none was outstanding,
    /// in which case `last_ack` is left untouched.
    pub(crate) fn acknowledge(&mut self, now: Instant) -> bool {
        if !self.awaiting_ack {
            return false;
        }
        self.awaiting_ack = false;
        self.last_ack = now;
        true
    }

    pub(crate) fn defer_heartbeat(&mut self, by: std::time::Duration, now: Instant) {
        self.last_heartbeat = Some(self.last_heartbeat.map_or(now, |t| t + by));
    }

    pub(crate) fn reset_after_reconnect(&mut self, now: Instant) {
        self.awaiting_ack = false;
        self.last_ack = now;
    }

    pub(crate) fn command_channel_opened(&mut self) {
        self.command_generation += 1;
    }
}
