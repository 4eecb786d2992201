//! Command-channel liveness supervision
//!
//! The monitor is evaluated once per tick against the current time. It never
//! performs I/O itself; it tells the supervisor what to do:
//!
//! | State        | Condition                                   | Action            |
//! |--------------|---------------------------------------------|-------------------|
//! | Idle         | heartbeat interval elapsed                  | send heartbeat    |
//! | AwaitingAck  | interval elapsed, ack silence below limit   | log, defer retry  |
//! | AwaitingAck  | interval elapsed, ack silence above limit   | rebuild channel   |
//!
//! Rebuilding instead of blocking on a silent request socket is the
//! "lazy pirate" recovery pattern.

use std::time::Duration;
use tokio::time::Instant;
use tracing::error;

use crate::LinkError;
use crate::connection::ConnectionState;

/// Whether a request is outstanding on the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatState {
    Idle,
    AwaitingAck,
}

/// What the supervisor must do after an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    Nothing,
    SendHeartbeat,
    /// Still waiting; the retry deadline moved forward one interval.
    Retry,
    Reconnect,
}

#[derive(Debug, Clone, Copy)]
pub struct HeartbeatMonitor {
    interval: Duration,
    dead_after: Duration,
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration, dead_after: Duration) -> Self {
        Self { interval, dead_after }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn dead_after(&self) -> Duration {
        self.dead_after
    }

    pub fn evaluate(&self, state: &mut ConnectionState, now: Instant) -> HeartbeatAction {
        let due = state
            .last_heartbeat()
            .is_none_or(|sent| now.saturating_duration_since(sent) > self.interval);
        if !due {
            return HeartbeatAction::Nothing;
        }

        if state.heartbeat_state() == HeartbeatState::Idle {
            return HeartbeatAction::SendHeartbeat;
        }

        let silent = now.saturating_duration_since(state.last_ack());
        let soft = LinkError::HeartbeatTimeout { elapsed: silent, hard: false };
        error!(%soft, "Heartbeat not acknowledged");
        state.defer_heartbeat(self.interval, now);

        if silent > self.dead_after {
            let hard = LinkError::HeartbeatTimeout { elapsed: silent, hard: true };
            error!(%hard, "Command channel lost, reconnecting");
            return HeartbeatAction::Reconnect;
        }

        HeartbeatAction::Retry
    }
}
