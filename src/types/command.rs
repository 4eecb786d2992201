//! Outgoing commands and their wire envelope

use serde::Serialize;
use uuid::Uuid;

use super::EventKind;

/// A command the consumer asks the controller to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutgoingCommand {
    pub event_type: EventKind,
    pub sample_num: i64,
    /// Caller-supplied id; the wire value is `event_id mod 2 + 1`.
    pub event_id: i64,
    pub event_channel: i64,
}

impl OutgoingCommand {
    /// A TTL command on `channel`.
    pub fn ttl(event_id: i64, channel: i64) -> Self {
        Self { event_type: EventKind::Ttl, sample_num: 0, event_id, event_channel: channel }
    }

    /// Id as transmitted.
    ///
    /// The controller expects the alternating `id mod 2 + 1` value. No
    /// rationale is documented for it; keep it exactly as is.
    pub fn wire_event_id(&self) -> i64 {
        self.event_id.rem_euclid(2) + 1
    }
}

impl Default for OutgoingCommand {
    fn default() -> Self {
        Self::ttl(2, 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Heartbeat,
    Event,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventBody {
    #[serde(rename = "type")]
    pub event_type: u8,
    pub sample_num: i64,
    pub event_id: i64,
    pub event_channel: i64,
}

impl From<&OutgoingCommand> for EventBody {
    fn from(command: &OutgoingCommand) -> Self {
        Self {
            event_type: command.event_type.code(),
            sample_num: command.sample_num,
            event_id: command.wire_event_id(),
            event_channel: command.event_channel,
        }
    }
}

/// JSON envelope sent on the command channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandEnvelope<'a> {
    pub application: &'a str,
    pub uuid: Uuid,
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<EventBody>,
}

impl<'a> CommandEnvelope<'a> {
    pub fn heartbeat(application: &'a str, uuid: Uuid) -> Self {
        Self { application, uuid, kind: EnvelopeKind::Heartbeat, event: None }
    }

    pub fn event(application: &'a str, uuid: Uuid, command: &OutgoingCommand) -> Self {
        Self { application, uuid, kind: EnvelopeKind::Event, event: Some(command.into()) }
    }
}
