//! Discrete events and the type-code table

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{LinkError, Result};

/// Minimum payload length for line/state/word decoding.
pub const TTL_PAYLOAD_LEN: usize = 10;

/// Payload length of a TIMESTAMP event.
pub const TIMESTAMP_PAYLOAD_LEN: usize = 8;

/// Symbolic event kind, mapped from the controller's numeric type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
#[repr(u8)]
pub enum EventKind {
    Timestamp = 0,
    BufferSize = 1,
    ParameterChange = 2,
    Ttl = 3,
    Spike = 4,
    Message = 5,
    BinaryMsg = 6,
}

impl EventKind {
    /// All kinds in type-code order.
    pub const ALL: [EventKind; 7] = [
        EventKind::Timestamp,
        EventKind::BufferSize,
        EventKind::ParameterChange,
        EventKind::Ttl,
        EventKind::Spike,
        EventKind::Message,
        EventKind::BinaryMsg,
    ];

    /// Look up a type code. Codes outside the table are an error, never a default.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(EventKind::Timestamp),
            1 => Ok(EventKind::BufferSize),
            2 => Ok(EventKind::ParameterChange),
            3 => Ok(EventKind::Ttl),
            4 => Ok(EventKind::Spike),
            5 => Ok(EventKind::Message),
            6 => Ok(EventKind::BinaryMsg),
            _ => Err(LinkError::UnknownEventType { code }),
        }
    }

    /// Numeric type code as sent on the wire.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Symbolic name used by the controller.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Timestamp => "TIMESTAMP",
            EventKind::BufferSize => "BUFFER_SIZE",
            EventKind::ParameterChange => "PARAMETER_CHANGE",
            EventKind::Ttl => "TTL",
            EventKind::Spike => "SPIKE",
            EventKind::Message => "MESSAGE",
            EventKind::BinaryMsg => "BINARY_MSG",
        }
    }
}

impl TryFrom<i64> for EventKind {
    type Error = LinkError;

    fn try_from(code: i64) -> Result<Self> {
        EventKind::from_code(code)
    }
}

impl From<EventKind> for u8 {
    fn from(kind: EventKind) -> Self {
        kind.code()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event fields carried in a header's `content` object.
///
/// `type` is required. The remaining fields default when absent and unknown
/// keys are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventContent {
    #[serde(rename = "type")]
    pub type_code: i64,
    #[serde(default)]
    pub stream: String,
    #[serde(default)]
    pub sample_num: i64,
    #[serde(default)]
    pub source_node: i64,
}

/// A discrete occurrence reported by the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub stream: String,
    pub sample_num: i64,
    pub source_node: i64,
    /// Externally supplied, or decoded from the payload for TIMESTAMP events.
    pub timestamp: Option<i64>,
    pub payload: Option<Bytes>,
    pub event_line: Option<u8>,
    pub event_state: Option<u8>,
    pub event_word: Option<u64>,
}

impl Event {
    /// Build an event from header content alone.
    pub fn from_content(content: EventContent) -> Result<Self> {
        let kind = EventKind::from_code(content.type_code)?;
        if kind == EventKind::Timestamp {
            return Err(LinkError::decode(
                "TIMESTAMP event",
                "no payload to decode the timestamp from",
            ));
        }

        Ok(Self {
            kind,
            stream: content.stream,
            sample_num: content.sample_num,
            source_node: content.source_node,
            timestamp: None,
            payload: None,
            event_line: None,
            event_state: None,
            event_word: None,
        })
    }

    /// Build an event from header content plus its binary payload.
    ///
    /// Byte 0 is the line, byte 1 the state and bytes 2..10 the little-endian
    /// word. TIMESTAMP events instead read bytes 0..8 as a signed timestamp that
    /// overrides `timestamp`.
    pub fn with_payload(
        content: EventContent,
        payload: Bytes,
        timestamp: Option<i64>,
    ) -> Result<Self> {
        let kind = EventKind::from_code(content.type_code)?;
        let mut event = Self {
            kind,
            stream: content.stream,
            sample_num: content.sample_num,
            source_node: content.source_node,
            timestamp,
            payload: None,
            event_line: None,
            event_state: None,
            event_word: None,
        };

        if kind == EventKind::Timestamp {
            let bytes: [u8; TIMESTAMP_PAYLOAD_LEN] = payload
                .get(..TIMESTAMP_PAYLOAD_LEN)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| {
                    LinkError::decode(
                        "TIMESTAMP event payload",
                        format!(
                            "expected {} bytes, got {}",
                            TIMESTAMP_PAYLOAD_LEN,
                            payload.len()
                        ),
                    )
                })?;
            event.timestamp = Some(i64::from_le_bytes(bytes));
        } else {
            let word: [u8; 8] = payload
                .get(2..TTL_PAYLOAD_LEN)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| {
                    LinkError::decode(
                        format!("{} event payload", kind),
                        format!("expected {} bytes, got {}", TTL_PAYLOAD_LEN, payload.len()),
                    )
                })?;
            event.event_line = Some(payload[0]);
            event.event_state = Some(payload[1]);
            event.event_word = Some(u64::from_le_bytes(word));
        }

        event.payload = Some(payload);
        Ok(event)
    }

    /// Number of payload bytes (0 without payload).
    pub fn payload_len(&self) -> usize {
        self.payload.as_ref().map_or(0, Bytes::len)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} event (stream='{}', source_node={}, sample_num={}",
            self.kind, self.stream, self.source_node, self.sample_num
        )?;
        if let Some(timestamp) = self.timestamp {
            write!(f, ", timestamp={}", timestamp)?;
        }
        if let (Some(line), Some(state), Some(word)) =
            (self.event_line, self.event_state, self.event_word)
        {
            write!(f, ", line={}, state={}, word={}", line, state, word)?;
        }
        write!(f, ", bytes={})", self.payload_len())
    }
}
