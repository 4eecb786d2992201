//! JSON header of a data-channel message

use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use crate::{LinkError, Result};

/// Declared kind of a data-channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Data,
    Event,
    Spike,
    Param,
}

impl MessageKind {
    /// Parse the header's `type` field. Anything unrecognised is an error.
    pub fn parse(kind: &str) -> Result<Self> {
        match kind {
            "data" => Ok(MessageKind::Data),
            "event" => Ok(MessageKind::Event),
            "spike" => Ok(MessageKind::Spike),
            "param" => Ok(MessageKind::Param),
            other => Err(LinkError::UnknownMessageType { kind: other.to_string() }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Data => "data",
            MessageKind::Event => "event",
            MessageKind::Spike => "spike",
            MessageKind::Param => "param",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header frame of a multipart data-channel message.
///
/// `message_num` and `type` are required. The remaining keys are required
/// only by the message kinds that read them; unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageHeader {
    pub message_num: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub data_size: u64,
    #[serde(default)]
    pub spike: Option<Value>,
}

impl MessageHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| LinkError::decode("message header", e.to_string()))
    }

    pub fn message_kind(&self) -> Result<MessageKind> {
        MessageKind::parse(&self.kind)
    }

    /// Deserialize the `content` object into a declared structure.
    pub fn content_as<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let content = self.content.clone().ok_or_else(|| {
            LinkError::decode(format!("{} header", self.kind), "missing 'content'")
        })?;
        serde_json::from_value(content)
            .map_err(|e| LinkError::decode(format!("{} content", self.kind), e.to_string()))
    }

    /// Deserialize the `spike` object into a declared structure.
    pub fn spike_as<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let spike = self
            .spike
            .clone()
            .ok_or_else(|| LinkError::decode("spike header", "missing 'spike'"))?;
        serde_json::from_value(spike).map_err(|e| LinkError::decode("spike content", e.to_string()))
    }

    pub fn require_timestamp(&self) -> Result<i64> {
        self.timestamp.ok_or_else(|| {
            LinkError::decode(format!("{} header", self.kind), "missing 'timestamp'")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContinuousFrameHeader;

    #[test]
    fn parses_data_header() {
        let header = MessageHeader::parse(
            br#"{"message_num": 4, "type": "data", "timestamp": 1200, "data_size": 40,
                 "content": {"num_samples": 10, "channel_num": 1, "sample_rate": 30000.0, "sample_num": 88}}"#,
        )
        .unwrap();

        assert_eq!(header.message_kind().unwrap(), MessageKind::Data);
        let content: ContinuousFrameHeader = header.content_as().unwrap();
        assert_eq!(content.num_samples, 10);
        assert_eq!(content.channel_num, 1);
        assert_eq!(header.require_timestamp().unwrap(), 1200);
    }

    #[test]
    fn unknown_type_is_explicit_failure() {
        let header = MessageHeader::parse(br#"{"message_num": 1, "type": "unknown"}"#).unwrap();
        match header.message_kind() {
            Err(LinkError::UnknownMessageType { kind }) => assert_eq!(kind, "unknown"),
            other => panic!("expected unknown type failure, got {other:?}"),
        }
    }

    #[test]
    fn malformed_json_is_decode_error() {
        assert!(matches!(MessageHeader::parse(b"{not json"), Err(LinkError::Decode { .. })));
    }

    #[test]
    fn missing_message_num_is_decode_error() {
        assert!(matches!(
            MessageHeader::parse(br#"{"type": "event"}"#),
            Err(LinkError::Decode { .. })
        ));
    }

    #[test]
    fn missing_content_is_reported() {
        let header = MessageHeader::parse(br#"{"message_num": 1, "type": "data"}"#).unwrap();
        let result: Result<ContinuousFrameHeader> = header.content_as();
        assert!(matches!(result, Err(LinkError::Decode { .. })));
        assert_eq!(header.data_size, 0);
    }
}
