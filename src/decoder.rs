//! Data-channel message decoding and routing
//!
//! Each message is `[topic, header, payload?]`. The topic is ignored, the
//! JSON header names the message kind, and the optional payload carries the
//! binary body. Decoded results go straight to the [`Consumer`].

use bytes::Bytes;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::consumer::Consumer;
use crate::session::Session;
use crate::types::{
    ContinuousFrameHeader, Event, EventContent, FrameBuffer, MessageHeader, MessageKind,
    Multipart, SpikeContent, SpikeEvent, decode_samples,
};
use crate::{LinkError, Result};

/// Decodes data-channel messages and assembles continuous cycles.
#[derive(Debug, Default)]
pub struct MessageDecoder {
    buffer: FrameBuffer,
}

impl MessageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel vectors buffered for the cycle in progress.
    pub fn buffered_channels(&self) -> usize {
        self.buffer.len()
    }

    /// Decode one multipart message and deliver its content.
    ///
    /// A sequence gap is logged and counted, then the message is processed
    /// anyway. Any other failure aborts this message only.
    pub fn decode<C: Consumer + ?Sized>(
        &mut self,
        session: &mut Session,
        message: Multipart,
        consumer: &mut C,
    ) -> Result<MessageKind> {
        let mut parts = message.into_iter();
        let (Some(_topic), Some(header)) = (parts.next(), parts.next()) else {
            return Err(LinkError::decode(
                "data message",
                "expected at least topic and header frames",
            ));
        };
        let payload = parts.next();

        let header = MessageHeader::parse(&header)?;
        session.observe_message_num(header.message_num);
        let kind = header.message_kind()?;
        trace!(message_num = header.message_num, %kind, "Decoding message");

        match kind {
            MessageKind::Data => {
                let result = self.continuous(session, &header, payload, consumer);
                if result.is_err() {
                    self.buffer.clear();
                }
                result?
            }
            MessageKind::Event => {
                let content: EventContent = header.content_as()?;
                let event = if header.data_size > 0 {
                    let payload = require_payload(payload, "event")?;
                    Event::with_payload(content, payload, header.timestamp)?
                } else {
                    Event::from_content(content)?
                };
                consumer.on_event(event);
            }
            MessageKind::Spike => {
                let content: SpikeContent = header.spike_as()?;
                let waveform = require_payload(payload, "spike")?;
                consumer.on_spike_event(SpikeEvent::new(content, waveform));
            }
            MessageKind::Param => {
                let updates: Map<String, Value> = header.content_as()?;
                session.merge_params(updates);
            }
        }

        Ok(kind)
    }

    fn continuous<C: Consumer + ?Sized>(
        &mut self,
        session: &mut Session,
        header: &MessageHeader,
        payload: Option<Bytes>,
        consumer: &mut C,
    ) -> Result<()> {
        let frame: ContinuousFrameHeader = header.content_as()?;
        let timestamp = header.require_timestamp()?;

        let samples = match payload {
            Some(payload) => decode_samples(&payload, frame.num_samples)?,
            None if frame.num_samples == 0 => Vec::new(),
            None => return Err(missing_payload("data")),
        };

        let channel_count = session.channel_count();
        if frame.channel_num >= channel_count {
            return Err(LinkError::decode(
                "data content",
                format!(
                    "channel_num {} outside the {} configured channels",
                    frame.channel_num, channel_count
                ),
            ));
        }
        self.buffer.push(samples, channel_count)?;

        if frame.channel_num == channel_count - 1 {
            if let Some(matrix) = self.buffer.take_matrix(channel_count) {
                debug!(
                    samples = matrix.nrows(),
                    channels = matrix.ncols(),
                    timestamp,
                    "Continuous cycle complete"
                );
                session.record_frame_delivered();
                consumer.continuous(matrix, timestamp);
            }
        }

        Ok(())
    }
}

fn require_payload(payload: Option<Bytes>, kind: &str) -> Result<Bytes> {
    payload.ok_or_else(|| missing_payload(kind))
}

fn missing_payload(kind: &str) -> LinkError {
    LinkError::decode(format!("{} message", kind), "missing payload frame")
}
