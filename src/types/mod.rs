//! Core types for the Open Ephys wire protocol.
//!
//! This module holds the validated domain structures the decoder produces and
//! the command envelopes the dispatcher sends.
//!
//! ## Data channel
//!
//! - [`MessageHeader`] is the JSON header frame of every multipart message and
//!   [`MessageKind`] its declared type
//! - [`ContinuousFrameHeader`] describes one channel's block of samples and
//!   [`FrameBuffer`] collects those blocks into a `[samples, channels]` matrix
//! - [`Event`] and [`EventKind`] model discrete events, including the binary
//!   TTL and TIMESTAMP payload layouts
//! - [`SpikeEvent`] carries spike metadata and the raw waveform
//!
//! ## Command channel
//!
//! - [`OutgoingCommand`] is what a consumer asks to send
//! - [`CommandEnvelope`] is the JSON object actually transmitted
//!
//! ## Usage Example
//!
//! ```rust
//! use bytes::Bytes;
//! use ephys_link::types::{Event, EventContent, EventKind};
//!
//! let content = EventContent {
//!     type_code: 3,
//!     stream: "example_data".to_string(),
//!     sample_num: 0,
//!     source_node: 100,
//! };
//! let mut payload = vec![2u8, 1];
//! payload.extend_from_slice(&42u64.to_le_bytes());
//!
//! let event = Event::with_payload(content, Bytes::from(payload), Some(1000)).unwrap();
//! assert_eq!(event.kind, EventKind::Ttl);
//! assert_eq!(event.event_word, Some(42));
//! ```

mod command;
mod continuous;
mod event;
mod header;
mod spike;

pub use command::{CommandEnvelope, EnvelopeKind, EventBody, OutgoingCommand};
pub use continuous::{ContinuousFrameHeader, FrameBuffer, decode_samples};
pub use event::{Event, EventContent, EventKind, TIMESTAMP_PAYLOAD_LEN, TTL_PAYLOAD_LEN};
pub use header::{MessageHeader, MessageKind};
pub use spike::{SpikeContent, SpikeEvent};

/// One multipart message as received: topic, header, optional payload.
pub type Multipart = Vec<bytes::Bytes>;
