//! Spike events

use bytes::Bytes;
use ndarray::Array2;
use serde::Deserialize;
use std::fmt;

use crate::{LinkError, Result};

/// Spike fields carried in a header's `spike` object.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct SpikeContent {
    pub stream: String,
    pub source_node: i64,
    pub electrode: i64,
    pub sample_num: i64,
    pub num_channels: usize,
    pub num_samples: usize,
    pub sorted_id: i64,
    pub threshold: Vec<f64>,
}

/// A detected spike with its raw waveform.
#[derive(Debug, Clone, PartialEq)]
pub struct SpikeEvent {
    pub stream: String,
    pub source_node: i64,
    pub electrode: i64,
    pub sample_num: i64,
    pub num_channels: usize,
    pub num_samples: usize,
    pub sorted_id: i64,
    pub thresholds: Vec<f64>,
    pub waveform: Bytes,
}

impl SpikeEvent {
    pub fn new(content: SpikeContent, waveform: Bytes) -> Self {
        Self {
            stream: content.stream,
            source_node: content.source_node,
            electrode: content.electrode,
            sample_num: content.sample_num,
            num_channels: content.num_channels,
            num_samples: content.num_samples,
            sorted_id: content.sorted_id,
            thresholds: content.threshold,
            waveform,
        }
    }

    /// Interpret the waveform as little-endian `f32` values shaped
    /// `[num_channels, num_samples]`.
    pub fn waveform(&self) -> Result<Array2<f32>> {
        let expected = self
            .num_channels
            .checked_mul(self.num_samples)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| {
                LinkError::decode(
                    format!("spike waveform (electrode {})", self.electrode),
                    format!("{}x{} samples too large", self.num_channels, self.num_samples),
                )
            })?;
        if self.waveform.len() != expected {
            return Err(LinkError::decode(
                format!("spike waveform (electrode {})", self.electrode),
                format!(
                    "expected {} bytes for {}x{} samples, got {}",
                    expected,
                    self.num_channels,
                    self.num_samples,
                    self.waveform.len()
                ),
            ));
        }

        let values: Vec<f32> = self
            .waveform
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Array2::from_shape_vec((self.num_channels, self.num_samples), values)
            .map_err(|e| LinkError::decode("spike waveform", e.to_string()))
    }
}

impl fmt::Display for SpikeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "spike (stream='{}', source_node={}, electrode={}, sample_num={}, channels={}, samples={}, sorted_id={}, thresholds={:?})",
            self.stream,
            self.source_node,
            self.electrode,
            self.sample_num,
            self.num_channels,
            self.num_samples,
            self.sorted_id,
            self.thresholds
        )
    }
}
