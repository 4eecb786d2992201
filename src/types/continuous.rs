//! Continuous-data frames and the per-cycle frame buffer

use ndarray::Array2;
use serde::Deserialize;
use tracing::warn;

use crate::{LinkError, Result};

/// Per-frame metadata from a `data` header's `content` object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContinuousFrameHeader {
    pub num_samples: usize,
    pub channel_num: usize,
    #[serde(default)]
    pub sample_rate: f64,
    #[serde(default)]
    pub sample_num: i64,
}

/// Decode a little-endian `f32` payload holding exactly `num_samples` values.
pub fn decode_samples(payload: &[u8], num_samples: usize) -> Result<Vec<f32>> {
    let expected = num_samples.checked_mul(4).ok_or_else(|| {
        LinkError::decode("continuous payload", format!("num_samples {} too large", num_samples))
    })?;
    if payload.len() != expected {
        return Err(LinkError::decode(
            "continuous payload",
            format!(
                "expected {} bytes for {} samples, got {}",
                expected,
                num_samples,
                payload.len()
            ),
        ));
    }

    Ok(payload
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Accumulates one vector per channel until the last channel closes the cycle.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    frames: Vec<Vec<f32>>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of channel vectors accumulated in the current cycle.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Append the next channel vector.
    ///
    /// A buffer that already holds `channel_count` vectors without having been
    /// closed is stale and is reset first. All vectors in a cycle must share
    /// one sample count; a mismatch resets the buffer and fails.
    pub fn push(&mut self, samples: Vec<f32>, channel_count: usize) -> Result<()> {
        if self.frames.len() >= channel_count {
            warn!(
                buffered = self.frames.len(),
                channel_count, "Frame buffer overflowed without closing, discarding cycle"
            );
            self.frames.clear();
        }

        if let Some(first) = self.frames.first() {
            if first.len() != samples.len() {
                let details = format!(
                    "channel vector has {} samples, cycle started with {}",
                    samples.len(),
                    first.len()
                );
                self.frames.clear();
                return Err(LinkError::decode("continuous frame buffer", details));
            }
        }

        self.frames.push(samples);
        Ok(())
    }

    /// Close the cycle, returning the `[num_samples, channel_count]` matrix.
    ///
    /// The buffer is always cleared. Returns `None` when the cycle is
    /// incomplete or carries no samples.
    pub fn take_matrix(&mut self, channel_count: usize) -> Option<Array2<f32>> {
        let frames = std::mem::take(&mut self.frames);

        if frames.len() != channel_count {
            warn!(
                received = frames.len(),
                channel_count, "Incomplete continuous cycle, discarding"
            );
            return None;
        }

        let num_samples = frames.first().map_or(0, Vec::len);
        if num_samples == 0 {
            return None;
        }

        Some(Array2::from_shape_fn((num_samples, channel_count), |(sample, channel)| {
            frames[channel][sample]
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn decode_samples_reads_little_endian_floats() {
        let payload = encode(&[1.5, -2.0, 0.25]);
        assert_eq!(decode_samples(&payload, 3).unwrap(), vec![1.5, -2.0, 0.25]);
    }

    #[test]
    fn decode_samples_rejects_truncated_payload() {
        let payload = encode(&[1.0, 2.0]);
        let err = decode_samples(&payload[..7], 2).unwrap_err();
        assert!(matches!(err, LinkError::Decode { .. }));
    }

    #[test]
    fn decode_samples_rejects_sample_count_overflowing_byte_length() {
        // 2^62 samples * 4 bytes wraps to zero.
        let err = decode_samples(&[], 1usize << 62).unwrap_err();
        assert!(matches!(err, LinkError::Decode { .. }));
        assert!(decode_samples(&[], usize::MAX).is_err());
    }

    #[test]
    fn matrix_columns_are_channel_vectors() {
        let mut buffer = FrameBuffer::new();
        buffer.push(vec![0.0, 1.0, 2.0], 2).unwrap();
        buffer.push(vec![10.0, 11.0, 12.0], 2).unwrap();

        let matrix = buffer.take_matrix(2).unwrap();
        assert_eq!(matrix.shape(), &[3, 2]);
        assert_eq!(matrix.column(1).to_vec(), vec![10.0, 11.0, 12.0]);
        assert_eq!(matrix.row(2).to_vec(), vec![2.0, 12.0]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn mismatched_sample_counts_reset_the_cycle() {
        let mut buffer = FrameBuffer::new();
        buffer.push(vec![0.0; 4], 3).unwrap();

        assert!(buffer.push(vec![0.0; 5], 3).is_err());
        assert!(buffer.is_empty());
    }

    #[test]
    fn incomplete_cycle_is_not_delivered() {
        let mut buffer = FrameBuffer::new();
        buffer.push(vec![1.0], 4).unwrap();

        assert!(buffer.take_matrix(4).is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn zero_sample_cycle_clears_without_matrix() {
        let mut buffer = FrameBuffer::new();
        buffer.push(Vec::new(), 1).unwrap();

        assert!(buffer.take_matrix(1).is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn stale_full_buffer_is_reset_before_push() {
        let mut buffer = FrameBuffer::new();
        buffer.push(vec![1.0], 1).unwrap();
        buffer.push(vec![2.0], 1).unwrap();

        let matrix = buffer.take_matrix(1).unwrap();
        assert_eq!(matrix[[0, 0]], 2.0);
    }
}
