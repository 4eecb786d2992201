//! Consumer capability supplied to the engine

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::types::{Event, SpikeEvent};

/// Kind of an adjustable parameter exposed to a configuration surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    IntSet,
    FloatSet,
    StringSet,
}

/// One adjustable parameter: its kind, name and allowed values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub kind: ParamKind,
    pub name: String,
    pub allowed: Vec<Value>,
}

impl ParamSpec {
    pub fn int_set(name: impl Into<String>, allowed: impl IntoIterator<Item = i64>) -> Self {
        Self {
            kind: ParamKind::IntSet,
            name: name.into(),
            allowed: allowed.into_iter().map(Value::from).collect(),
        }
    }
}

/// Receives everything the engine decodes.
///
/// Callbacks run inside the tick. Long-running work here delays the heartbeat
/// schedule and can cause a spurious reconnect.
pub trait Consumer: Send {
    /// A complete continuous-data cycle, shaped `[num_samples, channel_count]`.
    fn continuous(&mut self, samples: Array2<f32>, timestamp: i64) {
        let _ = (samples, timestamp);
    }

    fn on_event(&mut self, event: Event) {
        info!(%event, "Event received");
    }

    fn on_spike_event(&mut self, spike: SpikeEvent) {
        info!(%spike, "Spike received");
    }

    /// Parameters this consumer lets an external configuration surface adjust.
    fn param_config(&self) -> Vec<ParamSpec> {
        Vec::new()
    }
}

/// Consumer that only logs what it receives.
#[derive(Debug, Default)]
pub struct LoggingConsumer {
    frames: u64,
}

impl LoggingConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Consumer for LoggingConsumer {
    fn continuous(&mut self, samples: Array2<f32>, timestamp: i64) {
        self.frames += 1;
        debug!(
            frame = self.frames,
            samples = samples.nrows(),
            channels = samples.ncols(),
            timestamp,
            "Continuous frame"
        );
    }
}
