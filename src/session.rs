//! Per-process protocol session state

use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::LinkError;

/// Parameter key that also sets the expected channel count.
pub const CHANNEL_COUNT_PARAM: &str = "chan_in";

/// Counters kept for the lifetime of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub messages: u64,
    pub sequence_gaps: u64,
    pub dropped: u64,
    pub frames_delivered: u64,
}

/// Mutable protocol state shared by every operation of one engine instance.
#[derive(Debug, Clone)]
pub struct Session {
    application: String,
    instance_id: Uuid,
    channel_count: usize,
    message_num: Option<i64>,
    commands_sent: u64,
    params: Map<String, Value>,
    stats: SessionStats,
}

impl Session {
    pub fn new(application: impl Into<String>, channel_count: usize) -> Self {
        Self {
            application: application.into(),
            instance_id: Uuid::new_v4(),
            channel_count,
            message_num: None,
            commands_sent: 0,
            params: Map::new(),
            stats: SessionStats::default(),
        }
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Last data-channel message number seen.
    pub fn message_num(&self) -> Option<i64> {
        self.message_num
    }

    pub fn commands_sent(&self) -> u64 {
        self.commands_sent
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Record a data-channel message number, logging a gap if it does not
    /// follow the previous one. Returns the gap, if any; the message is still
    /// processed.
    pub fn observe_message_num(&mut self, message_num: i64) -> Option<LinkError> {
        self.stats.messages += 1;
        let gap = match self.message_num {
            Some(previous) if previous.checked_add(1) != Some(message_num) => {
                let expected = previous.wrapping_add(1);
                let gap = LinkError::SequenceGap { expected, received: message_num };
                warn!(%gap, "Missing data-channel message(s)");
                self.stats.sequence_gaps += 1;
                Some(gap)
            }
            _ => None,
        };
        self.message_num = Some(message_num);
        gap
    }

    pub(crate) fn record_command(&mut self) -> u64 {
        self.commands_sent += 1;
        self.commands_sent
    }

    pub(crate) fn record_dropped(&mut self) {
        self.stats.dropped += 1;
    }

    pub(crate) fn record_frame_delivered(&mut self) {
        self.stats.frames_delivered += 1;
    }

    /// Merge parameter updates from the controller.
    ///
    /// Every key is kept. `chan_in` also replaces the channel count when it is a
    /// positive integer.
    pub fn merge_params(&mut self, updates: Map<String, Value>) {
        info!(params = %serde_json::Value::Object(updates.clone()), "Parameters updated");

        if let Some(value) = updates.get(CHANNEL_COUNT_PARAM) {
            match value.as_u64().filter(|n| *n > 0) {
                Some(count) => {
                    info!(from = self.channel_count, to = count, "Channel count changed");
                    self.channel_count = count as usize;
                }
                None => warn!(%value, "Ignoring invalid channel count parameter"),
            }
        }

        self.params.extend(updates);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_message_never_counts_as_gap() {
        let mut session = Session::new("test", 4);
        assert!(session.observe_message_num(57).is_none());
        assert_eq!(session.message_num(), Some(57));
    }

    #[test]
    fn message_after_i64_max_is_a_gap() {
        let mut session = Session::new("test", 4);
        session.observe_message_num(i64::MAX);
        let gap = session.observe_message_num(0);

        assert!(matches!(gap, Some(LinkError::SequenceGap { expected: i64::MIN, received: 0 })));
        assert_eq!(session.stats().sequence_gaps, 1);
    }

    #[test]
    fn jump_records_exactly_one_gap() {
        let mut session = Session::new("test", 4);
        session.observe_message_num(1);
        let gap = session.observe_message_num(5);

        assert!(matches!(gap, Some(LinkError::SequenceGap { expected: 2, received: 5 })));
        assert!(session.observe_message_num(6).is_none());
        assert_eq!(session.stats().sequence_gaps, 1);
        assert_eq!(session.stats().messages, 3);
    }

    #[test]
    fn params_merge_and_update_channel_count() {
        let mut session = Session::new("test", 32);
        let updates = json!({"chan_in": 8, "gain": 2.5});
        session.merge_params(updates.as_object().cloned().unwrap());

        assert_eq!(session.channel_count(), 8);
        assert_eq!(session.params()["gain"], json!(2.5));
    }

    #[test]
    fn invalid_channel_count_param_is_ignored() {
        let mut session = Session::new("test", 32);
        session.merge_params(json!({"chan_in": 0}).as_object().cloned().unwrap());
        assert_eq!(session.channel_count(), 32);
    }

    #[test]
    fn instance_ids_are_unique() {
        assert_ne!(Session::new("a", 1).instance_id(), Session::new("a", 1).instance_id());
    }
}
