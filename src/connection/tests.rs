//! Supervisor scenarios against the in-memory controller
//!
//! Time is paused, so heartbeat and reconnect deadlines are driven with
//! `tokio::time::advance` rather than real sleeps.

use super::*;
use crate::config::LinkConfig;
use crate::consumer::{Consumer, ParamSpec};
use crate::transports::{MemoryController, MemoryTransport};
use crate::types::{Event, EventKind, OutgoingCommand};
use crate::LinkError;
use bytes::Bytes;
use ndarray::Array2;
use serde_json::json;
use std::time::Duration;

const POLL: Duration = Duration::from_millis(1);

#[derive(Default)]
struct Recorder {
    frames: Vec<Array2<f32>>,
    events: Vec<Event>,
}

impl Consumer for Recorder {
    fn continuous(&mut self, samples: Array2<f32>, _timestamp: i64) {
        self.frames.push(samples);
    }

    fn on_event(&mut self, event: Event) {
        self.events.push(event);
    }

    fn param_config(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::int_set("chan_in", 1..=8)]
    }
}

fn engine(channels: usize) -> (Supervisor<MemoryTransport, Recorder>, MemoryController) {
    let (transport, controller) = MemoryTransport::new();
    let config = LinkConfig::default()
        .with_endpoints("mem://data", "mem://command")
        .with_channel_count(channels);
    let supervisor = Supervisor::new(config, transport, Recorder::default()).unwrap();
    (supervisor, controller)
}

fn publish_channel(controller: &MemoryController, message_num: i64, channel: usize, values: &[f32]) {
    let payload: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    controller.publish_json(
        "",
        &json!({
            "message_num": message_num,
            "type": "data",
            "timestamp": 42,
            "data_size": payload.len(),
            "content": {"num_samples": values.len(), "channel_num": channel, "sample_rate": 30000.0},
        }),
        Some(Bytes::from(payload)),
    );
}

#[tokio::test(start_paused = true)]
async fn first_tick_connects_and_sends_heartbeat() {
    let (mut engine, controller) = engine(2);

    let readiness = engine.tick(POLL).await.unwrap();

    assert!(readiness.is_empty());
    assert_eq!(controller.command_channels_opened(), 1);
    assert!(engine.state().awaiting_ack());
    let requests = controller.requests();
    assert_eq!(requests.len(), 1);
    let heartbeat = requests[0].json().unwrap();
    assert_eq!(heartbeat["type"], "heartbeat");
    assert_eq!(heartbeat["uuid"], engine.session().instance_id().to_string());
}

#[tokio::test(start_paused = true)]
async fn reply_acknowledges_outstanding_request() {
    let (mut engine, controller) = engine(2);
    engine.tick(POLL).await.unwrap();

    controller.reply("heartbeat received");
    let readiness = engine.tick(POLL).await.unwrap();

    assert!(readiness.command);
    assert!(!engine.state().awaiting_ack());
}

#[tokio::test(start_paused = true)]
async fn send_while_awaiting_reply_is_rejected() {
    let (mut engine, controller) = engine(2);
    engine.tick(POLL).await.unwrap();

    let err = engine.send_event(&OutgoingCommand::ttl(2, 1)).await.unwrap_err();
    assert!(matches!(err, LinkError::ProtocolViolation { .. }));
    assert_eq!(engine.session().commands_sent(), 0);
    assert_eq!(controller.requests().len(), 1);

    controller.reply("ok");
    engine.tick(POLL).await.unwrap();
    engine.send_event(&OutgoingCommand::ttl(2, 1)).await.unwrap();

    assert_eq!(engine.session().commands_sent(), 1);
    let event = controller.requests()[1].json().unwrap();
    assert_eq!(event["type"], "event");
    assert_eq!(event["event"]["type"], EventKind::Ttl.code());
    assert_eq!(event["event"]["event_id"], 1);
}

#[tokio::test(start_paused = true)]
async fn silent_controller_triggers_exactly_one_reconnect() {
    let _ = tracing_subscriber::fmt::try_init();
    let (mut engine, controller) = engine(2);

    for _ in 0..30 {
        engine.tick(POLL).await.unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
    }

    // ~15s of silence: one rebuild past the 10s threshold, the next one is
    // not due until ~10s after it.
    assert_eq!(controller.command_channels_opened(), 2);
    assert_eq!(engine.state().command_generation(), 2);

    let generations: Vec<u64> = controller.requests().iter().map(|r| r.generation).collect();
    assert_eq!(generations.first(), Some(&1));
    assert_eq!(generations.last(), Some(&2));
}

#[tokio::test(start_paused = true)]
async fn reconnect_clears_awaiting_state() {
    let (mut engine, controller) = engine(2);
    engine.tick(POLL).await.unwrap();
    assert!(engine.state().awaiting_ack());

    tokio::time::advance(Duration::from_secs(11)).await;
    engine.tick(POLL).await.unwrap();

    assert_eq!(controller.command_channels_opened(), 2);
    assert!(!engine.state().awaiting_ack());

    // A fresh channel accepts a command immediately.
    engine.send_event(&OutgoingCommand::ttl(3, 1)).await.unwrap();
    assert_eq!(controller.requests().last().unwrap().generation, 2);
}

#[tokio::test(start_paused = true)]
async fn failed_rebuild_is_retried_on_next_tick() {
    let (mut engine, controller) = engine(2);
    engine.tick(POLL).await.unwrap();

    controller.refuse_command_channel(true);
    tokio::time::advance(Duration::from_secs(11)).await;
    let err = engine.tick(POLL).await.unwrap_err();
    assert!(matches!(err, LinkError::Connection { .. }));
    assert!(err.is_retryable());

    controller.refuse_command_channel(false);
    engine.tick(POLL).await.unwrap();
    assert_eq!(controller.command_channels_opened(), 2);
}

#[tokio::test(start_paused = true)]
async fn continuous_data_reaches_consumer() {
    let (mut engine, controller) = engine(2);

    publish_channel(&controller, 0, 0, &[1.0, 2.0, 3.0]);
    publish_channel(&controller, 1, 1, &[4.0, 5.0, 6.0]);
    let busy = engine.run_cycle().await.unwrap();

    assert_eq!(busy, 2);
    let frames = &engine.consumer().frames;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].shape(), &[3, 2]);
    assert_eq!(frames[0][[1, 1]], 5.0);
    assert_eq!(engine.session().stats().frames_delivered, 1);
}

#[tokio::test(start_paused = true)]
async fn bad_messages_do_not_stop_the_loop() {
    let (mut engine, controller) = engine(1);

    controller.publish_json("", &json!({"message_num": 0, "type": "unknown"}), None);
    controller.publish(vec![Bytes::from_static(b"lonely")]);
    controller.publish_json(
        "",
        &json!({"message_num": 1, "type": "event", "content": {"type": 3, "sample_num": 12288}}),
        None,
    );
    engine.run_cycle().await.unwrap();

    assert_eq!(engine.session().stats().dropped, 2);
    assert_eq!(engine.consumer().events.len(), 1);
    assert_eq!(engine.consumer().events[0].sample_num, 12288);
}

#[tokio::test(start_paused = true)]
async fn param_message_changes_channel_count() {
    let (mut engine, controller) = engine(32);

    controller.publish_json("", &json!({"message_num": 0, "type": "param", "content": {"chan_in": 1}}), None);
    publish_channel(&controller, 1, 0, &[7.0]);
    engine.run_cycle().await.unwrap();

    assert_eq!(engine.session().channel_count(), 1);
    assert_eq!(engine.consumer().frames.len(), 1);
    assert_eq!(engine.param_config()[0].name, "chan_in");
}

#[tokio::test(start_paused = true)]
async fn data_channel_hang_up_is_fatal() {
    let (mut engine, controller) = engine(2);
    engine.tick(POLL).await.unwrap();

    controller.hang_up();
    let err = engine.tick(POLL).await.unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn invalid_config_is_rejected() {
    let (transport, _controller) = MemoryTransport::new();
    let config = LinkConfig::default().with_channel_count(0);
    assert!(matches!(
        Supervisor::new(config, transport, Recorder::default()),
        Err(LinkError::Config { .. })
    ));
}
