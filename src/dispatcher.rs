//! Outgoing commands under the single-outstanding-request discipline

use bytes::Bytes;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::connection::ConnectionState;
use crate::session::Session;
use crate::transport::CommandChannel;
use crate::types::{CommandEnvelope, OutgoingCommand};
use crate::{LinkError, Result};

/// Builds command envelopes and sends them when no reply is outstanding.
///
/// A send while a reply is still expected is a protocol violation: it is
/// rejected without queueing and without touching any counter.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventDispatcher;

impl EventDispatcher {
    pub fn new() -> Self {
        Self
    }

    pub async fn send<C: CommandChannel>(
        &self,
        session: &mut Session,
        state: &mut ConnectionState,
        channel: &mut C,
        command: &OutgoingCommand,
        now: Instant,
    ) -> Result<()> {
        Self::ensure_idle(state, "event")?;

        let envelope =
            CommandEnvelope::event(session.application(), session.instance_id(), command);
        let request = encode(&envelope, "event command")?;

        channel.send(request).await?;
        state.mark_sent(now, false);
        let number = session.record_command();
        debug!(
            number,
            event_type = %command.event_type,
            event_id = command.wire_event_id(),
            channel = command.event_channel,
            "Event sent"
        );
        Ok(())
    }

    pub async fn send_heartbeat<C: CommandChannel>(
        &self,
        session: &Session,
        state: &mut ConnectionState,
        channel: &mut C,
        now: Instant,
    ) -> Result<()> {
        Self::ensure_idle(state, "heartbeat")?;

        let envelope = CommandEnvelope::heartbeat(session.application(), session.instance_id());
        let request = encode(&envelope, "heartbeat")?;

        info!("Sending heartbeat");
        channel.send(request).await?;
        state.mark_sent(now, true);
        Ok(())
    }

    fn ensure_idle(state: &ConnectionState, what: &str) -> Result<()> {
        if state.awaiting_ack() {
            let violation = LinkError::protocol_violation(format!(
                "can't send {}, still waiting for previous reply",
                what
            ));
            error!(%violation, "Send rejected");
            return Err(violation);
        }
        Ok(())
    }
}

fn encode<T: Serialize>(envelope: &T, context: &str) -> Result<Bytes> {
    serde_json::to_vec(envelope)
        .map(Bytes::from)
        .map_err(|source| LinkError::Serialization { context: context.to_string(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Transport;
    use crate::transports::MemoryTransport;
    use crate::types::EventKind;

    #[tokio::test]
    async fn accepted_send_builds_envelope_and_awaits_reply() {
        let (mut transport, controller) = MemoryTransport::new();
        let mut channel = transport.open_command("mem://cmd").await.unwrap();
        let mut session = Session::new("Simple Plotter", 4);
        let mut state = ConnectionState::new(Instant::now());

        let command = OutgoingCommand::ttl(4, 1);
        EventDispatcher::new()
            .send(&mut session, &mut state, &mut channel, &command, Instant::now())
            .await
            .unwrap();

        assert!(state.awaiting_ack());
        assert!(state.last_send().is_some());
        assert_eq!(session.commands_sent(), 1);

        let sent = controller.requests()[0].json().unwrap();
        assert_eq!(sent["application"], "Simple Plotter");
        assert_eq!(sent["uuid"], session.instance_id().to_string());
        assert_eq!(sent["type"], "event");
        assert_eq!(sent["event"]["type"], EventKind::Ttl.code());
        assert_eq!(sent["event"]["event_id"], 1);
    }

    #[tokio::test]
    async fn send_while_awaiting_is_rejected_without_mutation() {
        let (mut transport, controller) = MemoryTransport::new();
        let mut channel = transport.open_command("mem://cmd").await.unwrap();
        let mut session = Session::new("test", 4);
        let mut state = ConnectionState::new(Instant::now());
        let dispatcher = EventDispatcher::new();

        let command = OutgoingCommand::ttl(2, 1);
        dispatcher.send(&mut session, &mut state, &mut channel, &command, Instant::now()).await.unwrap();

        let err = dispatcher
            .send(&mut session, &mut state, &mut channel, &command, Instant::now())
            .await
            .unwrap_err();

        assert!(matches!(err, LinkError::ProtocolViolation { .. }));
        assert_eq!(session.commands_sent(), 1);
        assert!(state.awaiting_ack());
        assert_eq!(controller.requests().len(), 1);
    }

    struct BrokenChannel;

    #[async_trait::async_trait]
    impl CommandChannel for BrokenChannel {
        async fn send(&mut self, _request: Bytes) -> Result<()> {
            Err(LinkError::transport("command send", "socket closed"))
        }

        async fn recv(&mut self) -> Result<Bytes> {
            std::future::pending().await
        }

        async fn close(self) {}
    }

    #[tokio::test]
    async fn failed_send_is_not_counted() {
        let mut session = Session::new("test", 4);
        let mut state = ConnectionState::new(Instant::now());

        let command = OutgoingCommand::ttl(2, 1);
        let err = EventDispatcher::new()
            .send(&mut session, &mut state, &mut BrokenChannel, &command, Instant::now())
            .await
            .unwrap_err();

        assert!(matches!(err, LinkError::Transport { .. }));
        assert_eq!(session.commands_sent(), 0);
        assert!(!state.awaiting_ack());
        assert!(state.last_send().is_none());
    }

    #[tokio::test]
    async fn heartbeat_follows_the_same_rule() {
        let (mut transport, controller) = MemoryTransport::new();
        let mut channel = transport.open_command("mem://cmd").await.unwrap();
        let mut session = Session::new("test", 4);
        let mut state = ConnectionState::new(Instant::now());
        let dispatcher = EventDispatcher::new();

        dispatcher.send_heartbeat(&session, &mut state, &mut channel, Instant::now()).await.unwrap();
        assert!(state.last_heartbeat().is_some());
        assert_eq!(session.commands_sent(), 0);

        let command = OutgoingCommand::ttl(3, 1);
        assert!(
            dispatcher
                .send(&mut session, &mut state, &mut channel, &command, Instant::now())
                .await
                .is_err()
        );

        let heartbeat = controller.requests()[0].json().unwrap();
        assert_eq!(heartbeat["type"], "heartbeat");
        assert!(heartbeat.get("event").is_none());
    }
}
