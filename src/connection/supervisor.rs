//! The poll loop that owns both controller channels

use bytes::Bytes;
use futures::FutureExt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{ConnectionState, Readiness};
use crate::config::LinkConfig;
use crate::consumer::{Consumer, ParamSpec};
use crate::decoder::MessageDecoder;
use crate::dispatcher::EventDispatcher;
use crate::heartbeat::{HeartbeatAction, HeartbeatMonitor};
use crate::session::Session;
use crate::transport::{CommandChannel, DataChannel, Transport};
use crate::types::{Multipart, OutgoingCommand};
use crate::{LinkError, Result};

enum Ready {
    Data(Result<Multipart>),
    Reply(Result<Bytes>),
}

/// Owns the data and command channels and drives one engine instance.
///
/// All protocol state is touched only from [`tick`](Self::tick) and
/// [`send_event`](Self::send_event), so a single task owns the engine and no
/// locking is needed.
pub struct Supervisor<T: Transport, C: Consumer> {
    config: LinkConfig,
    transport: T,
    consumer: C,
    session: Session,
    state: ConnectionState,
    monitor: HeartbeatMonitor,
    dispatcher: EventDispatcher,
    decoder: MessageDecoder,
    data: Option<T::Data>,
    command: Option<T::Command>,
}

impl<T: Transport, C: Consumer> Supervisor<T, C> {
    /// Create an engine. No channel is opened until the first tick.
    pub fn new(config: LinkConfig, transport: T, consumer: C) -> Result<Self> {
        config.validate()?;

        let session = Session::new(config.application.clone(), config.channel_count);
        let monitor =
            HeartbeatMonitor::new(config.heartbeat_interval(), config.dead_connection_timeout());
        info!(
            application = %session.application(),
            instance = %session.instance_id(),
            channels = session.channel_count(),
            "Engine created"
        );

        Ok(Self {
            config,
            transport,
            consumer,
            session,
            state: ConnectionState::new(Instant::now()),
            monitor,
            dispatcher: EventDispatcher::new(),
            decoder: MessageDecoder::new(),
            data: None,
            command: None,
        })
    }

    /// Open whichever channels are not open yet. Idempotent.
    pub async fn connect(&mut self) -> Result<()> {
        if self.data.is_none() {
            let channel = self.transport.open_data(&self.config.data_endpoint).await?;
            info!(endpoint = %self.config.data_endpoint, "Data channel open");
            self.data = Some(channel);
        }

        if self.command.is_none() {
            self.open_command().await?;
        }

        Ok(())
    }

    /// One scheduling step: heartbeat supervision, then a bounded poll of both
    /// channels.
    ///
    /// Decode failures are logged and counted; the tick still succeeds. A
    /// transport failure on either channel is returned after everything else
    /// polled in the same tick has been handled. The failed channel is closed
    /// and reopened by the next tick.
    pub async fn tick(&mut self, timeout: Duration) -> Result<Readiness> {
        self.connect().await?;
        self.supervise_heartbeat().await?;

        let mut readiness = Readiness::default();
        let (message, reply) = match self.poll(timeout).await {
            Some(Ready::Data(message)) => (Some(message), self.try_reply()),
            Some(Ready::Reply(reply)) => (self.try_data(), Some(reply)),
            None => (None, None),
        };

        let mut failure = None;
        if let Some(message) = message {
            readiness.data = true;
            match message {
                Ok(message) => self.handle_message(message),
                Err(e) => {
                    error!(error = %e, "Data channel failed");
                    if let Some(channel) = self.data.take() {
                        channel.close().await;
                    }
                    failure = Some(e);
                }
            }
        }

        if let Some(reply) = reply {
            readiness.command = true;
            match reply {
                Ok(reply) => self.handle_reply(&reply),
                Err(e) => {
                    error!(error = %e, "Command channel failed");
                    if let Some(channel) = self.command.take() {
                        channel.close().await;
                    }
                    // The reopened channel has nothing outstanding.
                    self.state.reset_after_reconnect(Instant::now());
                    failure.get_or_insert(e);
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(readiness),
        }
    }

    /// Tick until neither channel has work. Returns how many ticks found work.
    pub async fn run_cycle(&mut self) -> Result<u64> {
        let timeout = self.config.poll_timeout();
        let mut busy = 0;
        while !self.tick(timeout).await?.is_empty() {
            busy += 1;
        }
        Ok(busy)
    }

    /// Send a consumer command. Fails without side effects while a reply is
    /// outstanding.
    pub async fn send_event(&mut self, command: &OutgoingCommand) -> Result<()> {
        self.connect().await?;
        let channel = self
            .command
            .as_mut()
            .ok_or_else(|| LinkError::protocol_violation("command channel is not open"))?;
        self.dispatcher
            .send(&mut self.session, &mut self.state, channel, command, Instant::now())
            .await
    }

    /// Release both channels.
    pub async fn close(mut self) {
        if let Some(data) = self.data.take() {
            data.close().await;
        }
        if let Some(command) = self.command.take() {
            command.close().await;
        }
        let stats = self.session.stats();
        info!(
            messages = stats.messages,
            gaps = stats.sequence_gaps,
            dropped = stats.dropped,
            frames = stats.frames_delivered,
            commands = self.session.commands_sent(),
            "Engine closed"
        );
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    pub fn consumer_mut(&mut self) -> &mut C {
        &mut self.consumer
    }

    pub fn param_config(&self) -> Vec<ParamSpec> {
        self.consumer.param_config()
    }

    async fn supervise_heartbeat(&mut self) -> Result<()> {
        let now = Instant::now();
        match self.monitor.evaluate(&mut self.state, now) {
            HeartbeatAction::SendHeartbeat => {
                if let Some(channel) = self.command.as_mut() {
                    self.dispatcher
                        .send_heartbeat(&self.session, &mut self.state, channel, now)
                        .await?;
                }
            }
            HeartbeatAction::Reconnect => self.reconnect().await?,
            HeartbeatAction::Retry | HeartbeatAction::Nothing => {}
        }
        Ok(())
    }

    /// Discard the command channel and open a fresh one. The data channel is
    /// left alone.
    async fn reconnect(&mut self) -> Result<()> {
        if let Some(stale) = self.command.take() {
            stale.close().await;
        }
        self.state.reset_after_reconnect(Instant::now());
        self.open_command().await?;
        info!(generation = self.state.command_generation(), "Command channel rebuilt");
        Ok(())
    }

    async fn open_command(&mut self) -> Result<()> {
        let channel = self.transport.open_command(&self.config.command_endpoint).await?;
        self.state.command_channel_opened();
        debug!(
            endpoint = %self.config.command_endpoint,
            generation = self.state.command_generation(),
            "Command channel open"
        );
        self.command = Some(channel);
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Option<Ready> {
        let data = self.data.as_mut();
        let command = self.command.as_mut();
        tokio::time::timeout(timeout, async move {
            tokio::select! {
                biased;
                message = recv_data(data) => Ready::Data(message),
                reply = recv_reply(command) => Ready::Reply(reply),
            }
        })
        .await
        .ok()
    }

    fn try_data(&mut self) -> Option<Result<Multipart>> {
        self.data.as_mut().and_then(|channel| channel.recv().now_or_never())
    }

    fn try_reply(&mut self) -> Option<Result<Bytes>> {
        self.command.as_mut().and_then(|channel| channel.recv().now_or_never())
    }

    fn handle_message(&mut self, message: Multipart) {
        if let Err(e) = self.decoder.decode(&mut self.session, message, &mut self.consumer) {
            warn!(error = %e, "Dropping data-channel message");
            self.session.record_dropped();
        }
    }

    fn handle_reply(&mut self, reply: &[u8]) {
        info!(reply = %String::from_utf8_lossy(reply), "Controller reply");
        if !self.state.acknowledge(Instant::now()) {
            error!("Reply received with no request outstanding");
        }
    }
}

async fn recv_data<D: DataChannel>(channel: Option<&mut D>) -> Result<Multipart> {
    match channel {
        Some(channel) => channel.recv().await,
        None => std::future::pending().await,
    }
}

async fn recv_reply<M: CommandChannel>(channel: Option<&mut M>) -> Result<Bytes> {
    match channel {
        Some(channel) => channel.recv().await,
        None => std::future::pending().await,
    }
}
