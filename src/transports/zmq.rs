//! ZeroMQ transport
//!
//! Each socket is owned by a spawned I/O task that connects it and then
//! forwards frames over a bounded queue. Opening a channel never waits for the
//! controller: like libzmq, the connect completes in the background and queued
//! requests go out once it does. The queues make `recv` cancel-safe, which the
//! supervisor's poll relies on. Closing or dropping a channel cancels its task,
//! including one still connecting, and closes the socket.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use zeromq::{Endpoint, ReqSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

use crate::transport::{CommandChannel, DataChannel, Transport};
use crate::types::Multipart;
use crate::{LinkError, Result};

/// Matches ZeroMQ's default receive high-water mark.
pub const DATA_QUEUE_DEPTH: usize = 1000;

/// Opens SUB and REQ sockets with the pure-Rust `zeromq` implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZmqTransport;

impl ZmqTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Transport for ZmqTransport {
    type Data = ZmqDataChannel;
    type Command = ZmqCommandChannel;

    async fn open_data(&mut self, endpoint: &str) -> Result<ZmqDataChannel> {
        let endpoint = parse_endpoint(endpoint)?;
        let (frames_tx, frames_rx) = mpsc::channel(DATA_QUEUE_DEPTH);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(data_reader_task(endpoint.clone(), frames_tx, cancel.clone()));

        info!(%endpoint, "Data channel opened");
        Ok(ZmqDataChannel { frames: frames_rx, cancel, task: Some(task) })
    }

    async fn open_command(&mut self, endpoint: &str) -> Result<ZmqCommandChannel> {
        let endpoint = parse_endpoint(endpoint)?;
        let (request_tx, request_rx) = mpsc::channel(1);
        let (reply_tx, reply_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let task =
            tokio::spawn(command_task(endpoint.clone(), request_rx, reply_tx, cancel.clone()));

        info!(%endpoint, "Command channel opened");
        Ok(ZmqCommandChannel {
            requests: request_tx,
            replies: reply_rx,
            cancel,
            task: Some(task),
        })
    }
}

/// Reject malformed endpoints up front; reachability is the I/O task's concern.
fn parse_endpoint(endpoint: &str) -> Result<Endpoint> {
    endpoint
        .parse::<Endpoint>()
        .map_err(|e| LinkError::connection_failed(endpoint, format!("invalid endpoint: {}", e)))
}

/// Data channel backed by a SUB socket task.
pub struct ZmqDataChannel {
    frames: mpsc::Receiver<Result<Multipart>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl DataChannel for ZmqDataChannel {
    async fn recv(&mut self) -> Result<Multipart> {
        match self.frames.recv().await {
            Some(frames) => frames,
            None => Err(LinkError::transport("data channel receive", "socket task ended")),
        }
    }

    async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ZmqDataChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Command channel backed by a REQ socket task.
#[derive(Debug)]
pub struct ZmqCommandChannel {
    requests: mpsc::Sender<Bytes>,
    replies: mpsc::Receiver<Result<Bytes>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl CommandChannel for ZmqCommandChannel {
    async fn send(&mut self, request: Bytes) -> Result<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| LinkError::transport("command channel send", "socket task ended"))
    }

    async fn recv(&mut self) -> Result<Bytes> {
        match self.replies.recv().await {
            Some(reply) => reply,
            None => Err(LinkError::transport("command channel receive", "socket task ended")),
        }
    }

    async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ZmqCommandChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Connect `socket`, waiting for the peer until cancelled. `None` means cancelled.
async fn connect_socket<S: Socket>(
    socket: &mut S,
    endpoint: &Endpoint,
    cancel: &CancellationToken,
) -> Option<Result<()>> {
    let endpoint = endpoint.to_string();
    tokio::select! {
        _ = cancel.cancelled() => None,
        connected = socket.connect(endpoint.as_str()) => Some(connected.map_err(|e| {
            LinkError::connection_failed(endpoint.as_str(), e.to_string())
        })),
    }
}

async fn data_reader_task(
    endpoint: Endpoint,
    frames: mpsc::Sender<Result<Multipart>>,
    cancel: CancellationToken,
) {
    debug!(%endpoint, "Data reader task started");
    let mut socket = SubSocket::new();

    match connect_socket(&mut socket, &endpoint, &cancel).await {
        None => return,
        Some(Err(e)) => {
            warn!(error = %e, "Data socket connect failed");
            let _ = frames.send(Err(e)).await;
            return;
        }
        Some(Ok(())) => {}
    }
    if let Err(e) = socket.subscribe("").await {
        warn!("Data socket subscribe failed: {}", e);
        let _ = frames.send(Err(LinkError::transport("data channel subscribe", e.to_string()))).await;
        return;
    }
    info!(%endpoint, "Data channel subscribed");

    let mut received = 0u64;
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = socket.recv() => message,
        };

        match message {
            Ok(message) => {
                received += 1;
                trace!(received, parts = message.len(), "Data message");
                if frames.send(Ok(message.into_vec())).await.is_err() {
                    debug!("Data receiver dropped, shutting down");
                    break;
                }
            }
            Err(e) => {
                warn!("Data socket receive failed: {}", e);
                let _ = frames.send(Err(LinkError::transport("data channel receive", e.to_string()))).await;
                break;
            }
        }
    }

    let _ = socket.close().await;
    debug!(received, "Data reader task ended");
}

/// Requests queued before the socket is up wait in `requests` until it is.
async fn command_task(
    endpoint: Endpoint,
    mut requests: mpsc::Receiver<Bytes>,
    replies: mpsc::Sender<Result<Bytes>>,
    cancel: CancellationToken,
) {
    debug!(%endpoint, "Command task started");
    let mut socket = ReqSocket::new();

    match connect_socket(&mut socket, &endpoint, &cancel).await {
        None => return,
        Some(Err(e)) => {
            warn!(error = %e, "Command socket connect failed");
            let _ = replies.send(Err(e)).await;
            return;
        }
        Some(Ok(())) => info!(%endpoint, "Command channel connected"),
    }

    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => break,
            request = requests.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        let sent = tokio::select! {
            _ = cancel.cancelled() => break,
            sent = socket.send(ZmqMessage::from(request)) => sent,
        };
        if let Err(e) = sent {
            warn!("Command socket send failed: {}", e);
            let _ = replies.send(Err(LinkError::transport("command channel send", e.to_string()))).await;
            break;
        }

        let reply = tokio::select! {
            _ = cancel.cancelled() => break,
            reply = socket.recv() => reply,
        };
        let reply = match reply {
            Ok(message) => Ok(message.into_vec().into_iter().next().unwrap_or_default()),
            Err(e) => Err(LinkError::transport("command channel receive", e.to_string())),
        };
        let failed = reply.is_err();
        if replies.send(reply).await.is_err() || failed {
            break;
        }
    }

    let _ = socket.close().await;
    debug!("Command task ended");
}
