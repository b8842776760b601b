// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound request/reply transport.
//!
//! The producer sends one notification and waits for a reply before
//! sending the next. [`ReplyChannel`] exposes that contract as two blocking
//! calls; [`ZmqReplySocket`] implements it on a bound ZeroMQ REP socket.

use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Runtime;
use zeromq::{RepSocket, Socket, SocketRecv, SocketSend, ZmqError, ZmqMessage};

/// Acknowledgement sent after every processed message.
pub const ACK: &[u8] = &[0x00];

/// Default bind endpoint.
pub const DEFAULT_ENDPOINT: &str = "tcp://0.0.0.0:5555";

/// Transport failures. All of them are fatal to the ingestion loop.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to start transport runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: ZmqError,
    },

    #[error("receive failed: {0}")]
    Receive(#[source] ZmqError),

    #[error("reply failed: {0}")]
    Reply(#[source] ZmqError),

    #[error("channel closed")]
    Closed,
}

/// Strict request/reply channel: every received message must be answered
/// with exactly one [`reply`](ReplyChannel::reply) before the next
/// [`recv`](ReplyChannel::recv).
pub trait ReplyChannel {
    /// Wait up to `poll` for the next message. `Ok(None)` means the wait
    /// timed out and nothing was received.
    fn recv(&mut self, poll: Duration) -> Result<Option<Vec<u8>>, TransportError>;

    /// Answer the last received message.
    fn reply(&mut self, payload: &[u8]) -> Result<(), TransportError>;
}

/// ZeroMQ REP socket driven from blocking code.
pub struct ZmqReplySocket {
    socket: RepSocket,
    endpoint: String,
    runtime: Runtime,
}

impl ZmqReplySocket {
    /// Bind a REP socket on `endpoint` (e.g. `tcp://0.0.0.0:5555`).
    ///
    /// The runtime keeps one worker thread so peer connections are still
    /// accepted and read while the caller is busy publishing.
    pub fn bind(endpoint: &str) -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("cmeta-zmq")
            .enable_all()
            .build()
            .map_err(TransportError::Runtime)?;

        let (socket, bound) = runtime
            .block_on(async {
                let mut socket = RepSocket::new();
                let bound = socket.bind(endpoint).await?;
                Ok::<_, ZmqError>((socket, bound))
            })
            .map_err(|source| TransportError::Bind {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let endpoint = bound.to_string();
        tracing::info!(%endpoint, "Reply socket bound");

        Ok(Self {
            socket,
            endpoint,
            runtime,
        })
    }

    /// The bound endpoint, with a wildcard port resolved.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ReplyChannel for ZmqReplySocket {
    fn recv(&mut self, poll: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let socket = &mut self.socket;
        let received = self
            .runtime
            .block_on(async { tokio::time::timeout(poll, socket.recv()).await });

        match received {
            Err(_elapsed) => Ok(None),
            Ok(Ok(message)) => Ok(Some(flatten(&message))),
            Ok(Err(e)) => Err(TransportError::Receive(e)),
        }
    }

    fn reply(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let message = ZmqMessage::from(payload.to_vec());
        let socket = &mut self.socket;
        self.runtime
            .block_on(socket.send(message))
            .map_err(TransportError::Reply)
    }
}

/// Join all frames of a (possibly multipart) message.
fn flatten(message: &ZmqMessage) -> Vec<u8> {
    let mut payload = Vec::new();
    for frame in message.iter() {
        payload.extend_from_slice(frame);
    }
    payload
}
