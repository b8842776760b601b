// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! cmeta Bridge
//!
//! Receives connection-tracking notifications on a ZeroMQ REP socket and
//! forwards them in batches to the cmeta HTTP API.
//!
//! This crate provides:
//! - Protobuf envelope decoding for open, close, and sync notifications
//! - Two independent record buffers flushed by size or on sync markers
//! - An authenticated blocking HTTP publisher (bulk POST for opens,
//!   per-hash PUT for closes)
//! - A single-worker ingestion loop with graceful shutdown
//!
//! # Overview
//!
//! ```text
//! REP socket --> decode --> BatchAccumulator --> Publisher --> HTTP backend
//!      ^                                                          |
//!      +------------------------- ACK ----------------------------+
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use cmeta_bridge::{BackendEndpoint, Credentials, HttpPublisher, IngestLoop, ZmqReplySocket};
//!
//! let publisher = HttpPublisher::login(
//!     BackendEndpoint::new("127.0.0.1", 8082),
//!     &Credentials::new("admin", "admin"),
//!     None,
//! )?;
//! let socket = ZmqReplySocket::bind("tcp://0.0.0.0:5555")?;
//!
//! let mut ingest = IngestLoop::new(socket, publisher);
//! ingest.run()?;
//! ```

pub mod batch;
pub mod config;
pub mod envelope;
pub mod ingest;
pub mod publisher;
pub mod record;
pub mod transport;

pub use batch::{BatchAccumulator, BatchBuffer, FlushReason, BATCH_THRESHOLD};
pub use config::{BackendConfig, BridgeConfig, ConfigError, TransportConfig};
pub use envelope::{decode, DecodeError, Event};
pub use ingest::{IngestError, IngestLoop, IngestStats, Outcome, StopHandle};
pub use publisher::{
    AuthError, AuthToken, BackendEndpoint, Credentials, HttpPublisher, PublishError, Publisher,
};
pub use record::{CloseRecord, ConnectionState, OpenRecord};
pub use transport::{ReplyChannel, TransportError, ZmqReplySocket, ACK};
