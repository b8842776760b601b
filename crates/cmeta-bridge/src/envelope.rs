// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Envelope decoder for inbound connection notifications.
//!
//! Messages are protobuf-encoded in two layers: a [`pb::GenericMessage`]
//! carrying a type discriminant and an opaque `data` field, and a
//! type-specific payload inside `data`.
//!
//! ```text
//! bytes --> GenericMessage{msgtype, data} --> ConnectionNotify      --> Event::Open
//!                                         --> ConnectionCloseNotify --> Event::Close
//!                                         --> (SYNC, no payload)    --> Event::Sync
//!                                         --> (anything else)       --> Event::Unknown
//! ```

use crate::record::{CloseRecord, OpenRecord};
use prost::Message;
use thiserror::Error;

/// Wire messages.
pub mod pb {
    /// Outer envelope.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct GenericMessage {
        #[prost(enumeration = "MsgType", tag = "1")]
        pub msgtype: i32,
        #[prost(bytes = "vec", tag = "2")]
        pub data: Vec<u8>,
    }

    /// Envelope type discriminant.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum MsgType {
        Unspecified = 0,
        ConnectionNotify = 1,
        ConnectionCloseNotify = 2,
        Sync = 3,
    }

    /// Payload of a `CONNECTION_NOTIFY` envelope.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ConnectionNotify {
        #[prost(string, tag = "1")]
        pub hash: String,
        #[prost(int64, tag = "2")]
        pub timestamp_s: i64,
        #[prost(int64, tag = "3")]
        pub timestamp_us: i64,
        #[prost(string, tag = "4")]
        pub src: String,
        #[prost(string, tag = "5")]
        pub dst: String,
        #[prost(uint32, tag = "6")]
        pub protocol: u32,
        #[prost(uint32, tag = "7")]
        pub l4_protocol: u32,
        #[prost(uint32, tag = "8")]
        pub l4_src: u32,
        #[prost(uint32, tag = "9")]
        pub l4_dst: u32,
        #[prost(int64, tag = "10")]
        pub msgtype: i64,
        #[prost(int64, tag = "11")]
        pub seqnum: i64,
    }

    /// Payload of a `CONNECTION_CLOSE_NOTIFY` envelope.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ConnectionCloseNotify {
        #[prost(string, tag = "1")]
        pub hash: String,
        #[prost(int64, tag = "2")]
        pub timestamp_s: i64,
        #[prost(int64, tag = "3")]
        pub timestamp_us: i64,
    }
}

/// Decoding failures. Either layer failing rejects the whole message.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] prost::DecodeError),

    #[error("malformed {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: prost::DecodeError,
    },
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Open(OpenRecord),
    Close(CloseRecord),
    Sync,
    /// Unrecognized discriminant, carried for logging only.
    Unknown(i32),
}

impl Event {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Open(_) => "open",
            Event::Close(_) => "close",
            Event::Sync => "sync",
            Event::Unknown(_) => "unknown",
        }
    }
}

impl From<pb::ConnectionNotify> for OpenRecord {
    fn from(msg: pb::ConnectionNotify) -> Self {
        OpenRecord::new(msg.hash, msg.timestamp_s, msg.timestamp_us)
            .with_protocol(msg.protocol)
            .with_endpoints(msg.src, msg.l4_src, msg.dst, msg.l4_dst)
            .with_msgtype(msg.msgtype)
            .with_seqnum(msg.seqnum)
    }
}

impl From<pb::ConnectionCloseNotify> for CloseRecord {
    fn from(msg: pb::ConnectionCloseNotify) -> Self {
        CloseRecord::new(msg.hash, msg.timestamp_s, msg.timestamp_us)
    }
}

/// Decode one raw message into an [`Event`].
pub fn decode(bytes: &[u8]) -> Result<Event, DecodeError> {
    let envelope = pb::GenericMessage::decode(bytes).map_err(DecodeError::Envelope)?;

    match pb::MsgType::try_from(envelope.msgtype) {
        Ok(pb::MsgType::ConnectionNotify) => {
            let msg = pb::ConnectionNotify::decode(envelope.data.as_slice()).map_err(|source| {
                DecodeError::Payload {
                    kind: "CONNECTION_NOTIFY",
                    source,
                }
            })?;
            Ok(Event::Open(msg.into()))
        }
        Ok(pb::MsgType::ConnectionCloseNotify) => {
            let msg = pb::ConnectionCloseNotify::decode(envelope.data.as_slice()).map_err(
                |source| DecodeError::Payload {
                    kind: "CONNECTION_CLOSE_NOTIFY",
                    source,
                },
            )?;
            Ok(Event::Close(msg.into()))
        }
        Ok(pb::MsgType::Sync) => Ok(Event::Sync),
        Ok(pb::MsgType::Unspecified) | Err(_) => Ok(Event::Unknown(envelope.msgtype)),
    }
}

/// Wrap an encoded payload in an envelope. Used by producers and tests.
pub fn encode(msgtype: pb::MsgType, payload: &impl Message) -> Vec<u8> {
    pb::GenericMessage {
        msgtype: msgtype as i32,
        data: payload.encode_to_vec(),
    }
    .encode_to_vec()
}
