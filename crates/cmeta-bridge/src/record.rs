// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection records as they are sent to the cmeta API.
//!
//! Field names match the JSON keys the backend expects, so the structs
//! serialize directly into request bodies.

use serde::{Serialize, Serializer};

/// Lifecycle state of a connection record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Connection has been observed opening.
    Open = 1,
    /// Connection has been observed closing.
    Closed = 2,
}

impl Serialize for ConnectionState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// A newly opened connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenRecord {
    /// Content-derived connection identifier.
    #[serde(rename = "hashstr")]
    pub hash: String,
    /// Open time, whole seconds.
    pub timestamp_s: i64,
    /// Open time, microsecond fraction.
    pub timestamp_us: i64,
    /// L3 protocol number.
    pub protocol: u32,
    /// L3 source address.
    pub src: String,
    /// L3 destination address.
    pub dst: String,
    /// Transport protocol, mirrors `protocol`.
    pub l4_protocol: u32,
    /// L4 source port.
    pub l4_src: u32,
    /// L4 destination port.
    pub l4_dst: u32,
    /// Producer-side connection classification.
    pub msgtype: i64,
    /// Monotonic sequence number assigned by the producer.
    pub seqnum: i64,
    /// Always [`ConnectionState::Open`].
    pub state: ConnectionState,
}

impl OpenRecord {
    /// Create an open record with empty endpoints.
    pub fn new(hash: impl Into<String>, timestamp_s: i64, timestamp_us: i64) -> Self {
        Self {
            hash: hash.into(),
            timestamp_s,
            timestamp_us,
            protocol: 0,
            src: String::new(),
            dst: String::new(),
            l4_protocol: 0,
            l4_src: 0,
            l4_dst: 0,
            msgtype: 0,
            seqnum: 0,
            state: ConnectionState::Open,
        }
    }

    /// Set the transport protocol.
    pub fn with_protocol(mut self, protocol: u32) -> Self {
        self.protocol = protocol;
        self.l4_protocol = protocol;
        self
    }

    /// Set both endpoints.
    pub fn with_endpoints(
        mut self,
        src: impl Into<String>,
        l4_src: u32,
        dst: impl Into<String>,
        l4_dst: u32,
    ) -> Self {
        self.src = src.into();
        self.l4_src = l4_src;
        self.dst = dst.into();
        self.l4_dst = l4_dst;
        self
    }

    /// Set the sequence number.
    pub fn with_seqnum(mut self, seqnum: i64) -> Self {
        self.seqnum = seqnum;
        self
    }

    /// Set the producer-side classification.
    pub fn with_msgtype(mut self, msgtype: i64) -> Self {
        self.msgtype = msgtype;
        self
    }

    /// Open time as fractional seconds.
    pub fn timestamp(&self) -> f64 {
        combine_timestamp(self.timestamp_s, self.timestamp_us)
    }
}

/// The end of a previously opened connection, matched by hash on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseRecord {
    #[serde(rename = "hashstr")]
    pub hash: String,
    /// Always [`ConnectionState::Closed`].
    pub state: ConnectionState,
    #[serde(rename = "end_timestamp_s")]
    pub timestamp_s: i64,
    #[serde(rename = "end_timestamp_us")]
    pub timestamp_us: i64,
}

impl CloseRecord {
    /// Create a close record.
    pub fn new(hash: impl Into<String>, timestamp_s: i64, timestamp_us: i64) -> Self {
        Self {
            hash: hash.into(),
            state: ConnectionState::Closed,
            timestamp_s,
            timestamp_us,
        }
    }

    /// Close time as fractional seconds.
    pub fn end_timestamp(&self) -> f64 {
        combine_timestamp(self.timestamp_s, self.timestamp_us)
    }
}

fn combine_timestamp(seconds: i64, micros: i64) -> f64 {
    seconds as f64 + micros as f64 / 1_000_000.0
}
