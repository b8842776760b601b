// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ingestion loop.
//!
//! One message at a time, fully synchronous:
//!
//! ```text
//! WAIT_MESSAGE -> DECODE -> ROUTE -> EVALUATE_FLUSH -> REPLY -> WAIT_MESSAGE
//! ```
//!
//! Publishing happens inline, so a slow backend delays the acknowledgement
//! and with it the producer. The acknowledgement is sent whatever the
//! decode or publish outcome; only transport failures end the loop.

use crate::batch::{BatchAccumulator, FlushReason};
use crate::envelope::{self, Event};
use crate::publisher::Publisher;
use crate::record::{CloseRecord, OpenRecord};
use crate::transport::{ReplyChannel, TransportError, ACK};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// How long a single receive waits before re-checking the stop flag.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Errors that end the ingestion loop.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// What processing one message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// An open record was buffered.
    Open,
    /// A close record was buffered.
    Close,
    /// A sync marker forced flush evaluation.
    Sync,
    /// The message type is not handled; nothing changed.
    Unknown,
    /// The message could not be decoded; nothing changed.
    Rejected,
}

/// Loop statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    /// Messages received from the transport.
    pub messages_received: u64,
    /// Open records appended to the buffer.
    pub opens_buffered: u64,
    /// Close records appended to the buffer.
    pub closes_buffered: u64,
    /// Sync markers seen.
    pub sync_markers: u64,
    /// Messages with an unrecognized type.
    pub unknown_messages: u64,
    /// Messages that failed to decode.
    pub decode_errors: u64,
    /// Successful bulk open requests.
    pub open_batches_published: u64,
    /// Open records delivered to the backend.
    pub opens_published: u64,
    /// Close records delivered to the backend.
    pub closes_published: u64,
    /// Records lost to failed publish calls.
    pub records_dropped: u64,
    /// Failed publish calls.
    pub publish_errors: u64,
}

/// Handle to request the loop to stop.
#[derive(Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    /// Request the loop to stop after the current message.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Check if the loop has not been asked to stop.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

/// Receives notifications, batches them, and hands batches to a
/// [`Publisher`].
pub struct IngestLoop<C: ReplyChannel, P: Publisher> {
    channel: C,
    publisher: P,
    accumulator: BatchAccumulator,
    stats: IngestStats,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl<C: ReplyChannel, P: Publisher> IngestLoop<C, P> {
    pub fn new(channel: C, publisher: P) -> Self {
        Self {
            channel,
            publisher,
            accumulator: BatchAccumulator::new(),
            stats: IngestStats::default(),
            running: Arc::new(AtomicBool::new(true)),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set how often a blocked receive re-checks the stop flag.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: self.running.clone(),
        }
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    pub fn accumulator(&self) -> &BatchAccumulator {
        &self.accumulator
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Run until stopped or until the transport fails. Buffered records
    /// are flushed before returning in both cases.
    pub fn run(&mut self) -> Result<(), IngestError> {
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Ingestion loop started"
        );

        let result = loop {
            if !self.running.load(Ordering::Relaxed) {
                break Ok(());
            }
            if let Err(e) = self.step() {
                break Err(e);
            }
        };

        self.flush_remaining();

        let stats = &self.stats;
        tracing::info!(
            messages_received = stats.messages_received,
            opens_published = stats.opens_published,
            closes_published = stats.closes_published,
            records_dropped = stats.records_dropped,
            decode_errors = stats.decode_errors,
            "Ingestion loop stopped"
        );

        result
    }

    /// Wait for one message, process it, and acknowledge it.
    ///
    /// Returns `Ok(false)` when the poll interval elapsed without a message.
    pub fn step(&mut self) -> Result<bool, IngestError> {
        let Some(bytes) = self.channel.recv(self.poll_interval)? else {
            return Ok(false);
        };

        self.process(&bytes);
        self.channel.reply(ACK)?;
        Ok(true)
    }

    /// Decode, route, and evaluate flushes for one raw message.
    pub fn process(&mut self, bytes: &[u8]) -> Outcome {
        self.stats.messages_received += 1;

        let event = match envelope::decode(bytes) {
            Ok(event) => event,
            Err(e) => {
                self.stats.decode_errors += 1;
                tracing::warn!(error = %e, len = bytes.len(), "Dropping undecodable message");
                return Outcome::Rejected;
            }
        };

        let mut sync_signaled = false;
        let outcome = match event {
            Event::Open(record) => {
                tracing::debug!(
                    hash = %record.hash,
                    seqnum = record.seqnum,
                    "Connection@{:.6} (proto=0x{:02x}, {}:{} -> {}:{})",
                    record.timestamp(),
                    record.protocol,
                    record.src,
                    record.l4_src,
                    record.dst,
                    record.l4_dst
                );
                self.accumulator.append_open(record);
                self.stats.opens_buffered += 1;
                Outcome::Open
            }
            Event::Close(record) => {
                tracing::debug!(
                    hash = %record.hash,
                    "Connection closed@{:.6}",
                    record.end_timestamp()
                );
                self.accumulator.append_close(record);
                self.stats.closes_buffered += 1;
                Outcome::Close
            }
            Event::Sync => {
                sync_signaled = true;
                self.stats.sync_markers += 1;
                Outcome::Sync
            }
            Event::Unknown(msgtype) => {
                self.stats.unknown_messages += 1;
                tracing::debug!(msgtype, "Ignoring message of unknown type");
                return Outcome::Unknown;
            }
        };

        self.evaluate_flush(sync_signaled);
        outcome
    }

    /// Flush whatever is still buffered.
    pub fn flush_remaining(&mut self) {
        let (opens, closes) = self.accumulator.take_all();
        if !opens.is_empty() {
            self.publish_opens(FlushReason::Shutdown, opens);
        }
        if !closes.is_empty() {
            self.publish_closes(FlushReason::Shutdown, closes);
        }
    }

    fn evaluate_flush(&mut self, sync_signaled: bool) {
        if let Some((reason, batch)) = self.accumulator.drain_opens_if_ready(sync_signaled) {
            self.publish_opens(reason, batch);
        }
        if let Some((reason, batch)) = self.accumulator.drain_closes_if_ready(sync_signaled) {
            self.publish_closes(reason, batch);
        }
    }

    fn publish_opens(&mut self, reason: FlushReason, batch: Vec<OpenRecord>) {
        let count = batch.len() as u64;
        match self.publisher.publish_opens(&batch) {
            Ok(()) => {
                self.stats.open_batches_published += 1;
                self.stats.opens_published += count;
                tracing::info!(records = count, %reason, "Published open batch");
            }
            Err(e) => {
                self.stats.publish_errors += 1;
                self.stats.records_dropped += count;
                tracing::error!(error = %e, records = count, %reason, "Open batch lost");
            }
        }
    }

    fn publish_closes(&mut self, reason: FlushReason, batch: Vec<CloseRecord>) {
        let total = batch.len();
        let mut published = 0usize;

        for record in &batch {
            match self.publisher.publish_close(record) {
                Ok(()) => {
                    published += 1;
                    self.stats.closes_published += 1;
                }
                Err(e) => {
                    self.stats.publish_errors += 1;
                    self.stats.records_dropped += 1;
                    tracing::error!(error = %e, hash = %record.hash, "Close record lost");
                }
            }
        }

        tracing::info!(records = published, failed = total - published, %reason, "Published close batch");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::PublishError;

    struct NoChannel;

    impl ReplyChannel for NoChannel {
        fn recv(&mut self, _poll: Duration) -> Result<Option<Vec<u8>>, TransportError> {
            Ok(None)
        }

        fn reply(&mut self, _payload: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingPublisher {
        calls: usize,
    }

    impl Publisher for CountingPublisher {
        fn publish_opens(&mut self, _records: &[OpenRecord]) -> Result<(), PublishError> {
            self.calls += 1;
            Ok(())
        }

        fn publish_close(&mut self, _record: &CloseRecord) -> Result<(), PublishError> {
            self.calls += 1;
            Ok(())
        }
    }

    #[test]
    fn test_process_rejects_garbage() {
        let mut ingest = IngestLoop::new(NoChannel, CountingPublisher::default());

        assert_eq!(ingest.process(&[0x08, 0xff]), Outcome::Rejected);
        assert_eq!(ingest.stats().decode_errors, 1);
        assert_eq!(ingest.stats().messages_received, 1);
        assert!(ingest.accumulator().opens().is_empty());
        assert_eq!(ingest.publisher().calls, 0);
    }

    #[test]
    fn test_step_returns_false_on_idle_poll() {
        let mut ingest = IngestLoop::new(NoChannel, CountingPublisher::default())
            .with_poll_interval(Duration::from_millis(1));

        assert!(!ingest.step().expect("idle step"));
        assert_eq!(ingest.stats().messages_received, 0);
    }

    #[test]
    fn test_stop_handle_ends_run() {
        let mut ingest = IngestLoop::new(NoChannel, CountingPublisher::default());
        let handle = ingest.stop_handle();
        assert!(handle.is_running());

        handle.stop();
        ingest.run().expect("run returns after stop");
        assert!(!handle.is_running());
        assert_eq!(ingest.publisher().calls, 0);
    }
}
