// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Batching buffers for connection records.
//!
//! Open and close records accumulate in two independent buffers. A buffer
//! is drained either when it holds [`BATCH_THRESHOLD`] records or when a
//! sync marker arrives while it is non-empty. The size check always runs
//! before the sync check.

use crate::record::{CloseRecord, OpenRecord};
use std::fmt;

/// Number of buffered records that forces a flush.
pub const BATCH_THRESHOLD: usize = 100;

/// Why a batch left its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// The buffer reached [`BATCH_THRESHOLD`].
    Size,
    /// A sync marker arrived.
    Sync,
    /// The ingestion loop is stopping.
    Shutdown,
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushReason::Size => write!(f, "size"),
            FlushReason::Sync => write!(f, "sync"),
            FlushReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// An append-only, insertion-ordered buffer of records.
#[derive(Debug)]
pub struct BatchBuffer<T> {
    items: Vec<T>,
    threshold: usize,
}

impl<T> BatchBuffer<T> {
    /// Create a buffer that reports full at `threshold` items.
    pub fn new(threshold: usize) -> Self {
        Self {
            items: Vec::with_capacity(threshold),
            threshold,
        }
    }

    /// Append an item. No deduplication is performed.
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// True once the buffer holds at least `threshold` items.
    pub fn ready_to_flush_size(&self) -> bool {
        self.items.len() >= self.threshold
    }

    /// True when a sync marker was seen and there is something to flush.
    pub fn ready_to_flush_sync(&self, sync_signaled: bool) -> bool {
        sync_signaled && !self.items.is_empty()
    }

    /// Return the current contents and leave the buffer empty.
    pub fn take_and_clear(&mut self) -> Vec<T> {
        std::mem::replace(&mut self.items, Vec::with_capacity(self.threshold))
    }

    /// Drain the buffer if either predicate holds, size first.
    pub fn drain_if_ready(&mut self, sync_signaled: bool) -> Option<(FlushReason, Vec<T>)> {
        if self.ready_to_flush_size() {
            Some((FlushReason::Size, self.take_and_clear()))
        } else if self.ready_to_flush_sync(sync_signaled) {
            Some((FlushReason::Sync, self.take_and_clear()))
        } else {
            None
        }
    }

    /// Buffered items in arrival order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Get the current number of buffered items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// The two record buffers owned by the ingestion loop.
#[derive(Debug)]
pub struct BatchAccumulator {
    opens: BatchBuffer<OpenRecord>,
    closes: BatchBuffer<CloseRecord>,
}

impl Default for BatchAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchAccumulator {
    pub fn new() -> Self {
        Self::with_threshold(BATCH_THRESHOLD)
    }

    /// Create an accumulator with a non-standard threshold.
    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            opens: BatchBuffer::new(threshold),
            closes: BatchBuffer::new(threshold),
        }
    }

    pub fn append_open(&mut self, record: OpenRecord) {
        self.opens.push(record);
    }

    pub fn append_close(&mut self, record: CloseRecord) {
        self.closes.push(record);
    }

    /// Drain the open buffer if it is due.
    pub fn drain_opens_if_ready(
        &mut self,
        sync_signaled: bool,
    ) -> Option<(FlushReason, Vec<OpenRecord>)> {
        self.opens.drain_if_ready(sync_signaled)
    }

    /// Drain the close buffer if it is due.
    pub fn drain_closes_if_ready(
        &mut self,
        sync_signaled: bool,
    ) -> Option<(FlushReason, Vec<CloseRecord>)> {
        self.closes.drain_if_ready(sync_signaled)
    }

    /// Drain both buffers unconditionally.
    pub fn take_all(&mut self) -> (Vec<OpenRecord>, Vec<CloseRecord>) {
        (self.opens.take_and_clear(), self.closes.take_and_clear())
    }

    pub fn opens(&self) -> &BatchBuffer<OpenRecord> {
        &self.opens
    }

    pub fn closes(&self) -> &BatchBuffer<CloseRecord> {
        &self.closes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(i: usize) -> OpenRecord {
        OpenRecord::new(format!("h{}", i), i as i64, 0).with_seqnum(i as i64)
    }

    #[test]
    fn test_buffer_not_ready_below_threshold() {
        let mut buf = BatchBuffer::new(3);

        buf.push(1);
        buf.push(2);

        assert_eq!(buf.len(), 2);
        assert!(!buf.ready_to_flush_size());
        assert!(buf.drain_if_ready(false).is_none());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_buffer_drains_at_threshold_in_order() {
        let mut buf = BatchBuffer::new(3);
        buf.push("a");
        buf.push("b");
        buf.push("c");

        let (reason, batch) = buf.drain_if_ready(false).expect("full buffer drains");
        assert_eq!(reason, FlushReason::Size);
        assert_eq!(batch, vec!["a", "b", "c"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_buffer_sync_requires_items() {
        let mut buf: BatchBuffer<u32> = BatchBuffer::new(3);
        assert!(!buf.ready_to_flush_sync(true));
        assert!(buf.drain_if_ready(true).is_none());

        buf.push(7);
        assert!(!buf.ready_to_flush_sync(false));
        assert!(buf.ready_to_flush_sync(true));

        let (reason, batch) = buf.drain_if_ready(true).expect("sync drains");
        assert_eq!(reason, FlushReason::Sync);
        assert_eq!(batch, vec![7]);
    }

    #[test]
    fn test_size_wins_over_sync() {
        let mut buf = BatchBuffer::new(2);
        buf.push(1);
        buf.push(2);

        let (reason, _) = buf.drain_if_ready(true).expect("drains");
        assert_eq!(reason, FlushReason::Size);
    }

    #[test]
    fn test_accumulator_keeps_duplicates() {
        let mut acc = BatchAccumulator::new();
        acc.append_open(open(1));
        acc.append_open(open(1));

        assert_eq!(acc.opens().len(), 2);
        assert_eq!(acc.opens().items()[0], acc.opens().items()[1]);
    }

    #[test]
    fn test_accumulator_buffers_are_independent() {
        let mut acc = BatchAccumulator::new();
        for i in 0..BATCH_THRESHOLD {
            acc.append_open(open(i));
        }
        acc.append_close(CloseRecord::new("c1", 1, 0));

        let (reason, batch) = acc.drain_opens_if_ready(false).expect("opens full");
        assert_eq!(reason, FlushReason::Size);
        assert_eq!(batch.len(), BATCH_THRESHOLD);
        assert_eq!(batch[0].hash, "h0");
        assert_eq!(batch[BATCH_THRESHOLD - 1].hash, "h99");

        assert!(acc.drain_closes_if_ready(false).is_none());
        assert_eq!(acc.closes().len(), 1);
        assert!(acc.opens().is_empty());
    }

    #[test]
    fn test_accumulator_take_all() {
        let mut acc = BatchAccumulator::with_threshold(10);
        acc.append_open(open(1));
        acc.append_close(CloseRecord::new("c1", 1, 0));
        acc.append_close(CloseRecord::new("c2", 2, 0));

        let (opens, closes) = acc.take_all();
        assert_eq!(opens.len(), 1);
        assert_eq!(closes.len(), 2);
        assert!(acc.opens().is_empty());
        assert!(acc.closes().is_empty());
    }
}
