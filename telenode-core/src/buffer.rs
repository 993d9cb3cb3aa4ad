//! Bounded Measurement Buffer
//!
//! ## Overview
//!
//! Measurements wait here between the sampler and the persistence flush. The
//! buffer is append-only from the sampler's side and drained as a whole by
//! the flush, so a plain deque is enough; the interesting part is what
//! happens when storage falls behind.
//!
//! ## Over-Eviction
//!
//! When appending would push the buffer past its capacity, the
//! [`EVICT_BATCH`] oldest measurements are dropped at once rather than one:
//!
//! ```text
//! capacity = 6, evict_batch = 3
//!
//! [a b c d e f]  + g   →  [d e f g]
//!  └─┬─┘
//!  dropped
//! ```
//!
//! Eviction then only runs every few samples instead of on each one, at the
//! price of losing a little more data under sustained pressure. Recent data
//! is worth more than old data for this node, so the oldest entries go.
//!
//! ## Thread Safety
//!
//! This type is not thread-safe. The agent gives it a single owner task and
//! talks to it through messages.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use chrono::Duration;

use crate::constants::buffers::{BUFFER_CAPACITY, EVICT_BATCH};
use crate::measurement::Measurement;

/// In-memory measurement buffer with batch eviction of the oldest entries
#[derive(Debug, Clone)]
pub struct MeasurementBuffer {
    entries: VecDeque<Measurement>,
    capacity: usize,
    evict_batch: usize,
    evicted: u64,
}

impl MeasurementBuffer {
    /// Buffer with the default capacity and eviction batch
    pub fn new() -> Self {
        Self::with_capacity(BUFFER_CAPACITY, EVICT_BATCH)
    }

    /// Buffer with explicit limits
    ///
    /// `evict_batch` is clamped to at least one so that a full buffer always
    /// makes room.
    pub fn with_capacity(capacity: usize, evict_batch: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            evict_batch: evict_batch.max(1),
            evicted: 0,
        }
    }

    /// Append every present measurement in order
    ///
    /// Accepts plain measurements or `Option`s; `None` slots are skipped.
    /// Returns the number of measurements appended.
    pub fn add<I>(&mut self, batch: I) -> usize
    where
        I: IntoIterator,
        I::Item: Into<Option<Measurement>>,
    {
        let mut added = 0;
        for measurement in batch.into_iter().filter_map(Into::into) {
            self.push(measurement);
            added += 1;
        }
        added
    }

    /// Like [`add`](Self::add), shifting each timestamp by `offset` first
    pub fn add_with_offset<I>(&mut self, batch: I, offset: Duration) -> usize
    where
        I: IntoIterator,
        I::Item: Into<Option<Measurement>>,
    {
        self.add(
            batch
                .into_iter()
                .filter_map(Into::into)
                .map(|m: Measurement| m.shifted(offset)),
        )
    }

    /// Hand off the whole content and leave the buffer empty
    pub fn flush(&mut self) -> Vec<Measurement> {
        self.entries.drain(..).collect()
    }

    /// Put back measurements that were flushed but could not be persisted
    ///
    /// They are older than anything appended since, so they go in front. If
    /// the result exceeds capacity the oldest are dropped.
    pub fn restore(&mut self, older: Vec<Measurement>) {
        for measurement in older.into_iter().rev() {
            self.entries.push_front(measurement);
        }
        let excess = self.entries.len().saturating_sub(self.capacity);
        if excess > 0 {
            self.entries.drain(..excess);
            self.note_eviction(excess);
        }
    }

    fn push(&mut self, measurement: Measurement) {
        if self.entries.len() >= self.capacity {
            let n = self.evict_batch.min(self.entries.len());
            self.entries.drain(..n);
            self.note_eviction(n);
        }
        self.entries.push_back(measurement);
    }

    fn note_eviction(&mut self, n: usize) {
        self.evicted += n as u64;
        #[cfg(feature = "log")]
        log::warn!(
            "measurement buffer full: evicted {} oldest ({} total)",
            n,
            self.evicted
        );
    }

    /// Number of buffered measurements
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total measurements dropped since creation
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Measurement> {
        self.entries.iter()
    }
}

impl Default for MeasurementBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    fn sample(i: usize) -> Measurement {
        Measurement::ok(0, i as f32, base() + Duration::seconds(i as i64))
    }

    fn values(buffer: &MeasurementBuffer) -> Vec<f32> {
        buffer.iter().map(|m| m.value()).collect()
    }

    #[test]
    fn skips_empty_slots() {
        let mut buffer = MeasurementBuffer::new();
        let added = buffer.add([Some(sample(0)), None, Some(sample(2))]);
        assert_eq!(added, 2);
        assert_eq!(values(&buffer), vec![0.0, 2.0]);
    }

    #[test]
    fn below_capacity_no_eviction() {
        let mut buffer = MeasurementBuffer::with_capacity(10, 3);
        buffer.add((0..9).map(sample));
        buffer.add([sample(9)]);
        assert_eq!(buffer.len(), 10);
        assert_eq!(buffer.evicted(), 0);
    }

    #[test]
    fn full_buffer_drops_three_oldest() {
        let capacity = 10;
        let mut buffer = MeasurementBuffer::with_capacity(capacity, 3);
        buffer.add((0..capacity).map(sample));

        buffer.add([sample(100)]);

        assert_eq!(buffer.len(), capacity - 2);
        assert_eq!(buffer.evicted(), 3);
        assert_eq!(values(&buffer)[0], 3.0);
        assert_eq!(*values(&buffer).last().unwrap(), 100.0);
    }

    #[test]
    fn default_capacity_is_five_hundred() {
        let mut buffer = MeasurementBuffer::new();
        buffer.add((0..500).map(sample));
        assert_eq!(buffer.len(), 500);

        buffer.add([sample(500)]);
        assert_eq!(buffer.len(), 498);
    }

    #[test]
    fn offset_shifts_each_timestamp() {
        let mut buffer = MeasurementBuffer::new();
        let offset = Duration::minutes(42);
        buffer.add_with_offset(vec![sample(0), sample(1)], offset);

        let stamps: Vec<_> = buffer.iter().map(|m| m.timestamp()).collect();
        assert_eq!(stamps, vec![base() + offset, base() + Duration::seconds(1) + offset]);
    }

    #[test]
    fn flush_empties_buffer() {
        let mut buffer = MeasurementBuffer::new();
        buffer.add([sample(0), sample(1)]);

        let flushed = buffer.flush();
        assert_eq!(flushed.len(), 2);
        assert!(buffer.is_empty());
        assert!(buffer.flush().is_empty());
    }

    #[test]
    fn restore_puts_older_data_in_front() {
        let mut buffer = MeasurementBuffer::new();
        buffer.add([sample(0), sample(1)]);
        let flushed = buffer.flush();
        buffer.add([sample(2)]);

        buffer.restore(flushed);
        assert_eq!(values(&buffer), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn restore_respects_capacity() {
        let mut buffer = MeasurementBuffer::with_capacity(4, 3);
        buffer.add((0..3).map(sample));
        let flushed = buffer.flush();
        buffer.add((3..6).map(sample));

        buffer.restore(flushed);
        assert_eq!(values(&buffer), vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(buffer.evicted(), 2);
    }

    proptest! {
        #[test]
        fn length_never_exceeds_capacity(
            capacity in 3usize..64,
            chunks in proptest::collection::vec(0usize..8, 0..40),
        ) {
            let mut buffer = MeasurementBuffer::with_capacity(capacity, 3);
            let mut next = 0;
            for chunk in chunks {
                buffer.add((next..next + chunk).map(sample));
                next += chunk;
                prop_assert!(buffer.len() <= capacity);
            }
        }
    }
}
