//! Bounded ring buffer of runtime events.
//!
//! Holds the most recent [`TraceEvent`]s in fixed storage; once full, each
//! record overwrites the oldest entry. The runtime owns exactly one buffer
//! and is single-threaded, so sequencing is a plain counter rather than an
//! atomic.

use super::event::{TraceData, TraceEvent, TraceEventKind};
use crate::types::Time;

/// Fixed-capacity event ring with a built-in sequence counter.
#[derive(Debug)]
pub struct TraceBuffer {
    events: Vec<Option<TraceEvent>>,
    head: usize,
    len: usize,
    next_seq: u64,
}

impl TraceBuffer {
    /// Creates a buffer holding at most `capacity` events (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            next_seq: 0,
        }
    }

    /// Maximum number of retained events.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    /// Number of retained events.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True when nothing has been recorded yet.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total events ever recorded, including overwritten ones.
    #[must_use]
    pub const fn recorded(&self) -> u64 {
        self.next_seq
    }

    /// Records an event, stamping it with the next sequence number and `now`.
    ///
    /// Returns the assigned sequence number.
    pub fn record(&mut self, now: Time, kind: TraceEventKind, data: TraceData) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;

        let idx = (self.head + self.len) % self.events.len();
        self.events[idx] = Some(TraceEvent::new(seq, now, kind, data));
        if self.len < self.events.len() {
            self.len += 1;
        } else {
            self.head = (self.head + 1) % self.events.len();
        }
        seq
    }

    /// Iterates retained events oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &TraceEvent> {
        (0..self.len).filter_map(move |i| {
            let idx = (self.head + i) % self.events.len();
            self.events[idx].as_ref()
        })
    }

    /// Clones retained events oldest to newest.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TraceEvent> {
        self.iter().cloned().collect()
    }

    /// The most recently recorded event.
    #[must_use]
    pub fn last(&self) -> Option<&TraceEvent> {
        if self.len == 0 {
            None
        } else {
            let idx = (self.head + self.len - 1) % self.events.len();
            self.events[idx].as_ref()
        }
    }

    /// Discards all retained events. The sequence counter keeps running.
    pub fn clear(&mut self) {
        for slot in &mut self.events {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

impl Default for TraceBuffer {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_n(buf: &mut TraceBuffer, n: usize) {
        for _ in 0..n {
            buf.record(Time::ZERO, TraceEventKind::TimeAdvance, TraceData::None);
        }
    }

    #[test]
    fn sequence_is_dense_and_monotonic() {
        let mut buf = TraceBuffer::new(8);
        let a = buf.record(Time::ZERO, TraceEventKind::TaskSpawned, TraceData::None);
        let b = buf.record(Time::ZERO, TraceEventKind::TaskScheduled, TraceData::None);
        assert_eq!(b, a + 1);
        let seqs: Vec<_> = buf.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    #[test]
    fn overflow_overwrites_oldest() {
        let mut buf = TraceBuffer::new(3);
        record_n(&mut buf, 5);

        let seqs: Vec<_> = buf.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![2, 3, 4]);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.recorded(), 5);
        assert_eq!(buf.last().map(|e| e.seq), Some(4));
    }

    #[test]
    fn clear_keeps_counting() {
        let mut buf = TraceBuffer::new(4);
        record_n(&mut buf, 2);
        buf.clear();
        assert!(buf.is_empty());

        let seq = buf.record(Time::ZERO, TraceEventKind::TimeAdvance, TraceData::None);
        assert_eq!(seq, 2);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut buf = TraceBuffer::new(0);
        assert_eq!(buf.capacity(), 1);
        record_n(&mut buf, 2);
        assert_eq!(buf.len(), 1);
    }
}
