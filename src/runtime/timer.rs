//! Timer queue.
//!
//! A binary heap of deadlines with lazy cancellation: cancelling just forgets
//! the id, and the dead entry is discarded whenever it surfaces at the top.
//! Ties on the deadline fire in arming order, since ids are monotonic and
//! break the comparison.

use crate::types::{TaskId, Time, TimerId};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct TimerEntry {
    deadline: Time,
    id: TimerId,
    task: TaskId,
}

#[derive(Debug, Default)]
pub(crate) struct TimerHeap {
    heap: BinaryHeap<Reverse<TimerEntry>>,
    pending: HashSet<TimerId>,
    last_id: u64,
}

impl TimerHeap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Live (non-cancelled, non-fired) timers.
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Arms a timer that wakes `task` at `deadline`.
    pub(crate) fn insert(&mut self, deadline: Time, task: TaskId) -> TimerId {
        self.last_id += 1;
        let id = TimerId(self.last_id);
        self.heap.push(Reverse(TimerEntry { deadline, id, task }));
        self.pending.insert(id);
        id
    }

    /// Disarms a timer. Returns `false` if it already fired or was already
    /// cancelled. The heap entry is dropped lazily.
    pub(crate) fn cancel(&mut self, id: TimerId) -> bool {
        self.pending.remove(&id)
    }

    /// Pops one due timer, skipping cancelled entries. Call until `None` to
    /// fire everything due at `now`.
    pub(crate) fn pop_due(&mut self, now: Time) -> Option<(TimerId, TaskId, Time)> {
        loop {
            let (id, deadline) = {
                let Reverse(top) = self.heap.peek()?;
                (top.id, top.deadline)
            };
            if !self.pending.contains(&id) {
                self.heap.pop();
                continue;
            }
            if deadline > now {
                return None;
            }
            let Some(Reverse(entry)) = self.heap.pop() else {
                unreachable!("peeked entry vanished");
            };
            self.pending.remove(&entry.id);
            return Some((entry.id, entry.task, entry.deadline));
        }
    }

    /// Deadline of the next live timer, discarding cancelled garbage on the
    /// way.
    pub(crate) fn next_deadline(&mut self) -> Option<Time> {
        loop {
            let (id, deadline) = {
                let Reverse(top) = self.heap.peek()?;
                (top.id, top.deadline)
            };
            if self.pending.contains(&id) {
                return Some(deadline);
            }
            self.heap.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(slot: u32) -> TaskId {
        TaskId::new_for_test(slot, 0)
    }

    #[test]
    fn due_timers_fire_in_deadline_then_arming_order() {
        let mut timers = TimerHeap::new();
        let late = timers.insert(Time::from_millis(20), task(1));
        let early_a = timers.insert(Time::from_millis(5), task(2));
        let early_b = timers.insert(Time::from_millis(5), task(3));
        assert_eq!(timers.len(), 3);

        assert_eq!(timers.next_deadline(), Some(Time::from_millis(5)));
        assert!(timers.pop_due(Time::from_millis(1)).is_none());

        let first = timers.pop_due(Time::from_millis(30)).unwrap();
        let second = timers.pop_due(Time::from_millis(30)).unwrap();
        let third = timers.pop_due(Time::from_millis(30)).unwrap();
        assert_eq!(first.0, early_a);
        assert_eq!(second.0, early_b);
        assert_eq!(third.0, late);
        assert!(timers.pop_due(Time::from_millis(30)).is_none());
        assert!(timers.is_empty());
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let mut timers = TimerHeap::new();
        let keep = timers.insert(Time::from_millis(10), task(1));
        let stale = timers.insert(Time::from_millis(5), task(2));

        assert!(timers.cancel(stale));
        assert!(!timers.cancel(stale), "second cancel is a no-op");
        assert_eq!(timers.len(), 1);

        // The cancelled entry at the top must not mask the live one.
        assert_eq!(timers.next_deadline(), Some(Time::from_millis(10)));
        let fired = timers.pop_due(Time::from_millis(10)).unwrap();
        assert_eq!(fired.0, keep);
        assert_eq!(fired.1, task(1));
    }

    #[test]
    fn cancel_after_fire_reports_false() {
        let mut timers = TimerHeap::new();
        let id = timers.insert(Time::from_millis(1), task(1));
        assert!(timers.pop_due(Time::from_millis(1)).is_some());
        assert!(!timers.cancel(id));
    }
}
