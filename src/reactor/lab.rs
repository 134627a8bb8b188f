//! Scripted reactor with virtual time.
//!
//! The lab reactor never touches the OS. Submitted operations sit in a queue
//! until the test completes them through a [`LabHandle`], or until an auto
//! rule completes them at submit. Time is virtual: it moves only when the
//! driver asks the reactor to wait, so timer-heavy tests run instantly and
//! deterministically.

use super::{OpCompletion, Reactor, ECANCELED};
use crate::error::Result;
use crate::pool::OpKind;
use crate::types::{OpId, Time};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Default)]
struct LabInner {
    now: Time,
    in_flight: VecDeque<(OpId, OpKind)>,
    ready: VecDeque<OpCompletion>,
    scripted: HashMap<OpKind, VecDeque<i32>>,
    auto_result: Option<i32>,
    submitted: u64,
}

impl LabInner {
    /// Moves an in-flight op to the ready queue, if present.
    fn finish(&mut self, op: OpId, result: i32) -> bool {
        let before = self.in_flight.len();
        self.in_flight.retain(|(id, _)| *id != op);
        if self.in_flight.len() == before {
            return false;
        }
        self.ready.push_back(OpCompletion { op, result });
        true
    }
}

/// The reactor half: owned by the runtime as its event source.
#[derive(Debug)]
pub struct LabReactor {
    inner: Rc<RefCell<LabInner>>,
}

/// The scripting half: cloned freely into tests to complete operations and
/// steer the virtual clock.
#[derive(Debug, Clone)]
pub struct LabHandle {
    inner: Rc<RefCell<LabInner>>,
}

impl LabReactor {
    /// Creates a reactor starting at [`Time::ZERO`] and the handle that
    /// scripts it.
    #[must_use]
    pub fn new() -> (Self, LabHandle) {
        let inner = Rc::new(RefCell::new(LabInner::default()));
        (
            Self {
                inner: Rc::clone(&inner),
            },
            LabHandle { inner },
        )
    }
}

impl Reactor for LabReactor {
    fn now(&self) -> Time {
        self.inner.borrow().now
    }

    fn submit(&mut self, op: OpId, kind: OpKind) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.submitted += 1;
        inner.in_flight.push_back((op, kind));
        let scripted = inner
            .scripted
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
            .or(inner.auto_result);
        if let Some(result) = scripted {
            inner.finish(op, result);
        }
        Ok(())
    }

    fn cancel(&mut self, op: OpId) {
        self.inner.borrow_mut().finish(op, -ECANCELED);
    }

    fn drive(&mut self, until: Option<Time>) -> Vec<OpCompletion> {
        let mut inner = self.inner.borrow_mut();
        if !inner.ready.is_empty() {
            return inner.ready.drain(..).collect();
        }
        // Nothing ready: let virtual time catch up to the requested bound.
        if let Some(t) = until {
            if t > inner.now {
                inner.now = t;
            }
        }
        Vec::new()
    }

    fn in_flight(&self) -> usize {
        // Undelivered completions still count: the driver must keep turning
        // until it has drained them.
        let inner = self.inner.borrow();
        inner.in_flight.len() + inner.ready.len()
    }
}

impl LabHandle {
    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> Time {
        self.inner.borrow().now
    }

    /// Operations submitted and not yet completed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.borrow().in_flight.len()
    }

    /// Total operations ever submitted.
    #[must_use]
    pub fn submissions(&self) -> u64 {
        self.inner.borrow().submitted
    }

    /// Completes the oldest in-flight operation with `result`. Returns
    /// `false` when nothing is in flight.
    pub fn complete_next(&self, result: i32) -> bool {
        let mut inner = self.inner.borrow_mut();
        let Some((op, _)) = inner.in_flight.front().copied() else {
            return false;
        };
        inner.finish(op, result)
    }

    /// Completes a specific in-flight operation.
    pub fn complete(&self, op: OpId, result: i32) -> bool {
        self.inner.borrow_mut().finish(op, result)
    }

    /// Completes everything in flight with `result`; returns how many.
    pub fn complete_all(&self, result: i32) -> usize {
        let mut inner = self.inner.borrow_mut();
        let ops: Vec<OpId> = inner.in_flight.iter().map(|(op, _)| *op).collect();
        for op in &ops {
            inner.finish(*op, result);
        }
        ops.len()
    }

    /// Queues results for future submissions of `kind`; each submission of
    /// that kind consumes one and completes immediately.
    pub fn script(&self, kind: OpKind, results: impl IntoIterator<Item = i32>) {
        self.inner
            .borrow_mut()
            .scripted
            .entry(kind)
            .or_default()
            .extend(results);
    }

    /// Completes every future submission at submit time with `result`,
    /// unless a per-kind script matches first.
    pub fn auto_complete(&self, result: i32) {
        self.inner.borrow_mut().auto_result = Some(result);
    }

    /// Moves the virtual clock forward by hand.
    pub fn advance(&self, by: Duration) {
        let mut inner = self.inner.borrow_mut();
        inner.now = inner.now.saturating_add(by);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(slot: u32) -> OpId {
        OpId::new_for_test(slot, 0)
    }

    #[test]
    fn scripted_completions_drain_in_order() {
        let (mut reactor, handle) = LabReactor::new();
        reactor.submit(op(0), OpKind::Read).unwrap();
        reactor.submit(op(1), OpKind::Read).unwrap();
        assert_eq!(handle.pending(), 2);

        assert!(handle.complete_next(10));
        assert!(handle.complete(op(1), 20));
        let done = reactor.drive(None);
        assert_eq!(done.len(), 2);
        assert_eq!((done[0].op, done[0].result), (op(0), 10));
        assert_eq!((done[1].op, done[1].result), (op(1), 20));
        assert_eq!(handle.pending(), 0);
    }

    #[test]
    fn drive_advances_virtual_time_when_idle() {
        let (mut reactor, handle) = LabReactor::new();
        let target = Time::from_millis(50);
        assert!(reactor.drive(Some(target)).is_empty());
        assert_eq!(handle.now(), target);

        // Time never moves backwards.
        assert!(reactor.drive(Some(Time::from_millis(10))).is_empty());
        assert_eq!(handle.now(), target);
    }

    #[test]
    fn cancel_completes_with_ecanceled() {
        let (mut reactor, _handle) = LabReactor::new();
        reactor.submit(op(3), OpKind::Recv).unwrap();
        reactor.cancel(op(3));
        let done = reactor.drive(None);
        assert_eq!(done, vec![OpCompletion { op: op(3), result: -ECANCELED }]);
    }

    #[test]
    fn per_kind_scripts_beat_the_auto_rule() {
        let (mut reactor, handle) = LabReactor::new();
        handle.auto_complete(0);
        handle.script(OpKind::Read, [7]);

        reactor.submit(op(0), OpKind::Read).unwrap();
        reactor.submit(op(1), OpKind::Read).unwrap();
        reactor.submit(op(2), OpKind::Write).unwrap();

        let done = reactor.drive(None);
        let results: Vec<i32> = done.iter().map(|c| c.result).collect();
        assert_eq!(results, vec![7, 0, 0]);
    }
}
