//! Pooled operation contexts.
//!
//! Every reactor submission borrows an operation context from this pool. A
//! context is acquired when a task submits, carried by the reactor while the
//! operation is in flight, and released back to the free set exactly once:
//! either by the awaiting task claiming the result, or by the completion path
//! itself when the awaiter has already walked away.
//!
//! # Design
//!
//! - Contexts live in a generational [`Arena`], so the free and active sets
//!   are disjoint by construction and LIFO slot reuse falls out of the free
//!   list. A recycled slot starts from a freshly built record; nothing leaks
//!   from the previous tenancy.
//! - Serial numbers are a plain monotonic counter, assigned at acquire and
//!   never reused. The generation-stamped [`OpId`] is what the reactor hands
//!   back, so a completion for a slot that was released and re-acquired in
//!   the meantime fails the lookup instead of resuming the wrong owner.
//! - An abandoned context (awaiter interrupted mid-flight) stays in the
//!   active set until its completion arrives, then releases without waking
//!   anyone.

use crate::types::{OpId, TaskId};
use crate::util::Arena;
use core::fmt;
use std::task::Waker;

/// The kinds of reactor operation a context can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Read from a descriptor.
    Read,
    /// Gathered write to a descriptor.
    Writev,
    /// Write to a descriptor.
    Write,
    /// Receive from a socket.
    Recv,
    /// Send to a socket.
    Send,
    /// Reactor-side timeout.
    Timeout,
    /// Readiness poll on a descriptor.
    Poll,
    /// Accept on a listening socket.
    Accept,
    /// Outbound connect.
    Connect,
}

impl OpKind {
    /// Lowercase wire/trace label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Writev => "writev",
            Self::Write => "write",
            Self::Recv => "recv",
            Self::Send => "send",
            Self::Timeout => "timeout",
            Self::Poll => "poll",
            Self::Accept => "accept",
            Self::Connect => "connect",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One pooled context: identity, ownership, and completion state.
#[derive(Debug)]
struct OpRecord {
    serial: u64,
    kind: OpKind,
    owner: TaskId,
    result: Option<i32>,
    abandoned: bool,
    resume: Option<Waker>,
}

impl OpRecord {
    const fn new(serial: u64, kind: OpKind, owner: TaskId) -> Self {
        Self {
            serial,
            kind,
            owner,
            result: None,
            abandoned: false,
            resume: None,
        }
    }
}

/// A context freshly acquired from the pool.
#[derive(Debug, Clone, Copy)]
pub struct AcquiredOp {
    /// Generation-stamped handle for the reactor and the awaiter.
    pub op: OpId,
    /// Monotonic serial number, unique for the runtime's lifetime.
    pub serial: u64,
    /// Whether the context recycled a previously released slot.
    pub reused: bool,
}

/// What a reactor completion did to the pool.
#[derive(Debug)]
pub enum Completion {
    /// The owner is still waiting; wake it and let it claim the result.
    Deliver {
        /// Task that submitted the operation.
        owner: TaskId,
        /// Serial of the completed context.
        serial: u64,
        /// Kind of the completed context.
        kind: OpKind,
        /// Waker registered by the awaiter, if it suspended.
        resume: Option<Waker>,
    },
    /// The awaiter abandoned the context; it went straight back to the free
    /// set and nobody gets woken.
    ReleasedAbandoned {
        /// Task that originally submitted the operation.
        owner: TaskId,
        /// Serial of the released context.
        serial: u64,
        /// Kind of the released context.
        kind: OpKind,
    },
    /// The handle is stale; the slot was already released (and possibly
    /// re-acquired). The completion is dropped.
    Stale,
}

/// What abandoning a context did to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abandon {
    /// The result had already arrived unclaimed; the context released now.
    Released(OpKind),
    /// Still in flight. The context stays active, marked so its eventual
    /// completion releases it silently.
    Deferred(OpKind),
    /// Already gone; nothing to do.
    Gone,
}

/// A claimed completion, produced when the awaiter takes its result and the
/// context returns to the free set.
#[derive(Debug, Clone, Copy)]
pub struct ClaimedOp {
    /// Raw reactor result (non-negative count, or a negated errno).
    pub result: i32,
    /// Serial of the released context.
    pub serial: u64,
    /// Kind of the released context.
    pub kind: OpKind,
}

/// Counts reported by [`OpPool::teardown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownReport {
    /// Active contexts still awaiting a completion, dropped with their owner.
    pub in_flight: usize,
    /// Active contexts already abandoned by their awaiter.
    pub abandoned: usize,
    /// Free-set slots whose storage was released.
    pub recycled: usize,
    /// Total contexts ever acquired (the final serial).
    pub total_acquired: u64,
}

/// The operation context pool.
#[derive(Debug, Default)]
pub struct OpPool {
    ops: Arena<OpRecord>,
    last_serial: u64,
}

impl OpPool {
    /// Creates an empty pool.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ops: Arena::new(),
            last_serial: 0,
        }
    }

    /// Number of active (in-flight or abandoned) contexts.
    #[must_use]
    pub const fn active_count(&self) -> usize {
        self.ops.len()
    }

    /// Number of released contexts available for reuse.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.ops.vacant_count()
    }

    /// The most recently assigned serial; equals the total acquired so far.
    #[must_use]
    pub const fn last_serial(&self) -> u64 {
        self.last_serial
    }

    /// Acquires a context for `owner`, reusing the most recently released
    /// slot when one exists. The record starts clean regardless.
    pub fn acquire(&mut self, kind: OpKind, owner: TaskId) -> AcquiredOp {
        self.last_serial += 1;
        let serial = self.last_serial;
        let reused = self.ops.vacant_count() > 0;
        let index = self.ops.insert(OpRecord::new(serial, kind, owner));
        AcquiredOp {
            op: OpId::from_arena(index),
            serial,
            reused,
        }
    }

    /// Applies a reactor completion to the pool.
    pub fn complete(&mut self, op: OpId, result: i32) -> Completion {
        let Some(record) = self.ops.get_mut(op.arena_index()) else {
            return Completion::Stale;
        };
        if record.abandoned {
            let owner = record.owner;
            let serial = record.serial;
            let kind = record.kind;
            self.ops.remove(op.arena_index());
            return Completion::ReleasedAbandoned { owner, serial, kind };
        }
        record.result = Some(result);
        Completion::Deliver {
            owner: record.owner,
            serial: record.serial,
            kind: record.kind,
            resume: record.resume.take(),
        }
    }

    /// Takes the completed result and releases the context. `None` while the
    /// operation is still in flight.
    pub fn claim(&mut self, op: OpId) -> Option<ClaimedOp> {
        let record = self.ops.get(op.arena_index())?;
        let result = record.result?;
        let serial = record.serial;
        let kind = record.kind;
        self.ops.remove(op.arena_index());
        Some(ClaimedOp { result, serial, kind })
    }

    /// Registers the waker to fire when the completion for `op` arrives.
    pub fn register(&mut self, op: OpId, waker: &Waker) {
        if let Some(record) = self.ops.get_mut(op.arena_index()) {
            record.resume = Some(waker.clone());
        }
    }

    /// Detaches the awaiter from `op`. An unclaimed result releases the
    /// context immediately; an in-flight one is marked and released by its
    /// eventual completion.
    pub fn abandon(&mut self, op: OpId) -> Abandon {
        let Some(record) = self.ops.get_mut(op.arena_index()) else {
            return Abandon::Gone;
        };
        if record.result.is_none() {
            record.abandoned = true;
            record.resume = None;
            return Abandon::Deferred(record.kind);
        }
        let kind = record.kind;
        self.ops.remove(op.arena_index());
        Abandon::Released(kind)
    }

    /// Removes a context outright, returning its kind.
    ///
    /// For submissions the reactor refused: the operation never went in
    /// flight, so there is no completion to wait for and no abandon dance.
    pub fn release(&mut self, op: OpId) -> Option<OpKind> {
        self.ops.remove(op.arena_index()).map(|record| record.kind)
    }

    /// Owner of a live context, for diagnostics.
    #[must_use]
    pub fn owner_of(&self, op: OpId) -> Option<TaskId> {
        self.ops.get(op.arena_index()).map(|r| r.owner)
    }

    /// Whether a live context has been abandoned by its awaiter.
    #[must_use]
    pub fn is_abandoned(&self, op: OpId) -> bool {
        self.ops
            .get(op.arena_index())
            .is_some_and(|r| r.abandoned)
    }

    /// Releases every context, active and free alike, returning storage to
    /// the allocator. All outstanding ids become stale.
    pub fn teardown(&mut self) -> TeardownReport {
        let recycled = self.ops.vacant_count();
        let drained = self.ops.drain_occupied();
        let abandoned = drained.iter().filter(|(_, r)| r.abandoned).count();
        let in_flight = drained.len() - abandoned;
        self.ops.clear();
        TeardownReport {
            in_flight,
            abandoned,
            recycled,
            total_acquired: self.last_serial,
        }
    }
}
