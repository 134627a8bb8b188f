//! Task records.
//!
//! A record is the runtime's view of one task: its lifecycle state, the
//! type-erased body future, the single pending-interrupt slot, and the
//! mailbox. Typed state (the eventual outcome, the join waker) lives in the
//! join cell shared between the body wrapper and the task's handle, so the
//! record never needs to know the task's output type.

use crate::error::Error;
use crate::mailbox::Mailbox;
use crate::trace::SpawnTrace;
use crate::types::{Interrupt, ScopeId, SignalKind, TaskId, Time};
use core::fmt;
use std::future::Future;
use std::pin::Pin;

/// Type-erased task body, resolved to an exit report.
pub(crate) type TaskFuture = Pin<Box<dyn Future<Output = TaskExit>>>;

/// Lifecycle states of a task record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskState {
    /// Spawned, never yet polled.
    Created,
    /// On the run queue (or being polled right now).
    Runnable,
    /// Parked at a suspension point.
    Suspended,
    /// Finished: ok, failed, or panicked.
    Done,
    /// Finished by unwinding on a cancellation.
    Cancelled,
}

impl TaskState {
    pub(crate) const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }

    pub(crate) const fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Runnable => "runnable",
            Self::Suspended => "suspended",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }
}

/// How a body finished, stripped of its typed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExitClass {
    Ok,
    Err,
    Cancelled,
    Panicked,
}

impl ExitClass {
    pub(crate) const fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Err => "err",
            Self::Cancelled => "cancelled",
            Self::Panicked => "panicked",
        }
    }
}

/// Exit report produced by the body wrapper.
///
/// `escalate` is populated only when the task failed and no live handle will
/// ever observe the failure; the executor re-raises it in the spawner.
#[derive(Debug)]
pub(crate) struct TaskExit {
    pub(crate) class: ExitClass,
    pub(crate) escalate: Option<Error>,
}

impl TaskExit {
    pub(crate) const fn new(class: ExitClass) -> Self {
        Self {
            class,
            escalate: None,
        }
    }

    pub(crate) const fn escalating(class: ExitClass, error: Error) -> Self {
        Self {
            class,
            escalate: Some(error),
        }
    }
}

/// What [`TaskRecord::inject`] did with an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InjectOutcome {
    /// The empty slot took it.
    Stored,
    /// It displaced a weaker pending interrupt.
    Strengthened,
    /// The incumbent (or a terminal state) outranked it.
    Discarded,
}

impl InjectOutcome {
    pub(crate) const fn delivered(self) -> bool {
        matches!(self, Self::Stored | Self::Strengthened)
    }
}

/// The runtime-side state of one task.
pub(crate) struct TaskRecord {
    pub(crate) state: TaskState,
    future: Option<TaskFuture>,
    pending: Option<Interrupt>,
    pub(crate) trace: SpawnTrace,
    pub(crate) parent: Option<TaskId>,
    pub(crate) spawned_at: Time,
    pub(crate) mailbox: Mailbox,
}

impl TaskRecord {
    /// Creates a record with an empty body slot. The body is installed with
    /// [`TaskRecord::put_future`] once the task's id is known, so spawn
    /// closures can run without the runtime borrowed.
    pub(crate) fn new(trace: SpawnTrace, parent: Option<TaskId>, spawned_at: Time) -> Self {
        Self {
            state: TaskState::Created,
            future: None,
            pending: None,
            trace,
            parent,
            spawned_at,
            mailbox: Mailbox::new(),
        }
    }

    /// Takes the body for polling. Empty while the body is out being polled
    /// or after the task finished.
    pub(crate) fn take_future(&mut self) -> Option<TaskFuture> {
        self.future.take()
    }

    /// Parks the body again after a pending poll.
    pub(crate) fn put_future(&mut self, future: TaskFuture) {
        debug_assert!(self.future.is_none(), "body slot already occupied");
        self.future = Some(future);
    }

    /// Files an interrupt into the single pending slot.
    ///
    /// An escalation outranks any signal; among signals, `Cancel` outranks
    /// `MoveOn` and the incumbent wins ties. Terminal tasks discard
    /// everything.
    pub(crate) fn inject(&mut self, interrupt: Interrupt) -> InjectOutcome {
        if self.state.is_terminal() {
            return InjectOutcome::Discarded;
        }
        let decision = match (&self.pending, &interrupt) {
            (None, _) => InjectOutcome::Stored,
            (Some(Interrupt::Escalation(_)), _) => InjectOutcome::Discarded,
            (Some(Interrupt::Signal(_)), Interrupt::Escalation(_)) => InjectOutcome::Strengthened,
            (Some(Interrupt::Signal(incumbent)), Interrupt::Signal(candidate)) => {
                if candidate.kind.outranks(incumbent.kind) {
                    InjectOutcome::Strengthened
                } else {
                    InjectOutcome::Discarded
                }
            }
        };
        if decision.delivered() {
            self.pending = Some(interrupt);
        }
        decision
    }

    /// Consumes the pending interrupt, if any. Called by suspension points.
    pub(crate) fn take_pending(&mut self) -> Option<Interrupt> {
        self.pending.take()
    }

    /// True when an interrupt is waiting to be observed.
    pub(crate) fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drops a pending signal addressed to `scope`, if that is what the slot
    /// holds, returning its kind. Used when a scope exits cleanly after its
    /// deadline already fired.
    pub(crate) fn discard_scope_signal(&mut self, scope: ScopeId) -> Option<SignalKind> {
        match &self.pending {
            Some(Interrupt::Signal(signal)) if signal.matches_scope(scope) => {
                let kind = signal.kind;
                self.pending = None;
                Some(kind)
            }
            _ => None,
        }
    }
}

impl fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRecord")
            .field("state", &self.state)
            .field("pending", &self.pending)
            .field("parent", &self.parent)
            .field("spawned_at", &self.spawned_at)
            .field("mailbox_len", &self.mailbox.len())
            .field("body_parked", &self.future.is_some())
            .finish_non_exhaustive()
    }
}
