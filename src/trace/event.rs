//! Structured runtime events.
//!
//! Every observable scheduler action lands here as a [`TraceEvent`]: task
//! lifecycle transitions, signal injection, pool acquire/release, timer
//! activity. Sequence numbers are dense and monotonic, so a gap-free ordering
//! of what the runtime did survives in the ring buffer for post-mortems of
//! lost-wakeup or double-resume bugs.

use crate::pool::OpKind;
use crate::types::{OpId, SignalKind, TaskId, Time, TimerId};
use core::fmt;

/// The kind of runtime event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEventKind {
    /// A task record was created.
    TaskSpawned,
    /// A task was pushed onto the run queue.
    TaskScheduled,
    /// A task suspended at a blocking primitive.
    TaskSuspended,
    /// A task reached a terminal state.
    TaskCompleted,
    /// A cancellation signal was stored in a task's pending slot.
    SignalInjected,
    /// A pending signal was dropped unobserved (scope exit, merge, or dead target).
    SignalDiscarded,
    /// An operation context left the free set.
    OpAcquired,
    /// The reactor filled in an operation result.
    OpCompleted,
    /// An awaiting task walked away from an in-flight operation.
    OpAbandoned,
    /// An operation context returned to the free set.
    OpReleased,
    /// A completion arrived for a context that is no longer live.
    OpStale,
    /// A timer was armed.
    TimerArmed,
    /// A timer fired.
    TimerFired,
    /// A timer was cancelled before firing.
    TimerCancelled,
    /// The runtime clock advanced.
    TimeAdvance,
}

/// Payload attached to a [`TraceEvent`].
#[derive(Debug, Clone)]
pub enum TraceData {
    /// No payload.
    None,
    /// A task, alone.
    Task {
        /// The task involved.
        task: TaskId,
    },
    /// Task terminal data.
    TaskExit {
        /// The task that finished.
        task: TaskId,
        /// Terminal classification (`"ok"`, `"err"`, `"cancelled"`, `"panicked"`).
        outcome: &'static str,
    },
    /// Signal injection or discard data.
    Signal {
        /// The task the signal targets.
        target: TaskId,
        /// Cancel or move-on.
        kind: SignalKind,
    },
    /// Operation context data.
    Op {
        /// Slot identity of the context.
        op: OpId,
        /// Monotonic serial stamped at acquire.
        serial: u64,
        /// The operation type.
        kind: OpKind,
        /// The task that issued it.
        owner: TaskId,
    },
    /// Timer data.
    Timer {
        /// The timer involved.
        timer: TimerId,
        /// The task it will wake.
        task: TaskId,
        /// When it is due.
        deadline: Time,
    },
    /// Clock movement.
    Clock {
        /// Time before the advance.
        old: Time,
        /// Time after the advance.
        new: Time,
    },
}

/// One recorded runtime event.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    /// Dense, monotonically increasing sequence number.
    pub seq: u64,
    /// Runtime clock at the moment of the event.
    pub time: Time,
    /// What happened.
    pub kind: TraceEventKind,
    /// Who it happened to.
    pub data: TraceData,
}

impl TraceEvent {
    /// Creates an event.
    #[must_use]
    pub const fn new(seq: u64, time: Time, kind: TraceEventKind, data: TraceData) -> Self {
        Self { seq, time, kind, data }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>6} {:>10}] {:?}", self.seq, self.time.to_string(), self.kind)?;
        match &self.data {
            TraceData::None => Ok(()),
            TraceData::Task { task } => write!(f, " {task}"),
            TraceData::TaskExit { task, outcome } => write!(f, " {task} -> {outcome}"),
            TraceData::Signal { target, kind } => write!(f, " {kind} -> {target}"),
            TraceData::Op { op, serial, kind, owner } => {
                write!(f, " {op} #{serial} {kind} owner={owner}")
            }
            TraceData::Timer { timer, task, deadline } => {
                write!(f, " {timer:?} {task} due={deadline}")
            }
            TraceData::Clock { old, new } => write!(f, " {old} -> {new}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_seq_and_payload() {
        let event = TraceEvent::new(
            42,
            Time::from_millis(3),
            TraceEventKind::TaskCompleted,
            TraceData::TaskExit {
                task: TaskId::new_for_test(5, 0),
                outcome: "ok",
            },
        );
        let rendered = event.to_string();
        assert!(rendered.contains("42"));
        assert!(rendered.contains("TaskCompleted"));
        assert!(rendered.contains("T5 -> ok"));
    }
}
