//! Shared runtime state.
//!
//! Everything the scheduler mutates lives here: the task arena, the
//! operation pool, the timer queue, the reactor, the clock, and the trace
//! buffer. The state sits in an `Rc<RefCell>` shared between the runtime
//! driver and every [`Cx`](crate::cx::Cx); the discipline throughout the
//! crate is that no borrow is held across a user poll.

use crate::error::{Error, Result};
use crate::metrics::MetricsProvider;
use crate::pool::OpPool;
use crate::reactor::Reactor;
use crate::record::{TaskFuture, TaskRecord, TaskState};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::sched::RunQueue;
use crate::runtime::timer::TimerHeap;
use crate::trace::{SpawnTrace, TraceBuffer, TraceData, TraceEventKind};
use crate::types::{Interrupt, ScopeId, TaskId, Time, TimerId};
use crate::util::Arena;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub(crate) struct RuntimeState {
    pub(crate) tasks: Arena<TaskRecord>,
    pub(crate) pool: OpPool,
    pub(crate) timers: TimerHeap,
    pub(crate) reactor: Box<dyn Reactor>,
    pub(crate) queue: Arc<RunQueue>,
    pub(crate) now: Time,
    pub(crate) trace: TraceBuffer,
    pub(crate) metrics: Arc<dyn MetricsProvider>,
    /// Task currently being polled, if any.
    pub(crate) current: Option<TaskId>,
    /// The task `block_on` is waiting for.
    pub(crate) root: Option<TaskId>,
    /// A failure escalated past the root, delivered when `block_on` returns.
    pub(crate) root_failure: Option<Error>,
    next_scope: u64,
    pub(crate) config: RuntimeConfig,
}

impl fmt::Debug for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeState")
            .field("now", &self.now)
            .field("current", &self.current)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl RuntimeState {
    pub(crate) fn new(config: RuntimeConfig, reactor: Box<dyn Reactor>) -> Self {
        let now = reactor.now();
        Self {
            tasks: Arena::new(),
            pool: OpPool::new(),
            timers: TimerHeap::new(),
            reactor,
            queue: Arc::new(RunQueue::new()),
            now,
            trace: TraceBuffer::new(config.trace_capacity),
            metrics: Arc::clone(&config.metrics_provider),
            current: None,
            root: None,
            root_failure: None,
            next_scope: 0,
            config,
        }
    }

    pub(crate) fn record_event(&mut self, kind: TraceEventKind, data: TraceData) {
        self.trace.record(self.now, kind, data);
    }

    pub(crate) fn next_scope_id(&mut self) -> ScopeId {
        self.next_scope += 1;
        ScopeId(self.next_scope)
    }

    /// Logical call chain of the task being polled; root outside any task.
    pub(crate) fn current_trace(&self) -> SpawnTrace {
        self.current
            .and_then(|t| self.tasks.get(t.arena_index()))
            .map(|r| r.trace.clone())
            .unwrap_or_default()
    }

    pub(crate) fn live_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Creates a record with an empty body slot and reports the spawn.
    pub(crate) fn create_task(&mut self, trace: SpawnTrace, parent: Option<TaskId>) -> TaskId {
        let now = self.now;
        let index = self.tasks.insert(TaskRecord::new(trace, parent, now));
        let task = TaskId::from_arena(index);
        self.record_event(TraceEventKind::TaskSpawned, TraceData::Task { task });
        self.metrics.task_spawned(task);
        task
    }

    /// Installs the body built outside the state borrow.
    pub(crate) fn install_body(&mut self, task: TaskId, future: TaskFuture) {
        if let Some(record) = self.tasks.get_mut(task.arena_index()) {
            record.put_future(future);
        }
    }

    /// Puts a live task on the run queue, once.
    pub(crate) fn schedule(&mut self, task: TaskId) {
        let Some(record) = self.tasks.get_mut(task.arena_index()) else {
            return;
        };
        if record.state.is_terminal() {
            return;
        }
        if self.queue.push(task) {
            record.state = TaskState::Runnable;
            self.record_event(TraceEventKind::TaskScheduled, TraceData::Task { task });
        }
    }

    /// Files an interrupt into `target`'s pending slot and schedules it so
    /// the next suspension point observes it. Returns whether it landed.
    pub(crate) fn inject(&mut self, target: TaskId, interrupt: Interrupt) -> bool {
        let kind = interrupt.signal_kind();
        let data = match kind {
            Some(kind) => TraceData::Signal { target, kind },
            None => TraceData::Task { task: target },
        };
        let Some(record) = self.tasks.get_mut(target.arena_index()) else {
            self.record_event(TraceEventKind::SignalDiscarded, data);
            return false;
        };
        let outcome = record.inject(interrupt);
        if outcome.delivered() {
            self.record_event(TraceEventKind::SignalInjected, data);
            if let Some(kind) = kind {
                self.metrics.signal_injected(kind);
            }
            self.schedule(target);
            true
        } else {
            self.record_event(TraceEventKind::SignalDiscarded, data);
            false
        }
    }

    /// Consumes `task`'s pending interrupt, if any.
    pub(crate) fn take_pending(&mut self, task: TaskId) -> Option<Interrupt> {
        self.tasks.get_mut(task.arena_index())?.take_pending()
    }

    /// Drops a pending signal addressed to `scope` from `target`, so a
    /// fired-but-unobserved deadline cannot leak past its scope's exit.
    pub(crate) fn discard_scope_signal(&mut self, target: TaskId, scope: ScopeId) -> bool {
        let Some(record) = self.tasks.get_mut(target.arena_index()) else {
            return false;
        };
        match record.discard_scope_signal(scope) {
            Some(kind) => {
                self.record_event(
                    TraceEventKind::SignalDiscarded,
                    TraceData::Signal { target, kind },
                );
                true
            }
            None => false,
        }
    }

    /// Delivers a message to `target`'s mailbox, scheduling it if it was
    /// suspended in a receive.
    pub(crate) fn deliver(&mut self, target: TaskId, message: Box<dyn Any>) -> Result<()> {
        let Some(record) = self.tasks.get_mut(target.arena_index()) else {
            return Err(Error::disconnected("task"));
        };
        if record.state.is_terminal() {
            return Err(Error::disconnected("task"));
        }
        let was_waiting = record.mailbox.push(message).is_some();
        if was_waiting {
            self.schedule(target);
        }
        Ok(())
    }

    /// Arms a timer waking `task` at `deadline`.
    pub(crate) fn arm_timer(&mut self, deadline: Time, task: TaskId) -> TimerId {
        let timer = self.timers.insert(deadline, task);
        self.record_event(
            TraceEventKind::TimerArmed,
            TraceData::Timer { timer, task, deadline },
        );
        timer
    }

    /// Disarms a timer armed by `task`.
    pub(crate) fn cancel_timer(&mut self, timer: TimerId, task: TaskId) {
        if self.timers.cancel(timer) {
            self.record_event(TraceEventKind::TimerCancelled, TraceData::Task { task });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactor::LabReactor;
    use crate::types::{CancelSignal, SignalKind};

    fn state() -> RuntimeState {
        let (reactor, _) = LabReactor::new();
        RuntimeState::new(RuntimeConfig::default(), Box::new(reactor))
    }

    #[test]
    fn inject_schedules_the_target_once() {
        let mut state = state();
        let task = state.create_task(SpawnTrace::root(), None);

        assert!(state.inject(
            task,
            Interrupt::Signal(CancelSignal::handle_cancel(SpawnTrace::root()))
        ));
        assert_eq!(state.queue.len(), 1);

        // A weaker follow-up is discarded and does not double-queue.
        assert!(!state.inject(
            task,
            Interrupt::Signal(CancelSignal::handle_interrupt(SpawnTrace::root()))
        ));
        assert_eq!(state.queue.len(), 1);

        match state.take_pending(task) {
            Some(Interrupt::Signal(signal)) => assert_eq!(signal.kind, SignalKind::Cancel),
            other => panic!("expected pending cancel, got {other:?}"),
        }
    }

    #[test]
    fn deliver_to_missing_task_is_disconnected() {
        let mut state = state();
        let err = state
            .deliver(TaskId::new_for_test(9, 0), Box::new(1_u32))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Disconnected);
    }

    #[test]
    fn scope_discard_only_touches_matching_signals() {
        let mut state = state();
        let task = state.create_task(SpawnTrace::root(), None);
        let scope = state.next_scope_id();
        let other = state.next_scope_id();

        state.inject(
            task,
            Interrupt::Signal(CancelSignal::deadline(
                SignalKind::MoveOn,
                scope,
                SpawnTrace::root(),
            )),
        );
        assert!(!state.discard_scope_signal(task, other));
        assert!(state.discard_scope_signal(task, scope));
        assert!(state.take_pending(task).is_none());
    }
}
