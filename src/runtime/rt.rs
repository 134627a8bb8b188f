//! The runtime driver.
//!
//! [`Runtime::block_on`] owns the whole loop: poll runnable tasks up to the
//! configured budget, hand the reactor a chance to deliver completions and
//! advance the clock, fire due timers, repeat until the root task resolves.
//! Everything runs on the calling thread; there are no worker threads to
//! coordinate with and no cross-thread wakeups to lose.
//!
//! # Teardown
//!
//! When the root resolves (or the driver detects a deadlock), every
//! surviving task gets a shutdown signal and a bounded number of turns to
//! unwind through its suspension points. Whatever still refuses to finish
//! is dropped in place, and the operation pool is torn down with a report
//! of what was outstanding.

use crate::cx::Cx;
use crate::error::{Error, Result};
use crate::pool::Completion;
use crate::reactor::{LabHandle, LabReactor, Reactor};
use crate::record::{ExitClass, TaskExit, TaskState};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::sched::{RunQueue, TaskWaker};
use crate::runtime::state::RuntimeState;
use crate::runtime::task_handle::{erase_task, JoinCell, SharedCell};
use crate::trace::{SpawnTrace, TraceData, TraceEvent, TraceEventKind};
use crate::types::{CancelSignal, Interrupt, TaskId, Time};

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Drain passes granted to unwinding tasks at shutdown before their bodies
/// are dropped in place. Each pass re-signals tasks spawned by the previous
/// one.
const SHUTDOWN_PASSES: usize = 3;

/// A single-threaded cooperative runtime.
///
/// The runtime drives tasks over a [`Reactor`] it takes ownership of at
/// construction. [`block_on`](Self::block_on) is the only entry point that
/// actually runs anything; a `Runtime` between calls holds no tasks, no
/// timers, and no in-flight operations, only the trace ring and the pool's
/// serial counter survive from run to run.
pub struct Runtime {
    state: Rc<RefCell<RuntimeState>>,
    queue: Arc<RunQueue>,
}

impl Runtime {
    /// Runtime with default configuration over the given reactor.
    #[must_use]
    pub fn new(reactor: Box<dyn Reactor>) -> Self {
        Self::with_config(RuntimeConfig::default(), reactor)
    }

    /// Runtime with explicit configuration over the given reactor.
    #[must_use]
    pub fn with_config(mut config: RuntimeConfig, reactor: Box<dyn Reactor>) -> Self {
        config.normalize();
        let state = RuntimeState::new(config, reactor);
        let queue = Arc::clone(&state.queue);
        Self {
            state: Rc::new(RefCell::new(state)),
            queue,
        }
    }

    /// Runtime over a fresh lab reactor, with its scripting handle.
    #[must_use]
    pub fn lab() -> (Self, LabHandle) {
        let (reactor, handle) = LabReactor::new();
        (Self::new(Box::new(reactor)), handle)
    }

    /// A copy of the active configuration.
    #[must_use]
    pub fn config(&self) -> RuntimeConfig {
        self.state.borrow().config.clone()
    }

    /// Current runtime clock.
    #[must_use]
    pub fn now(&self) -> Time {
        self.state.borrow().now
    }

    /// A copy of the recorded trace events, oldest first.
    #[must_use]
    pub fn trace_snapshot(&self) -> Vec<TraceEvent> {
        self.state.borrow().trace.snapshot()
    }

    /// Runs a root task to completion and returns its result.
    ///
    /// The closure receives the root [`Cx`] and builds the root future with
    /// it; everything else is spawned from there. When the root resolves,
    /// all remaining tasks are cancelled and drained before this returns,
    /// so no work leaks past the call.
    ///
    /// A failure that escalated past the root (a spawned task failing after
    /// its handle was dropped) takes precedence over a successful root
    /// value.
    ///
    /// # Errors
    ///
    /// Returns the root task's failure, a deadlock error when every task is
    /// suspended with nothing left to wake one, or an escalated failure
    /// from an unobserved child.
    pub fn block_on<T, F, Fut>(&mut self, f: F) -> Result<T>
    where
        T: 'static,
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = Result<T>> + 'static,
    {
        let cell = JoinCell::new();
        let root = {
            let mut state = self.state.borrow_mut();
            let id = state.create_task(SpawnTrace::root(), None);
            state.root = Some(id);
            id
        };
        let cx = Cx {
            state: Rc::clone(&self.state),
            queue: Arc::clone(&self.queue),
            task: root,
        };
        // The body is built outside the state borrow; the closure may
        // spawn immediately.
        let body = f(cx);
        {
            let mut state = self.state.borrow_mut();
            state.install_body(root, erase_task(Rc::clone(&cell), body));
            state.schedule(root);
        }

        let driven = self.drive(&cell);
        self.shutdown();
        driven?;

        let failure = self.state.borrow_mut().root_failure.take();
        let outcome = cell.borrow_mut().outcome.take();
        let result = match outcome {
            Some(outcome) => outcome.into_result(),
            None => return Err(Error::internal("root task never resolved")),
        };
        match failure {
            Some(error) if result.is_ok() => Err(error),
            _ => result,
        }
    }

    /// Turns the loop until the root's outcome lands in `cell`.
    fn drive<T>(&mut self, cell: &SharedCell<T>) -> Result<()> {
        loop {
            if cell.borrow().outcome.is_some() {
                return Ok(());
            }
            let budget = self.state.borrow().config.poll_budget;
            for _ in 0..budget {
                let Some(task) = self.queue.pop() else {
                    break;
                };
                self.dispatch(task);
                if cell.borrow().outcome.is_some() {
                    return Ok(());
                }
            }
            self.turn_reactor()?;
        }
    }

    /// Polls one task, without holding the state borrow across the poll.
    fn dispatch(&mut self, task: TaskId) {
        let mut future = {
            let mut state = self.state.borrow_mut();
            let Some(record) = state.tasks.get_mut(task.arena_index()) else {
                // Stale queue entry for a completed task.
                return;
            };
            let Some(future) = record.take_future() else {
                return;
            };
            state.current = Some(task);
            future
        };

        let waker = Waker::from(Arc::new(TaskWaker {
            task,
            queue: Arc::clone(&self.queue),
        }));
        let mut poll_cx = Context::from_waker(&waker);
        match future.as_mut().poll(&mut poll_cx) {
            Poll::Pending => {
                let requeued = self.queue.contains(task);
                let mut state = self.state.borrow_mut();
                state.current = None;
                if let Some(record) = state.tasks.get_mut(task.arena_index()) {
                    record.put_future(future);
                    record.state = if requeued {
                        TaskState::Runnable
                    } else {
                        TaskState::Suspended
                    };
                    if !requeued {
                        state.record_event(
                            TraceEventKind::TaskSuspended,
                            TraceData::Task { task },
                        );
                    }
                } else {
                    drop(state);
                    drop(future);
                }
            }
            Poll::Ready(exit) => {
                // The body has returned; dropping its shell cannot touch
                // runtime state.
                drop(future);
                self.complete_task(task, exit);
            }
        }
    }

    /// Retires a resolved task and routes its escalation, if any.
    fn complete_task(&mut self, task: TaskId, exit: TaskExit) {
        let mut state = self.state.borrow_mut();
        state.current = None;
        let Some(mut record) = state.tasks.remove(task.arena_index()) else {
            return;
        };
        record.state = if exit.class == ExitClass::Cancelled {
            TaskState::Cancelled
        } else {
            TaskState::Done
        };
        let elapsed = state.now.duration_since(record.spawned_at);
        state.record_event(
            TraceEventKind::TaskCompleted,
            TraceData::TaskExit {
                task,
                outcome: exit.class.label(),
            },
        );
        state.metrics.task_completed(task, exit.class.label(), elapsed);
        tracing::debug!(
            task = %task,
            state = record.state.label(),
            outcome = exit.class.label(),
            ?elapsed,
            "task completed"
        );
        if let Some(error) = exit.escalate {
            let parent = record
                .parent
                .filter(|p| state.tasks.contains(p.arena_index()));
            match parent {
                Some(parent) => {
                    state.inject(parent, Interrupt::Escalation(error));
                }
                None => {
                    tracing::error!(task = %task, error = %error, "task failure reached the root");
                    state.root_failure.get_or_insert(error);
                }
            }
        }
        drop(state);
        // Mailbox contents may carry arbitrary user drops.
        drop(record);
    }

    /// Lets the reactor deliver completions and moves the clock, then fires
    /// due timers.
    ///
    /// With runnable tasks waiting the reactor gets a non-blocking look-in;
    /// otherwise it may sleep until the next timer deadline, or for as long
    /// as it likes when none is armed.
    fn turn_reactor(&mut self) -> Result<()> {
        let (completions, until) = {
            let mut state = self.state.borrow_mut();
            let until = if self.queue.is_empty() {
                state.timers.next_deadline()
            } else {
                Some(state.now)
            };
            if until.is_none() && state.reactor.in_flight() == 0 {
                return Err(Error::deadlock());
            }
            let completions = state.reactor.drive(until);
            let now = state.reactor.now();
            if now > state.now {
                let old = state.now;
                state.now = now;
                state.record_event(TraceEventKind::TimeAdvance, TraceData::Clock { old, new: now });
            }
            (completions, until)
        };
        if until.is_none() && completions.is_empty() {
            // The reactor had ops in flight but cannot produce a completion
            // for any of them.
            return Err(Error::deadlock());
        }

        let mut state = self.state.borrow_mut();
        for completion in completions {
            let op = completion.op;
            match state.pool.complete(op, completion.result) {
                Completion::Deliver {
                    owner,
                    serial,
                    kind,
                    resume,
                } => {
                    state.record_event(
                        TraceEventKind::OpCompleted,
                        TraceData::Op { op, serial, kind, owner },
                    );
                    state.metrics.op_completed(kind);
                    if let Some(waker) = resume {
                        // Pushes the run queue, which is not behind the
                        // state borrow.
                        waker.wake();
                    }
                    if self.queue.contains(owner) {
                        if let Some(record) = state.tasks.get_mut(owner.arena_index()) {
                            if record.state == TaskState::Suspended {
                                record.state = TaskState::Runnable;
                            }
                        }
                        state.record_event(
                            TraceEventKind::TaskScheduled,
                            TraceData::Task { task: owner },
                        );
                    }
                }
                Completion::ReleasedAbandoned { owner, serial, kind } => {
                    state.record_event(
                        TraceEventKind::OpReleased,
                        TraceData::Op { op, serial, kind, owner },
                    );
                    state.metrics.op_released(kind);
                }
                Completion::Stale => {
                    state.record_event(TraceEventKind::OpStale, TraceData::None);
                }
            }
        }

        let now = state.now;
        while let Some((timer, task, deadline)) = state.timers.pop_due(now) {
            state.record_event(
                TraceEventKind::TimerFired,
                TraceData::Timer { timer, task, deadline },
            );
            state.metrics.timer_fired();
            state.schedule(task);
        }
        Ok(())
    }

    /// Cancels and drains every surviving task, then tears down the pool.
    fn shutdown(&mut self) {
        self.drain_tasks();
        let report = {
            let mut state = self.state.borrow_mut();
            state.root = None;
            state.pool.teardown()
        };
        if report.total_acquired > 0 {
            tracing::debug!(
                in_flight = report.in_flight,
                abandoned = report.abandoned,
                recycled = report.recycled,
                total_acquired = report.total_acquired,
                "operation pool torn down"
            );
        }
    }

    /// Signals shutdown to live tasks and runs the queue dry, a bounded
    /// number of times so respawning tasks cannot stall teardown forever.
    fn drain_tasks(&mut self) {
        for _ in 0..SHUTDOWN_PASSES {
            let live: Vec<TaskId> = {
                let state = self.state.borrow();
                state
                    .tasks
                    .iter()
                    .map(|(index, _)| TaskId::from_arena(index))
                    .collect()
            };
            if live.is_empty() && self.queue.is_empty() {
                return;
            }
            {
                let mut state = self.state.borrow_mut();
                for task in &live {
                    state.inject(*task, Interrupt::Signal(CancelSignal::shutdown()));
                }
            }
            while let Some(task) = self.queue.pop() {
                self.dispatch(task);
            }
        }
        self.force_drop_remaining();
    }

    /// Drops the bodies of tasks that would not unwind.
    fn force_drop_remaining(&mut self) {
        let doomed: Vec<TaskId> = {
            let state = self.state.borrow();
            state
                .tasks
                .iter()
                .map(|(index, _)| TaskId::from_arena(index))
                .collect()
        };
        if doomed.is_empty() {
            return;
        }
        // Bodies drop outside the borrow: operation and sleep futures reach
        // back into the state to release what they hold.
        let mut bodies = Vec::new();
        {
            let mut state = self.state.borrow_mut();
            for task in &doomed {
                if let Some(record) = state.tasks.get_mut(task.arena_index()) {
                    if let Some(future) = record.take_future() {
                        bodies.push(future);
                    }
                }
            }
        }
        let dropped = bodies.len();
        drop(bodies);
        {
            let mut state = self.state.borrow_mut();
            for task in doomed {
                state.tasks.remove(task.arena_index());
            }
        }
        while self.queue.pop().is_some() {}
        if dropped > 0 {
            tracing::warn!(tasks = dropped, "dropped unresponsive tasks at shutdown");
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        // Nothing survives outside block_on except when a root body factory
        // panicked mid-setup; sweep just in case.
        if self.state.borrow().live_tasks() > 0 {
            self.drain_tasks();
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Runtime")
            .field("now", &state.now)
            .field("live_tasks", &state.live_tasks())
            .field("active_ops", &state.pool.active_count())
            .field("queued", &self.queue.len())
            .finish()
    }
}
