//! The task context: every scheduling operation hangs off a [`Cx`].
//!
//! A `Cx` is the capability to interact with the runtime: spawn and defer
//! tasks, sleep, submit reactor operations, receive mailbox messages. Each
//! task body receives its own `Cx`; there is no global runtime state to
//! reach for. Cloning is cheap and clones keep referring to the same task.
//!
//! # Suspension points
//!
//! Every awaitable returned from this module is a suspension point: the
//! first thing each one's poll does is consume a pending interrupt on the
//! task, surfacing it as an `Err`. Code that never suspends never observes
//! cancellation, which is the cooperative contract: between suspension
//! points a task cannot be interrupted.

use crate::error::{Error, Result};
use crate::pool::{Abandon, OpKind};
use crate::runtime::sched::RunQueue;
use crate::runtime::state::RuntimeState;
use crate::runtime::{erase_detached, erase_task, JoinCell, TaskHandle};
use crate::trace::{SpawnTrace, TraceData, TraceEventKind};
use crate::types::{OpId, TaskId, Time, TimerId};

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::Location;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

/// Handle to the runtime, scoped to one task.
#[derive(Clone)]
pub struct Cx {
    pub(crate) state: Rc<RefCell<RuntimeState>>,
    pub(crate) queue: Arc<RunQueue>,
    pub(crate) task: TaskId,
}

impl Cx {
    /// The task this context belongs to.
    #[must_use]
    pub fn task_id(&self) -> TaskId {
        self.task
    }

    /// Current runtime clock.
    #[must_use]
    pub fn now(&self) -> Time {
        self.state.borrow().now
    }

    /// This task's logical call chain: the spawn sites that led to it.
    #[must_use]
    pub fn trace(&self) -> SpawnTrace {
        self.state
            .borrow()
            .tasks
            .get(self.task.arena_index())
            .map(|record| record.trace.clone())
            .unwrap_or_default()
    }

    /// Starts a child task and returns its handle.
    ///
    /// The child is linked to this task: a failure it suffers after its
    /// handle is gone escalates here instead of disappearing. The spawn
    /// site is recorded in the child's call chain.
    #[track_caller]
    pub fn spin<T, F, Fut>(&self, f: F) -> TaskHandle<T>
    where
        T: 'static,
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = Result<T>> + 'static,
    {
        let site = Location::caller();
        let (child, warn) = {
            let mut state = self.state.borrow_mut();
            let trace = state
                .tasks
                .get(self.task.arena_index())
                .map(|record| record.trace.extend(site))
                .unwrap_or_else(|| SpawnTrace::root().extend(site));
            let child = state.create_task(trace, Some(self.task));
            (child, state.config.warn_unobserved_failures)
        };
        let cell = JoinCell::new();
        let child_cx = Cx {
            state: Rc::clone(&self.state),
            queue: Arc::clone(&self.queue),
            task: child,
        };
        // The body is built outside the state borrow; it may spin again.
        let body = f(child_cx);
        let mut state = self.state.borrow_mut();
        state.install_body(child, erase_task(Rc::clone(&cell), body));
        state.schedule(child);
        TaskHandle::new(child, cell, warn)
    }

    /// Starts an unlinked fire-and-forget task.
    ///
    /// There is no handle: failures are logged and swallowed, never
    /// escalated. Returns the task id for cancellation by id.
    #[track_caller]
    pub fn defer<F, Fut>(&self, f: F) -> TaskId
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = Result<()>> + 'static,
    {
        let site = Location::caller();
        let child = {
            let mut state = self.state.borrow_mut();
            let trace = state
                .tasks
                .get(self.task.arena_index())
                .map(|record| record.trace.extend(site))
                .unwrap_or_else(|| SpawnTrace::root().extend(site));
            state.create_task(trace, Some(self.task))
        };
        let child_cx = Cx {
            state: Rc::clone(&self.state),
            queue: Arc::clone(&self.queue),
            task: child,
        };
        let body = f(child_cx);
        let mut state = self.state.borrow_mut();
        state.install_body(child, erase_detached(body));
        state.schedule(child);
        child
    }

    /// A suspension point that completes immediately.
    ///
    /// Observes a pending interrupt without giving up the thread; useful
    /// inside compute loops that should stay cancellable.
    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            state: Rc::clone(&self.state),
            task: self.task,
        }
    }

    /// Yields to the scheduler, resuming after other runnable tasks.
    #[must_use]
    pub fn yield_now(&self) -> YieldNow {
        YieldNow {
            state: Rc::clone(&self.state),
            task: self.task,
            yielded: false,
        }
    }

    /// Suspends for at least `duration` of runtime time.
    #[must_use]
    pub fn sleep(&self, duration: Duration) -> Sleep {
        self.sleep_until(self.now() + duration)
    }

    /// Suspends until the runtime clock reaches `deadline`.
    ///
    /// A deadline already in the past completes on the first poll, after
    /// the usual interrupt check.
    #[must_use]
    pub fn sleep_until(&self, deadline: Time) -> Sleep {
        Sleep {
            state: Rc::clone(&self.state),
            task: self.task,
            deadline,
            timer: None,
            done: false,
        }
    }

    /// Acquires an operation context and submits it to the reactor.
    ///
    /// Await the returned [`OpAwait`] for the reactor's result. Dropping it
    /// instead abandons the operation: the context is released when the
    /// late completion arrives, and nobody is woken for it.
    ///
    /// # Errors
    ///
    /// Returns the reactor's refusal as-is; the acquired context is
    /// released before this returns.
    pub fn submit(&self, kind: OpKind) -> Result<OpAwait> {
        let mut state = self.state.borrow_mut();
        let acquired = state.pool.acquire(kind, self.task);
        let (op, serial) = (acquired.op, acquired.serial);
        state.record_event(
            TraceEventKind::OpAcquired,
            TraceData::Op { op, serial, kind, owner: self.task },
        );
        state.metrics.op_acquired(kind, acquired.reused);
        if let Err(error) = state.reactor.submit(op, kind) {
            if state.pool.release(op).is_some() {
                state.record_event(
                    TraceEventKind::OpReleased,
                    TraceData::Op { op, serial, kind, owner: self.task },
                );
                state.metrics.op_released(kind);
            }
            return Err(error);
        }
        Ok(OpAwait {
            state: Rc::clone(&self.state),
            op,
            serial,
            kind,
            task: self.task,
            done: false,
        })
    }

    /// Waits for the next mailbox message of type `M`.
    ///
    /// Messages are taken in arrival order. A message of a different type
    /// is consumed and reported as a type-mismatch error rather than
    /// silently skipped.
    #[must_use]
    pub fn receive<M: 'static>(&self) -> Receive<M> {
        Receive {
            state: Rc::clone(&self.state),
            task: self.task,
            _message: PhantomData,
        }
    }
}

impl fmt::Debug for Cx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cx").field("task", &self.task).finish()
    }
}

/// Immediate suspension point. See [`Cx::checkpoint`].
#[must_use = "futures do nothing unless awaited"]
#[derive(Debug)]
pub struct Checkpoint {
    state: Rc<RefCell<RuntimeState>>,
    task: TaskId,
}

impl Future for Checkpoint {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.state.borrow_mut().take_pending(this.task) {
            Some(interrupt) => Poll::Ready(Err(interrupt.into_error())),
            None => Poll::Ready(Ok(())),
        }
    }
}

/// One round trip through the run queue. See [`Cx::yield_now`].
#[must_use = "futures do nothing unless awaited"]
#[derive(Debug)]
pub struct YieldNow {
    state: Rc<RefCell<RuntimeState>>,
    task: TaskId,
    yielded: bool,
}

impl Future for YieldNow {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(interrupt) = this.state.borrow_mut().take_pending(this.task) {
            return Poll::Ready(Err(interrupt.into_error()));
        }
        if this.yielded {
            Poll::Ready(Ok(()))
        } else {
            this.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

/// Timer suspension. See [`Cx::sleep`].
///
/// Wakes through the scheduler's timer service rather than the registered
/// waker: the deadline heap schedules the owning task when it fires.
#[must_use = "futures do nothing unless awaited"]
#[derive(Debug)]
pub struct Sleep {
    state: Rc<RefCell<RuntimeState>>,
    task: TaskId,
    deadline: Time,
    timer: Option<TimerId>,
    done: bool,
}

impl Future for Sleep {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.state.borrow_mut();
        if let Some(interrupt) = state.take_pending(this.task) {
            if let Some(timer) = this.timer.take() {
                state.cancel_timer(timer, this.task);
            }
            this.done = true;
            return Poll::Ready(Err(interrupt.into_error()));
        }
        if state.now >= this.deadline {
            this.done = true;
            this.timer = None;
            return Poll::Ready(Ok(()));
        }
        if this.timer.is_none() {
            this.timer = Some(state.arm_timer(this.deadline, this.task));
        }
        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Some(timer) = self.timer.take() {
            // A message-carried future can drop while the state is
            // borrowed; the orphaned timer then fires into a no-op.
            if let Ok(mut state) = self.state.try_borrow_mut() {
                state.cancel_timer(timer, self.task);
            }
        }
    }
}

/// An in-flight reactor operation. See [`Cx::submit`].
#[must_use = "futures do nothing unless awaited"]
#[derive(Debug)]
pub struct OpAwait {
    state: Rc<RefCell<RuntimeState>>,
    op: OpId,
    serial: u64,
    kind: OpKind,
    task: TaskId,
    done: bool,
}

impl OpAwait {
    /// Serial number stamped on the underlying context at acquire.
    #[must_use]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// The operation kind this context was submitted as.
    #[must_use]
    pub fn kind(&self) -> OpKind {
        self.kind
    }
}

impl Future for OpAwait {
    type Output = Result<i32>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.state.borrow_mut();
        if let Some(interrupt) = state.take_pending(this.task) {
            this.done = true;
            abandon_op(&mut state, this.op, this.serial, this.task);
            return Poll::Ready(Err(interrupt.into_error()));
        }
        if let Some(claimed) = state.pool.claim(this.op) {
            this.done = true;
            state.record_event(
                TraceEventKind::OpReleased,
                TraceData::Op {
                    op: this.op,
                    serial: claimed.serial,
                    kind: claimed.kind,
                    owner: this.task,
                },
            );
            state.metrics.op_released(claimed.kind);
            if claimed.result < 0 {
                let chain = state
                    .tasks
                    .get(this.task.arena_index())
                    .map(|record| record.trace.clone())
                    .unwrap_or_default();
                return Poll::Ready(Err(Error::io(claimed.result).with_chain(chain)));
            }
            return Poll::Ready(Ok(claimed.result));
        }
        state.pool.register(this.op, cx.waker());
        Poll::Pending
    }
}

impl Drop for OpAwait {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Ok(mut state) = self.state.try_borrow_mut() {
            abandon_op(&mut state, self.op, self.serial, self.task);
        }
    }
}

/// Walks away from an op: releases now if the result already arrived,
/// otherwise marks the context so the late completion releases it.
fn abandon_op(state: &mut RuntimeState, op: OpId, serial: u64, owner: TaskId) {
    match state.pool.abandon(op) {
        Abandon::Deferred(kind) => {
            state.record_event(
                TraceEventKind::OpAbandoned,
                TraceData::Op { op, serial, kind, owner },
            );
            state.metrics.op_abandoned(kind);
            state.reactor.cancel(op);
        }
        Abandon::Released(kind) => {
            state.record_event(
                TraceEventKind::OpReleased,
                TraceData::Op { op, serial, kind, owner },
            );
            state.metrics.op_released(kind);
        }
        Abandon::Gone => {}
    }
}

/// Mailbox receive. See [`Cx::receive`].
#[must_use = "futures do nothing unless awaited"]
pub struct Receive<M> {
    state: Rc<RefCell<RuntimeState>>,
    task: TaskId,
    _message: PhantomData<fn() -> M>,
}

impl<M: 'static> Future for Receive<M> {
    type Output = Result<M>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.state.borrow_mut();
        if let Some(interrupt) = state.take_pending(this.task) {
            return Poll::Ready(Err(interrupt.into_error()));
        }
        let Some(record) = state.tasks.get_mut(this.task.arena_index()) else {
            return Poll::Ready(Err(Error::disconnected("task")));
        };
        match record.mailbox.take::<M>() {
            Some(result) => Poll::Ready(result),
            None => {
                record.mailbox.register(cx.waker());
                Poll::Pending
            }
        }
    }
}

impl<M> fmt::Debug for Receive<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receive").field("task", &self.task).finish()
    }
}
