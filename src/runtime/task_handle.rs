//! Handles for observing spawned tasks.
//!
//! [`Cx::spin`](crate::cx::Cx::spin) returns a [`TaskHandle`]. The handle
//! and the task's type-erased wrapper share a [`JoinCell`]: the wrapper
//! writes the final [`Outcome`] exactly once, and [`JoinFuture`] moves it
//! out exactly once.
//!
//! # Design
//!
//! Dropping a handle does not stop the task. It keeps running, and its
//! failure reporting changes instead: an `Err` or panic that no handle will
//! ever observe escalates to the parent task as an
//! [`Interrupt::Escalation`](crate::types::Interrupt). Cancelled outcomes
//! never escalate; cancellation is something the runtime did on purpose.

use crate::cx::Cx;
use crate::error::{Error, Result};
use crate::record::{ExitClass, TaskExit, TaskFuture};
use crate::runtime::state::RuntimeState;
use crate::types::{CancelSignal, Interrupt, Outcome, PanicPayload, TaskId};

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Shared slot between a task's wrapper future and its [`TaskHandle`].
pub(crate) struct JoinCell<T> {
    /// Final outcome, written once by the wrapper.
    pub(crate) outcome: Option<Outcome<T>>,
    /// Set once a [`JoinFuture`] has moved the outcome out.
    pub(crate) taken: bool,
    /// Cleared when the handle drops; gates failure escalation.
    pub(crate) handle_alive: bool,
    /// Waker of a joiner parked on the cell.
    pub(crate) waiter: Option<Waker>,
}

pub(crate) type SharedCell<T> = Rc<RefCell<JoinCell<T>>>;

impl<T> JoinCell<T> {
    pub(crate) fn new() -> SharedCell<T> {
        Rc::new(RefCell::new(Self {
            outcome: None,
            taken: false,
            handle_alive: true,
            waiter: None,
        }))
    }
}

/// Owner-side view of a spawned task.
///
/// Obtained from [`Cx::spin`](crate::cx::Cx::spin). The handle is the only
/// way to read the task's [`Outcome`]; everything else it offers (cancel,
/// interrupt, send) is also reachable through the task id, it is just
/// shorter to write.
///
/// Dropping the handle leaves the task running. If the task later fails,
/// the failure escalates to the spawner instead of being silently lost.
pub struct TaskHandle<T> {
    task: TaskId,
    cell: SharedCell<T>,
    warn_unobserved: bool,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(task: TaskId, cell: SharedCell<T>, warn_unobserved: bool) -> Self {
        Self {
            task,
            cell,
            warn_unobserved,
        }
    }

    /// Identifier of the spawned task.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.task
    }

    /// True once the task has resolved, whether or not the outcome was
    /// already consumed by a join.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        let cell = self.cell.borrow();
        cell.taken || cell.outcome.is_some()
    }

    /// Waits for the task to resolve and moves its [`Outcome`] out.
    ///
    /// The outcome can be consumed once; a second join resolves to
    /// a disconnected error. Joining is itself a suspension point, so a
    /// pending interrupt on the joining task surfaces here as `Err`.
    pub fn join(&self, cx: &Cx) -> JoinFuture<T> {
        JoinFuture {
            cell: Rc::clone(&self.cell),
            state: Rc::clone(&cx.state),
            joiner: cx.task,
        }
    }

    /// Requests that the task unwind with a full-task cancel.
    ///
    /// Delivery follows interrupt precedence: a stronger incumbent signal
    /// keeps its slot and this request is dropped. Cancelling an already
    /// resolved task is a no-op.
    pub fn cancel(&self, cx: &Cx) {
        let mut state = cx.state.borrow_mut();
        let origin = state.current_trace();
        state.inject(
            self.task,
            Interrupt::Signal(CancelSignal::handle_cancel(origin)),
        );
    }

    /// Requests that the task move on from its current suspension point.
    ///
    /// Weaker than [`cancel`](Self::cancel): the task observes the signal
    /// at its next suspension point and decides how far to unwind.
    pub fn interrupt(&self, cx: &Cx) {
        let mut state = cx.state.borrow_mut();
        let origin = state.current_trace();
        state.inject(
            self.task,
            Interrupt::Signal(CancelSignal::handle_interrupt(origin)),
        );
    }

    /// Delivers a message to the task's mailbox.
    ///
    /// Fails with a disconnected error once the task has resolved. The
    /// message type must match what the receiver asks for; a mismatch is
    /// reported on the receiving side, not here.
    pub fn send<M: 'static>(&self, cx: &Cx, message: M) -> Result<()> {
        cx.state.borrow_mut().deliver(self.task, Box::new(message))
    }

    /// Moves the outcome out if the task has resolved, marking it consumed.
    /// `None` both while the task is still running and after a prior take.
    pub(crate) fn try_take_outcome(&self) -> Option<Outcome<T>> {
        let mut cell = self.cell.borrow_mut();
        if cell.taken {
            return None;
        }
        let outcome = cell.outcome.take()?;
        cell.taken = true;
        Some(outcome)
    }

    /// Parks `waker` to be woken when the task resolves. Replaces any
    /// previously parked waker.
    pub(crate) fn register_waiter(&self, waker: &Waker) {
        self.cell.borrow_mut().waiter = Some(waker.clone());
    }

    /// Drops the handle without the unobserved-failure warning.
    ///
    /// The task still escalates later failures to its parent; use
    /// [`Cx::defer`](crate::cx::Cx::defer) for true fire-and-forget work.
    pub fn detach(mut self) {
        self.warn_unobserved = false;
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("task", &self.task)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl<T> Drop for TaskHandle<T> {
    fn drop(&mut self) {
        let mut cell = self.cell.borrow_mut();
        cell.handle_alive = false;
        if !self.warn_unobserved || cell.taken {
            return;
        }
        if let Some(outcome) = &cell.outcome {
            if matches!(outcome, Outcome::Err(_) | Outcome::Panicked(_)) {
                tracing::warn!(
                    task = %self.task,
                    outcome = outcome.label(),
                    "task failed but its handle was dropped without joining"
                );
            }
        }
    }
}

/// Future returned by [`TaskHandle::join`].
pub struct JoinFuture<T> {
    cell: SharedCell<T>,
    state: Rc<RefCell<RuntimeState>>,
    joiner: TaskId,
}

impl<T> Future for JoinFuture<T> {
    type Output = Result<Outcome<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(interrupt) = this.state.borrow_mut().take_pending(this.joiner) {
            return Poll::Ready(Err(interrupt.into_error()));
        }
        let mut cell = this.cell.borrow_mut();
        if cell.taken {
            return Poll::Ready(Err(Error::disconnected("join")));
        }
        if let Some(outcome) = cell.outcome.take() {
            cell.taken = true;
            return Poll::Ready(Ok(outcome));
        }
        cell.waiter = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl<T> fmt::Debug for JoinFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinFuture")
            .field("joiner", &self.joiner)
            .finish_non_exhaustive()
    }
}

/// Runs a future while trapping panics in its `poll`.
///
/// The body is boxed, which keeps this wrapper `Unpin` and the whole crate
/// free of pin projection.
pub(crate) struct CatchUnwind<F> {
    inner: Pin<Box<F>>,
}

impl<F> CatchUnwind<F> {
    pub(crate) fn new(future: F) -> Self {
        Self {
            inner: Box::pin(future),
        }
    }
}

impl<F: Future> Future for CatchUnwind<F> {
    type Output = std::thread::Result<F::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match catch_unwind(AssertUnwindSafe(|| this.inner.as_mut().poll(cx))) {
            Ok(Poll::Ready(value)) => Poll::Ready(Ok(value)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(payload) => Poll::Ready(Err(payload)),
        }
    }
}

/// Type-erases a spawned body into a [`TaskFuture`].
///
/// Classifies the body's result into an [`Outcome`], parks it in the shared
/// cell, wakes the joiner, and decides escalation: `Err` and panics
/// escalate only when no handle is left alive to observe them.
pub(crate) fn erase_task<T, F>(cell: SharedCell<T>, body: F) -> TaskFuture
where
    T: 'static,
    F: Future<Output = Result<T>> + 'static,
{
    Box::pin(async move {
        let (outcome, class, escalate) = match CatchUnwind::new(body).await {
            Ok(Ok(value)) => (Outcome::Ok(value), ExitClass::Ok, None),
            Ok(Err(error)) => match error.into_signal() {
                Ok(signal) => (Outcome::Cancelled(signal), ExitClass::Cancelled, None),
                Err(error) => {
                    let escalate = error.clone();
                    (Outcome::Err(error), ExitClass::Err, Some(escalate))
                }
            },
            Err(payload) => {
                let payload = PanicPayload::from_any(payload.as_ref());
                let escalate = Error::panicked(payload.clone());
                (Outcome::Panicked(payload), ExitClass::Panicked, Some(escalate))
            }
        };

        let mut slot = cell.borrow_mut();
        slot.outcome = Some(outcome);
        let escalate = if slot.handle_alive { None } else { escalate };
        let waiter = slot.waiter.take();
        drop(slot);
        if let Some(waker) = waiter {
            waker.wake();
        }

        match escalate {
            Some(error) => TaskExit::escalating(class, error),
            None => TaskExit::new(class),
        }
    })
}

/// Type-erases a deferred body that has no handle.
///
/// Failures are logged and swallowed; deferred work never escalates.
pub(crate) fn erase_detached<F>(body: F) -> TaskFuture
where
    F: Future<Output = Result<()>> + 'static,
{
    Box::pin(async move {
        match CatchUnwind::new(body).await {
            Ok(Ok(())) => TaskExit::new(ExitClass::Ok),
            Ok(Err(error)) => match error.into_signal() {
                Ok(_) => TaskExit::new(ExitClass::Cancelled),
                Err(error) => {
                    tracing::error!(error = %error, "deferred task failed");
                    TaskExit::new(ExitClass::Err)
                }
            },
            Err(payload) => {
                let payload = PanicPayload::from_any(payload.as_ref());
                tracing::error!(%payload, "deferred task panicked");
                TaskExit::new(ExitClass::Panicked)
            }
        }
    })
}
