//! Fail-fast supervision over groups of child tasks.
//!
//! A [`Supervisor`] collects the handles of related children and
//! [`join_all`](Supervisor::join_all) waits for the whole group. The group
//! has one collective outcome: if every child succeeds, the values come
//! back in registration order; the first child to fail gets its error
//! re-raised to the caller, after the supervisor has cancelled the
//! remaining siblings and waited for them to unwind. The caller never sees
//! a partial success.
//!
//! Completion order does not matter, registration order does: results and
//! the choice of "first failure" both follow the order handles were added.

use crate::cx::Cx;
use crate::error::{Error, Result};
use crate::runtime::state::RuntimeState;
use crate::runtime::TaskHandle;
use crate::types::{CancelSignal, Interrupt, Outcome, TaskId};

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// An ordered group of child task handles joined as one unit.
pub struct Supervisor<T> {
    children: Vec<TaskHandle<T>>,
}

impl<T> Supervisor<T> {
    /// An empty group. Joining it resolves immediately with no results.
    #[must_use]
    pub fn new() -> Self {
        Self {
            children: Vec::new(),
        }
    }

    /// Adds an already spawned child to the group.
    pub fn add(&mut self, handle: TaskHandle<T>) {
        self.children.push(handle);
    }

    /// Spawns a child with [`Cx::spin`] and registers it in one step.
    #[track_caller]
    pub fn spin<F, Fut>(&mut self, cx: &Cx, f: F)
    where
        T: 'static,
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = Result<T>> + 'static,
    {
        self.add(cx.spin(f));
    }

    /// Number of registered children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// True when no children have been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Waits for every child to resolve.
    ///
    /// Returns the children's values in registration order, or the first
    /// failure after the rest of the group has been cancelled and drained.
    /// Awaiting the group is a suspension point for the calling task.
    pub fn join_all(self, cx: &Cx) -> SuperviseFuture<T> {
        SuperviseFuture {
            state: Rc::clone(&cx.state),
            owner: cx.task,
            children: self
                .children
                .into_iter()
                .map(|handle| ChildSlot {
                    handle,
                    value: None,
                    resolved: false,
                })
                .collect(),
            failure: None,
        }
    }
}

impl<T> Default for Supervisor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Supervisor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("children", &self.children.len())
            .finish()
    }
}

struct ChildSlot<T> {
    handle: TaskHandle<T>,
    value: Option<T>,
    resolved: bool,
}

/// Future returned by [`Supervisor::join_all`] and [`Cx::supervise`].
#[must_use = "futures do nothing unless awaited"]
pub struct SuperviseFuture<T> {
    state: Rc<RefCell<RuntimeState>>,
    owner: TaskId,
    children: Vec<ChildSlot<T>>,
    /// First failure seen; set means the group is draining.
    failure: Option<Error>,
}

impl<T> SuperviseFuture<T> {
    /// Records the group's first failure and cancels everything still
    /// running. Failures during the drain keep the original.
    fn fail(&mut self, error: Error) {
        if self.failure.is_some() {
            return;
        }
        tracing::debug!(
            supervisor = %self.owner,
            error = %error,
            "supervised child failed, cancelling siblings"
        );
        let mut state = self.state.borrow_mut();
        let origin = state.current_trace();
        for slot in self.children.iter().filter(|slot| !slot.resolved) {
            state.inject(
                slot.handle.id(),
                Interrupt::Signal(CancelSignal::sibling_failed(origin.clone())),
            );
        }
        self.failure = Some(error);
    }

    /// Takes the whole group down when the supervising task itself is
    /// interrupted mid-join.
    fn cancel_unresolved(&self) {
        let mut state = self.state.borrow_mut();
        let origin = state.current_trace();
        for slot in self.children.iter().filter(|slot| !slot.resolved) {
            state.inject(
                slot.handle.id(),
                Interrupt::Signal(CancelSignal::handle_cancel(origin.clone())),
            );
        }
    }
}

// The children's values are plain storage moved by value, never pinned, so
// the future stays `Unpin` for every `T` like the crate's other wrappers.
impl<T> Unpin for SuperviseFuture<T> {}

impl<T> Future for SuperviseFuture<T> {
    type Output = Result<Vec<T>>;

    fn poll(self: Pin<&mut Self>, task_cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let pending = this.state.borrow_mut().take_pending(this.owner);
        if let Some(interrupt) = pending {
            this.cancel_unresolved();
            return Poll::Ready(Err(interrupt.into_error()));
        }

        for index in 0..this.children.len() {
            if this.children[index].resolved {
                continue;
            }
            let Some(outcome) = this.children[index].handle.try_take_outcome() else {
                continue;
            };
            this.children[index].resolved = true;
            match outcome {
                Outcome::Ok(value) => this.children[index].value = Some(value),
                Outcome::Err(error) => this.fail(error),
                Outcome::Cancelled(signal) => this.fail(Error::cancelled(signal)),
                Outcome::Panicked(payload) => this.fail(Error::panicked(payload)),
            }
        }

        if this.children.iter().all(|slot| slot.resolved) {
            if let Some(error) = this.failure.take() {
                return Poll::Ready(Err(error));
            }
            let mut values = Vec::with_capacity(this.children.len());
            for slot in &mut this.children {
                match slot.value.take() {
                    Some(value) => values.push(value),
                    None => {
                        return Poll::Ready(Err(Error::internal(
                            "supervised child resolved without a value",
                        )))
                    }
                }
            }
            return Poll::Ready(Ok(values));
        }

        for slot in this.children.iter().filter(|slot| !slot.resolved) {
            slot.handle.register_waiter(task_cx.waker());
        }
        Poll::Pending
    }
}

impl<T> fmt::Debug for SuperviseFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resolved = self.children.iter().filter(|slot| slot.resolved).count();
        f.debug_struct("SuperviseFuture")
            .field("owner", &self.owner)
            .field("children", &self.children.len())
            .field("resolved", &resolved)
            .field("draining", &self.failure.is_some())
            .finish()
    }
}

impl Cx {
    /// Joins a group of already spawned children with fail-fast semantics.
    ///
    /// Sugar for feeding the handles through a [`Supervisor`]; see
    /// [`Supervisor::join_all`] for the group contract.
    pub fn supervise<T>(&self, children: Vec<TaskHandle<T>>) -> SuperviseFuture<T> {
        let mut group = Supervisor::new();
        for handle in children {
            group.add(handle);
        }
        group.join_all(self)
    }
}
