//! Deadline scopes: [`Cx::cancel_after`], [`Cx::move_on_after`] and
//! [`Cx::timeout`].
//!
//! A scope arms a companion canceller task that sleeps until the deadline
//! and then injects a signal into the protected task. The protected body
//! observes the signal at its next suspension point and unwinds as an
//! `Err`. On every exit path, whether the body won the race or lost it,
//! the scope stops the canceller and discards a signal that fired but was
//! never observed, so later suspension points cannot trip over a stale
//! deadline. A scope therefore resolves exactly once: the caller sees the
//! body's result or the deadline, never both.
//!
//! Scopes nest. Each signal carries the [`ScopeId`] of the scope that
//! armed it and each scope reacts only to its own id; anything else passes
//! through and keeps unwinding toward the scope it belongs to.

use crate::cx::Cx;
use crate::error::{Error, Result};
use crate::runtime::state::RuntimeState;
use crate::types::{CancelSignal, Interrupt, ScopeId, SignalKind, TaskId};

use std::cell::RefCell;
use std::future::Future;
use std::panic::Location;
use std::rc::Rc;
use std::time::Duration;

impl Cx {
    /// Runs `body` under a hard deadline.
    ///
    /// If the body has not resolved within `after`, a `Cancel` signal is
    /// injected at its next suspension point and the resulting
    /// cancellation error is returned to the caller. A body that finishes
    /// first passes its result through untouched.
    #[track_caller]
    pub fn cancel_after<T, F>(&self, after: Duration, body: F) -> impl Future<Output = Result<T>>
    where
        F: Future<Output = Result<T>>,
    {
        let cx = self.clone();
        let site = Location::caller();
        async move {
            let (_, result) = cx
                .deadline_scope(SignalKind::Cancel, after, site, body)
                .await;
            result
        }
    }

    /// Runs `body` but gives up quietly after `after`.
    ///
    /// A `MoveOn` signal unwinds the body at the deadline and the scope
    /// swallows it, returning `default` instead. Errors the body produces
    /// on its own, including cancellations belonging to an outer scope,
    /// still propagate.
    #[track_caller]
    pub fn move_on_after<T, F>(
        &self,
        after: Duration,
        default: T,
        body: F,
    ) -> impl Future<Output = Result<T>>
    where
        F: Future<Output = Result<T>>,
    {
        let cx = self.clone();
        let site = Location::caller();
        async move {
            let (scope, result) = cx
                .deadline_scope(SignalKind::MoveOn, after, site, body)
                .await;
            match result {
                Err(error) if error.matches_scope(scope) => Ok(default),
                other => other,
            }
        }
    }

    /// Runs `body` under a deadline and reports expiry as a distinct error.
    ///
    /// Same machinery as [`Cx::cancel_after`], but when the deadline is the
    /// reason the body unwound, the caller gets
    /// [`ErrorKind::TimedOut`](crate::error::ErrorKind::TimedOut) carrying
    /// the injected signal's origin chain, so expiry is distinguishable
    /// from both I/O failure and an outer cancellation.
    #[track_caller]
    pub fn timeout<T, F>(&self, after: Duration, body: F) -> impl Future<Output = Result<T>>
    where
        F: Future<Output = Result<T>>,
    {
        let cx = self.clone();
        let site = Location::caller();
        async move {
            let (scope, result) = cx
                .deadline_scope(SignalKind::Cancel, after, site, body)
                .await;
            match result {
                Err(error) if error.matches_scope(scope) => match error.into_signal() {
                    Ok(signal) => Err(Error::timed_out(signal)),
                    Err(error) => Err(error),
                },
                other => other,
            }
        }
    }

    /// Arms a canceller, runs the body, tears the scope down.
    async fn deadline_scope<T, F>(
        &self,
        kind: SignalKind,
        after: Duration,
        site: &'static Location<'static>,
        body: F,
    ) -> (ScopeId, Result<T>)
    where
        F: Future<Output = Result<T>>,
    {
        let scope = self.state.borrow_mut().next_scope_id();
        let deadline = self.now() + after;
        let target = self.task;
        let origin = self.trace().extend(site);
        // The canceller sleeps to the deadline and fires. A disarm
        // interrupt lands in that sleep and makes it exit without firing.
        let canceller = self.defer(move |cx| async move {
            cx.sleep_until(deadline).await?;
            cx.state
                .borrow_mut()
                .inject(target, Interrupt::Signal(CancelSignal::deadline(kind, scope, origin)));
            Ok(())
        });
        let guard = CancellerGuard {
            state: Rc::clone(&self.state),
            canceller,
            target,
            scope,
            armed: true,
        };
        let result = body.await;
        guard.disarm();
        (scope, result)
    }
}

/// Stops the canceller when the scope resolves, on success, error or
/// unwind alike. The drop path covers panics and the scope future being
/// dropped mid-flight; `disarm` is the ordinary exit.
struct CancellerGuard {
    state: Rc<RefCell<RuntimeState>>,
    canceller: TaskId,
    target: TaskId,
    scope: ScopeId,
    armed: bool,
}

impl CancellerGuard {
    fn disarm(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        // The guard can drop while the scheduler holds the state borrow,
        // when the scope future itself is torn down mid-poll.
        let Ok(mut state) = self.state.try_borrow_mut() else {
            return;
        };
        let trace = state.current_trace();
        state.inject(
            self.canceller,
            Interrupt::Signal(CancelSignal::handle_interrupt(trace)),
        );
        state.discard_scope_signal(self.target, self.scope);
    }
}

impl Drop for CancellerGuard {
    fn drop(&mut self) {
        self.teardown();
    }
}
