//! Reactor abstraction.
//!
//! The runtime never talks to the OS directly. It hands generation-stamped
//! [`OpId`]s to a [`Reactor`], and the reactor hands back raw completions in
//! its own good time. Payloads (descriptors, buffers, addresses) are the
//! reactor's business; the runtime only tracks identity, ownership, and the
//! `i32` result.
//!
//! The in-tree implementation is [`LabReactor`]: virtual time plus scripted
//! completions, which is what every test in this crate runs on.

mod lab;

pub use lab::{LabHandle, LabReactor};

use crate::pool::OpKind;
use crate::types::{OpId, Time};

/// Result code a cancelled operation completes with, following the kernel
/// convention of negated errno values.
pub const ECANCELED: i32 = 125;

/// A raw completion surfaced by [`Reactor::drive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpCompletion {
    /// The context the reactor was driving.
    pub op: OpId,
    /// Non-negative count on success, negated errno on failure.
    pub result: i32,
}

/// The event source the runtime drives.
///
/// A reactor owns the clock and the in-flight operations. The runtime calls
/// [`drive`](Reactor::drive) when it runs out of runnable tasks; the reactor
/// may block (wall-clock implementations) or advance virtual time (the lab)
/// until `until`, then report whatever completed.
///
/// Completions may arrive at any later drive, in any order, including for
/// operations the runtime has since abandoned. The pool's generation check
/// makes late and duplicate completions harmless, so reactors are free to be
/// sloppy about cancellation timing.
pub trait Reactor {
    /// The reactor's current clock reading.
    fn now(&self) -> Time;

    /// Starts driving an operation under `op`.
    fn submit(&mut self, op: OpId, kind: OpKind) -> crate::error::Result<()>;

    /// Asks for an in-flight operation to finish early. Best effort: the
    /// completion still arrives, typically with `-ECANCELED`.
    fn cancel(&mut self, op: OpId);

    /// Waits for completions.
    ///
    /// - `Some(t)`: return once `t` is reached, possibly with nothing.
    /// - `None`: wait indefinitely for the next completion. A reactor with
    ///   nothing in flight returns empty immediately, which the runtime
    ///   treats as a deadlock.
    fn drive(&mut self, until: Option<Time>) -> Vec<OpCompletion>;

    /// Operations accepted and not yet delivered through
    /// [`drive`](Reactor::drive), including any already completed but still
    /// undrained. Zero tells the runtime no completion can ever arrive.
    fn in_flight(&self) -> usize;
}
