//! Out-of-band cancellation signals.
//!
//! A [`CancelSignal`] is not an error: it is a control-flow value injected
//! into a task from outside and observed only at suspension points. The
//! blocking primitive that observes it unwinds the task body as an `Err`,
//! which the innermost matching scope then consumes (or, if nothing matches,
//! the task boundary reports it as a cancelled exit).

use super::ScopeId;
use crate::trace::SpawnTrace;
use core::fmt;

/// What the injector wants the target to do.
///
/// Ordering is severity: `Cancel` outranks `MoveOn` when two signals collide
/// in a task's pending slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignalKind {
    /// Unwind benignly; the matching scope substitutes its default value.
    MoveOn,
    /// Unwind and surface a cancellation; the scope converts it to a
    /// distinguished error (or the task exits cancelled).
    Cancel,
}

impl SignalKind {
    /// True when `self` takes precedence over `other` in the pending slot.
    #[must_use]
    pub fn outranks(self, other: Self) -> bool {
        self > other
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancel => write!(f, "cancel"),
            Self::MoveOn => write!(f, "move-on"),
        }
    }
}

/// Why the signal was injected. Diagnostic only; delivery and scope matching
/// never branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalSource {
    /// A scope's deadline expired.
    Deadline,
    /// `TaskHandle::cancel` / `TaskHandle::interrupt`.
    Handle,
    /// A supervised sibling failed.
    SiblingFailed,
    /// Runtime teardown.
    Shutdown,
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deadline => write!(f, "deadline"),
            Self::Handle => write!(f, "handle"),
            Self::SiblingFailed => write!(f, "sibling failed"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// An injected cancellation, carrying enough provenance to explain itself.
///
/// `scope` identifies the cancellation scope the signal belongs to; only that
/// scope consumes it. Handle- and supervisor-injected signals carry no scope
/// and therefore unwind the whole task. `origin` is the injector's logical
/// call chain, spliced into whatever error ultimately surfaces.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    /// Cancel or move-on.
    pub kind: SignalKind,
    /// Provenance of the injection.
    pub source: SignalSource,
    /// Scope the signal is addressed to, if any.
    pub scope: Option<ScopeId>,
    /// Logical call chain of the injector.
    pub origin: SpawnTrace,
}

impl CancelSignal {
    /// Signal fired by a scope's deadline timer.
    #[must_use]
    pub fn deadline(kind: SignalKind, scope: ScopeId, origin: SpawnTrace) -> Self {
        Self {
            kind,
            source: SignalSource::Deadline,
            scope: Some(scope),
            origin,
        }
    }

    /// Hard cancel from a task handle; no scope consumes it.
    #[must_use]
    pub fn handle_cancel(origin: SpawnTrace) -> Self {
        Self {
            kind: SignalKind::Cancel,
            source: SignalSource::Handle,
            scope: None,
            origin,
        }
    }

    /// Benign stop from a task handle; no scope consumes it.
    #[must_use]
    pub fn handle_interrupt(origin: SpawnTrace) -> Self {
        Self {
            kind: SignalKind::MoveOn,
            source: SignalSource::Handle,
            scope: None,
            origin,
        }
    }

    /// Cancel injected by a supervisor after a sibling failure.
    #[must_use]
    pub fn sibling_failed(origin: SpawnTrace) -> Self {
        Self {
            kind: SignalKind::Cancel,
            source: SignalSource::SiblingFailed,
            scope: None,
            origin,
        }
    }

    /// Cancel injected during runtime teardown.
    #[must_use]
    pub fn shutdown() -> Self {
        Self {
            kind: SignalKind::Cancel,
            source: SignalSource::Shutdown,
            scope: None,
            origin: SpawnTrace::root(),
        }
    }

    /// True when this signal is addressed to `scope`.
    #[must_use]
    pub fn matches_scope(&self, scope: ScopeId) -> bool {
        self.scope == Some(scope)
    }

    /// Merges `candidate` into an occupied pending slot.
    ///
    /// A task holds at most one pending signal. A `Cancel` replaces a pending
    /// `MoveOn`; otherwise the incumbent stays. Returns `true` when the slot
    /// changed.
    pub fn strengthen(&mut self, candidate: Self) -> bool {
        if candidate.kind.outranks(self.kind) {
            *self = candidate;
            true
        } else {
            false
        }
    }
}

impl fmt::Display for CancelSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.source)?;
        if let Some(scope) = self.scope {
            write!(f, " for {scope}")?;
        }
        if !self.origin.is_root() {
            write!(f, ", injected by task {}", self.origin)?;
        }
        Ok(())
    }
}

/// What a suspended task finds in its pending slot when it next checks.
///
/// Signals come from cancellation machinery; escalations carry an unhandled
/// failure from a finished child whose handle nobody held.
#[derive(Debug)]
pub enum Interrupt {
    /// An injected cancellation signal.
    Signal(CancelSignal),
    /// A child task's unhandled failure, re-raised in this task.
    Escalation(crate::error::Error),
}

impl Interrupt {
    /// The error a suspension point surfaces when it observes this interrupt.
    #[must_use]
    pub fn into_error(self) -> crate::error::Error {
        match self {
            Self::Signal(signal) => crate::error::Error::cancelled(signal),
            Self::Escalation(error) => error,
        }
    }

    /// The signal kind carried, if this is a cancellation.
    #[must_use]
    pub fn signal_kind(&self) -> Option<SignalKind> {
        match self {
            Self::Signal(signal) => Some(signal.kind),
            Self::Escalation(_) => None,
        }
    }
}
