//! Error types and error handling strategy.
//!
//! Principles:
//!
//! - Errors are explicit and typed; nothing stringly-typed crosses a task
//!   boundary
//! - Cancellation travels as an error value carrying its [`CancelSignal`], so
//!   scopes can match it to themselves and everything else can propagate it
//!   with `?`
//! - Panics never unwind into the scheduler; they are caught at the task
//!   boundary and reappear only as `Panicked` outcomes or errors
//! - Errors that cross task boundaries carry the originating task's logical
//!   call chain for display

use crate::types::signal::CancelSignal;
use crate::types::ScopeId;
use crate::types::outcome::PanicPayload;
use crate::trace::SpawnTrace;
use core::fmt;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An asynchronous operation failed; the reactor's negative result code
    /// is attached.
    Io,
    /// An injected cancellation signal unwound the current call.
    Cancelled,
    /// A `timeout` scope expired. Distinguished from plain cancellation and
    /// from I/O failure.
    TimedOut,
    /// A mailbox message was not of the requested type.
    MailboxTypeMismatch,
    /// The peer task is gone (send to or join on an exited task).
    Disconnected,
    /// A joined task panicked.
    Panicked,
    /// The runtime stalled: tasks are waiting but nothing can wake them.
    Deadlock,
    /// The runtime is tearing down; no new work is accepted.
    Shutdown,
    /// Runtime invariant violation (bug).
    Internal,
}

/// Coarse grouping of error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Reactor-reported operation failures.
    Io,
    /// Cancellation and timeout control flow.
    Cancellation,
    /// Mailbox and join traffic.
    Messaging,
    /// Runtime lifecycle conditions.
    Lifecycle,
    /// Bugs.
    Internal,
}

impl ErrorKind {
    /// The category this kind belongs to.
    #[must_use]
    pub const fn category(self) -> ErrorCategory {
        match self {
            Self::Io => ErrorCategory::Io,
            Self::Cancelled | Self::TimedOut => ErrorCategory::Cancellation,
            Self::MailboxTypeMismatch | Self::Disconnected | Self::Panicked => {
                ErrorCategory::Messaging
            }
            Self::Deadlock | Self::Shutdown => ErrorCategory::Lifecycle,
            Self::Internal => ErrorCategory::Internal,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "i/o failure"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::TimedOut => write!(f, "timed out"),
            Self::MailboxTypeMismatch => write!(f, "mailbox type mismatch"),
            Self::Disconnected => write!(f, "peer task gone"),
            Self::Panicked => write!(f, "task panicked"),
            Self::Deadlock => write!(f, "deadlock"),
            Self::Shutdown => write!(f, "shutting down"),
            Self::Internal => write!(f, "internal error"),
        }
    }
}

/// The crate-wide error type.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    code: Option<i32>,
    signal: Option<Box<CancelSignal>>,
    chain: Option<SpawnTrace>,
}

impl Error {
    /// Bare error of the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            code: None,
            signal: None,
            chain: None,
        }
    }

    /// Operation failure carrying the reactor's negative result code.
    #[must_use]
    pub fn io(code: i32) -> Self {
        Self {
            code: Some(code),
            ..Self::new(ErrorKind::Io)
        }
    }

    /// Cancellation unwinding, carrying the injected signal.
    #[must_use]
    pub fn cancelled(signal: CancelSignal) -> Self {
        Self {
            signal: Some(Box::new(signal)),
            ..Self::new(ErrorKind::Cancelled)
        }
    }

    /// Timeout expiry; keeps the canceller's signal for its origin chain.
    #[must_use]
    pub fn timed_out(signal: CancelSignal) -> Self {
        Self {
            signal: Some(Box::new(signal)),
            ..Self::new(ErrorKind::TimedOut)
        }
    }

    /// Typed receive found a message of a different type.
    #[must_use]
    pub fn mailbox_type_mismatch(expected: &'static str) -> Self {
        Self::new(ErrorKind::MailboxTypeMismatch)
            .with_message(format!("expected message of type {expected}"))
    }

    /// The counterpart task no longer exists.
    #[must_use]
    pub fn disconnected(what: &'static str) -> Self {
        Self::new(ErrorKind::Disconnected).with_message(what)
    }

    /// A joined task panicked.
    #[must_use]
    pub fn panicked(payload: PanicPayload) -> Self {
        Self::new(ErrorKind::Panicked).with_message(payload.message().to_owned())
    }

    /// Every task is waiting and nothing can wake them.
    #[must_use]
    pub fn deadlock() -> Self {
        Self::new(ErrorKind::Deadlock)
            .with_message("all tasks suspended with no pending operations or timers")
    }

    /// Work submitted during teardown.
    #[must_use]
    pub fn shutdown() -> Self {
        Self::new(ErrorKind::Shutdown)
    }

    /// Invariant violation.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(msg)
    }

    /// Attaches or replaces the human-readable message.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Attaches the logical call chain of the task the error arose in.
    #[must_use]
    pub fn with_chain(mut self, chain: SpawnTrace) -> Self {
        self.chain = Some(chain);
        self
    }

    /// The error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The reactor result code, for `Io` errors.
    #[must_use]
    pub const fn code(&self) -> Option<i32> {
        self.code
    }

    /// The cancellation signal, for `Cancelled`/`TimedOut` errors.
    #[must_use]
    pub fn signal(&self) -> Option<&CancelSignal> {
        self.signal.as_deref()
    }

    /// The originating task's logical call chain, if attached.
    #[must_use]
    pub const fn chain(&self) -> Option<&SpawnTrace> {
        self.chain.as_ref()
    }

    /// True for signal-driven unwinding (`Cancelled`), which scopes may
    /// consume. `TimedOut` is a real error and returns false.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// True when this is a cancellation addressed to `scope`.
    #[must_use]
    pub fn matches_scope(&self, scope: ScopeId) -> bool {
        self.is_cancellation()
            && self
                .signal
                .as_deref()
                .is_some_and(|signal| signal.matches_scope(scope))
    }

    /// Consumes the error, yielding its signal if it is a cancellation.
    ///
    /// # Errors
    ///
    /// Returns the error unchanged when it carries no signal.
    pub fn into_signal(self) -> std::result::Result<CancelSignal, Self> {
        if self.is_cancellation() {
            if let Some(signal) = self.signal {
                return Ok(*signal);
            }
        }
        Err(self)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(code) = self.code {
            write!(f, " (os error {code})")?;
        }
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        if let Some(signal) = &self.signal {
            write!(f, " [{signal}]")?;
        }
        if let Some(chain) = &self.chain {
            if !chain.is_root() {
                write!(f, "; in task {chain}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::signal::SignalKind;

    #[test]
    fn io_error_keeps_the_code() {
        let err = Error::io(-11);
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.code(), Some(-11));
        assert!(err.to_string().contains("os error -11"));
    }

    #[test]
    fn cancellation_matches_its_scope_only() {
        let scope = ScopeId::new_for_test(4);
        let err = Error::cancelled(CancelSignal::deadline(
            SignalKind::Cancel,
            scope,
            SpawnTrace::root(),
        ));
        assert!(err.is_cancellation());
        assert!(err.matches_scope(scope));
        assert!(!err.matches_scope(ScopeId::new_for_test(5)));
    }

    #[test]
    fn timed_out_is_not_a_consumable_cancellation() {
        let scope = ScopeId::new_for_test(4);
        let err = Error::timed_out(CancelSignal::deadline(
            SignalKind::Cancel,
            scope,
            SpawnTrace::root(),
        ));
        assert!(!err.is_cancellation());
        assert!(!err.matches_scope(scope));
        assert_eq!(err.kind(), ErrorKind::TimedOut);
        assert!(err.signal().is_some());
    }

    #[test]
    fn into_signal_round_trips_cancellations() {
        let signal = CancelSignal::handle_cancel(SpawnTrace::root());
        let signal = Error::cancelled(signal).into_signal().unwrap();
        assert_eq!(signal.kind, SignalKind::Cancel);

        let err = Error::io(-5).into_signal().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn categories_partition_the_kinds() {
        assert_eq!(ErrorKind::Io.category(), ErrorCategory::Io);
        assert_eq!(ErrorKind::TimedOut.category(), ErrorCategory::Cancellation);
        assert_eq!(ErrorKind::Disconnected.category(), ErrorCategory::Messaging);
        assert_eq!(ErrorKind::Deadlock.category(), ErrorCategory::Lifecycle);
        assert_eq!(ErrorKind::Internal.category(), ErrorCategory::Internal);
    }
}
