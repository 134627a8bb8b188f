//! Terminal task results.
//!
//! Every task finishes in exactly one of four ways:
//!
//! - `Ok(T)`: the body returned a value
//! - `Err(Error)`: the body returned an error
//! - `Cancelled(CancelSignal)`: an injected signal unwound the body
//! - `Panicked(PanicPayload)`: the body panicked; the panic was caught at the
//!   task boundary and never entered the scheduler
//!
//! Severity orders them `Ok < Err < Cancelled < Panicked`; a supervisor
//! re-raising one failure among many picks by first occurrence, not severity,
//! but diagnostics use the severity label.

use super::signal::CancelSignal;
use crate::error::Error;
use core::fmt;
use std::any::Any;

/// Stringified payload of a caught panic, safe to carry across task records.
#[derive(Debug, Clone)]
pub struct PanicPayload {
    message: String,
}

impl PanicPayload {
    /// Wraps a panic message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Extracts a printable message from a raw `catch_unwind` payload.
    ///
    /// Panics raised with `panic!("...")` carry `&str` or `String`; anything
    /// else is opaque and reported as such.
    #[must_use]
    pub fn from_any(payload: &(dyn Any + Send)) -> Self {
        if let Some(s) = payload.downcast_ref::<&str>() {
            Self::new(*s)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            Self::new(s.clone())
        } else {
            Self::new("non-string panic payload")
        }
    }

    /// The panic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.message)
    }
}

/// The four-valued terminal state of a task.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The body returned a value.
    Ok(T),
    /// The body returned an error.
    Err(Error),
    /// An injected signal unwound the body.
    Cancelled(CancelSignal),
    /// The body panicked.
    Panicked(PanicPayload),
}

impl<T> Outcome<T> {
    /// Severity rank: 0 = Ok through 3 = Panicked.
    #[must_use]
    pub const fn severity(&self) -> u8 {
        match self {
            Self::Ok(_) => 0,
            Self::Err(_) => 1,
            Self::Cancelled(_) => 2,
            Self::Panicked(_) => 3,
        }
    }

    /// Stable label for traces and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Ok(_) => "ok",
            Self::Err(_) => "err",
            Self::Cancelled(_) => "cancelled",
            Self::Panicked(_) => "panicked",
        }
    }

    /// True for `Ok`.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// True for `Cancelled`.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// True for anything other than `Ok`.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        !self.is_ok()
    }

    /// Maps the success value, leaving failures untouched.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Self::Ok(v) => Outcome::Ok(f(v)),
            Self::Err(e) => Outcome::Err(e),
            Self::Cancelled(s) => Outcome::Cancelled(s),
            Self::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Collapses into a `Result`, converting the non-`Ok` arms into [`Error`]s.
    pub fn into_result(self) -> Result<T, Error> {
        match self {
            Self::Ok(v) => Ok(v),
            Self::Err(e) => Err(e),
            Self::Cancelled(signal) => Err(Error::cancelled(signal)),
            Self::Panicked(payload) => Err(Error::panicked(payload)),
        }
    }

    /// The success value, if any, by reference.
    #[must_use]
    pub const fn as_ok(&self) -> Option<&T> {
        match self {
            Self::Ok(v) => Some(v),
            _ => None,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok(v) => write!(f, "ok: {v}"),
            Self::Err(e) => write!(f, "err: {e}"),
            Self::Cancelled(s) => write!(f, "cancelled: {s}"),
            Self::Panicked(p) => write!(f, "{p}"),
        }
    }
}
