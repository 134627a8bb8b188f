//! Core types.
//!
//! - [`id`]: identifiers (`TaskId`, `OpId`, `ScopeId`, `TimerId`) and the
//!   runtime clock ([`Time`])
//! - [`signal`]: out-of-band cancellation signals and the pending-slot
//!   [`Interrupt`]
//! - [`outcome`]: four-valued terminal task results

pub mod id;
pub mod outcome;
pub mod signal;

pub use id::{OpId, ScopeId, TaskId, Time, TimerId};
pub use outcome::{Outcome, PanicPayload};
pub use signal::{CancelSignal, Interrupt, SignalKind, SignalSource};
