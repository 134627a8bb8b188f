//! Weft: a single-threaded cooperative concurrency runtime.
//!
//! # Overview
//!
//! Weft schedules many tasks on one thread. Concurrency is interleaving,
//! never parallelism: a task runs uninterrupted between explicit suspension
//! points, and at each suspension point the runtime may run someone else or
//! deliver a cancellation. I/O goes through pooled operation contexts handed
//! to a pluggable [`Reactor`]; the in-tree reactor is a deterministic
//! virtual-time lab, which is what the whole test suite runs on.
//!
//! # Core guarantees
//!
//! - **Explicit suspension**: sleeps, submits, joins, receives and scope
//!   waits are the only places a task can lose the thread or observe a
//!   cancellation signal.
//! - **Structured cancellation**: deadline scopes ([`Cx::cancel_after`],
//!   [`Cx::move_on_after`], [`Cx::timeout`]) resolve exactly once and tear
//!   their canceller down on every exit path.
//! - **No lost failures**: a task failure is observed through its handle,
//!   escalated to its parent, or logged; cancellation is never treated as
//!   a failure.
//! - **Pool hygiene**: every acquired operation context is released exactly
//!   once, surviving cancelled awaiters through abandonment and late
//!   completions through generation-stamped ids.
//!
//! # Module structure
//!
//! - [`runtime`]: the driver loop, task bookkeeping, configuration
//! - [`cx`]: the per-task capability handle and its awaitables
//! - [`pool`]: operation context pool keyed by generation-stamped ids
//! - [`reactor`]: the reactor trait and the deterministic lab reactor
//! - [`supervisor`]: fail-fast join groups over child tasks
//! - [`throttle`]: fixed-rate gating for loop bodies
//! - [`trace`]: in-memory event ring and spawn-site call chains
//! - [`metrics`]: counters the runtime reports into
//! - [`types`]: identifiers, outcomes, cancellation signals
//! - [`error`]: the crate-wide error type
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use weft::Runtime;
//!
//! let (mut runtime, _lab) = Runtime::lab();
//! let greeting = runtime
//!     .block_on(|cx| async move {
//!         let child = cx.spin(|cx| async move {
//!             cx.sleep(Duration::from_millis(10)).await?;
//!             Ok("woven")
//!         });
//!         let outcome = child.join(&cx).await?;
//!         outcome.into_result()
//!     })
//!     .unwrap();
//! assert_eq!(greeting, "woven");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod cx;
pub mod error;
mod mailbox;
pub mod metrics;
pub mod pool;
pub mod reactor;
mod record;
pub mod runtime;
mod scope;
pub mod supervisor;
pub mod test_utils;
pub mod throttle;
pub mod trace;
pub mod types;
pub(crate) mod util;

// Re-exports for convenient access to core types
pub use cx::Cx;
pub use error::{Error, ErrorKind, Result};
pub use metrics::{MetricsProvider, NoOpMetrics, RuntimeMetrics};
pub use pool::OpKind;
pub use reactor::{LabHandle, LabReactor, OpCompletion, Reactor, ECANCELED};
pub use runtime::{JoinFuture, Runtime, RuntimeBuilder, RuntimeConfig, TaskHandle};
pub use supervisor::{SuperviseFuture, Supervisor};
pub use throttle::Throttler;
pub use trace::{SpawnTrace, TraceEvent, TraceEventKind};
pub use types::{
    CancelSignal, Interrupt, Outcome, PanicPayload, ScopeId, SignalKind, TaskId, Time,
};
