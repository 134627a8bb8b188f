//! Diagnostics that survive suspension boundaries.
//!
//! Two unrelated-looking pieces live here because both answer "what led to
//! this?" after the native stack has been unwound by a suspension:
//!
//! - [`spawn`]: logical call chains, the spawn-site lineage attached to every
//!   task and spliced into errors and cancellation signals
//! - [`event`] / [`buffer`]: the structured event record of scheduler,
//!   signal, pool, and timer activity, kept in a bounded ring

pub mod buffer;
pub mod event;
pub mod spawn;

pub use buffer::TraceBuffer;
pub use event::{TraceData, TraceEvent, TraceEventKind};
pub use spawn::SpawnTrace;
