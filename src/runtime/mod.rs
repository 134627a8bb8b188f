//! The runtime: driver, scheduler state, timers, and task handles.
//!
//! - [`config`]: configuration and the [`RuntimeBuilder`]
//! - `rt`: the driver loop behind [`Runtime::block_on`]
//! - `task_handle`: [`TaskHandle`] and the join machinery
//! - `state`, `sched`, `timer`: the mutable core shared with every
//!   [`Cx`](crate::cx::Cx)
//!
//! # Quick start
//!
//! ```ignore
//! use weft::{Runtime, RuntimeBuilder};
//!
//! let (mut runtime, _lab) = RuntimeBuilder::new().build_lab();
//! let value = runtime.block_on(|cx| async move {
//!     let child = cx.spin(|cx| async move {
//!         cx.yield_now().await?;
//!         Ok(2)
//!     });
//!     Ok(40 + child.join(&cx).await?.into_result()?)
//! })?;
//! assert_eq!(value, 42);
//! ```

pub mod config;

pub(crate) mod sched;
pub(crate) mod state;
pub(crate) mod timer;

mod rt;
mod task_handle;

pub use config::{RuntimeBuilder, RuntimeConfig};
pub use rt::Runtime;
pub use task_handle::{JoinFuture, TaskHandle};

pub(crate) use task_handle::{erase_detached, erase_task, JoinCell};
