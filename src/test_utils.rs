//! Test utilities.
//!
//! Shared helpers for unit and integration tests:
//! - Consistent tracing-based logging initialization
//! - Phase/section macros for readable test output
//! - Lab runtime constructors and async test runners
//! - Outcome assertion macros
//!
//! # Example
//! ```
//! use weft::test_utils::{init_test_logging, run_test};
//!
//! init_test_logging();
//! let value = run_test(|cx| async move {
//!     cx.checkpoint().await?;
//!     Ok(2 + 2)
//! });
//! assert_eq!(value, 4);
//! ```

use crate::cx::Cx;
use crate::error::Result;
use crate::reactor::LabHandle;
use crate::runtime::{Runtime, RuntimeBuilder};
use std::future::Future;
use std::sync::Once;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Create a lab-backed runtime with a larger trace buffer for debugging.
#[must_use]
pub fn lab_with_tracing() -> (Runtime, LabHandle) {
    RuntimeBuilder::new().trace_capacity(64 * 1024).build_lab()
}

/// Run an async test body on a fresh lab runtime, panicking on error.
///
/// For tests that only need the happy path; keep the runtime and
/// [`LabHandle`] yourself when the test scripts completions or inspects
/// virtual time.
pub fn run_test<T, F, Fut>(f: F) -> T
where
    T: 'static,
    F: FnOnce(Cx) -> Fut,
    Fut: Future<Output = Result<T>> + 'static,
{
    init_test_logging();
    let (mut runtime, _lab) = Runtime::lab();
    match runtime.block_on(f) {
        Ok(value) => value,
        Err(error) => panic!("test body failed: {error}"),
    }
}

/// Assert that an async operation completes within a virtual-time budget.
pub async fn assert_completes_within<T, F>(
    cx: &Cx,
    within: Duration,
    description: &str,
    body: F,
) -> T
where
    F: Future<Output = Result<T>>,
{
    match cx.timeout(within, body).await {
        Ok(value) => {
            tracing::debug!(
                description = %description,
                within_ms = within.as_millis(),
                "operation completed within deadline"
            );
            value
        }
        Err(error) => panic!("operation '{description}' did not complete within {within:?}: {error}"),
    }
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $actual:expr) => {
        tracing::debug!(actual = ?$actual, "asserting: {}", $msg);
        assert!($cond, "{}: got {:?}", $msg, $actual);
    };
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

/// Assert that an outcome is Ok with a specific value.
#[macro_export]
macro_rules! assert_outcome_ok {
    ($outcome:expr, $expected:expr) => {
        match $outcome {
            $crate::types::Outcome::Ok(v) => assert_eq!(v, $expected),
            other => unreachable!("expected Outcome::Ok({:?}), got {:?}", $expected, other),
        }
    };
}

/// Assert that an outcome is Cancelled.
#[macro_export]
macro_rules! assert_outcome_cancelled {
    ($outcome:expr) => {
        match $outcome {
            $crate::types::Outcome::Cancelled(_) => {}
            other => unreachable!("expected Outcome::Cancelled, got {:?}", other),
        }
    };
}

/// Assert that an outcome is Err.
#[macro_export]
macro_rules! assert_outcome_err {
    ($outcome:expr) => {
        match $outcome {
            $crate::types::Outcome::Err(_) => {}
            other => unreachable!("expected Outcome::Err, got {:?}", other),
        }
    };
}

/// Assert that an outcome is Panicked.
#[macro_export]
macro_rules! assert_outcome_panicked {
    ($outcome:expr) => {
        match $outcome {
            $crate::types::Outcome::Panicked(_) => {}
            other => unreachable!("expected Outcome::Panicked, got {:?}", other),
        }
    };
}
