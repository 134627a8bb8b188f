//! Runtime configuration.
//!
//! [`RuntimeConfig`] holds the concrete values that drive runtime behavior;
//! [`RuntimeBuilder`] is the usual way to assemble one.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `poll_budget` | 128 |
//! | `trace_capacity` | 1024 |
//! | `metrics_provider` | [`NoOpMetrics`] |
//! | `warn_unobserved_failures` | true |

use crate::metrics::{MetricsProvider, NoOpMetrics};
use crate::reactor::Reactor;
use crate::runtime::Runtime;
use std::sync::Arc;

/// Runtime configuration.
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Tasks polled per driver turn before the reactor gets a look-in.
    pub poll_budget: u32,
    /// Capacity of the in-memory trace ring buffer.
    pub trace_capacity: usize,
    /// Metrics sink for scheduler events.
    pub metrics_provider: Arc<dyn MetricsProvider>,
    /// Log a warning when a failed task's outcome is dropped unobserved.
    pub warn_unobserved_failures: bool,
}

impl RuntimeConfig {
    /// Clamps nonsense values to safe minimums.
    pub fn normalize(&mut self) {
        if self.poll_budget == 0 {
            self.poll_budget = 1;
        }
        if self.trace_capacity == 0 {
            self.trace_capacity = 1;
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_budget: 128,
            trace_capacity: 1024,
            metrics_provider: Arc::new(NoOpMetrics),
            warn_unobserved_failures: true,
        }
    }
}

/// Builder for constructing a runtime with custom configuration.
#[derive(Clone, Default)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
}

impl RuntimeBuilder {
    /// Builder starting from the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-turn poll budget.
    #[must_use]
    pub fn poll_budget(mut self, budget: u32) -> Self {
        self.config.poll_budget = budget;
        self
    }

    /// Sets the trace ring buffer capacity.
    #[must_use]
    pub fn trace_capacity(mut self, capacity: usize) -> Self {
        self.config.trace_capacity = capacity;
        self
    }

    /// Installs a metrics sink.
    #[must_use]
    pub fn metrics_provider(mut self, provider: Arc<dyn MetricsProvider>) -> Self {
        self.config.metrics_provider = provider;
        self
    }

    /// Enables or disables the unobserved-failure warning.
    #[must_use]
    pub fn warn_unobserved_failures(mut self, warn: bool) -> Self {
        self.config.warn_unobserved_failures = warn;
        self
    }

    /// Builds a runtime over the given reactor.
    #[must_use]
    pub fn build(mut self, reactor: Box<dyn Reactor>) -> Runtime {
        self.config.normalize();
        Runtime::with_config(self.config, reactor)
    }

    /// Builds a runtime over a fresh lab reactor, returning its scripting
    /// handle alongside.
    #[must_use]
    pub fn build_lab(self) -> (Runtime, crate::reactor::LabHandle) {
        let (reactor, handle) = crate::reactor::LabReactor::new();
        (self.build(Box::new(reactor)), handle)
    }
}
