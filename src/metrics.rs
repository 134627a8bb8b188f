//! Runtime metrics.
//!
//! The runtime reports scheduler activity through a [`MetricsProvider`]
//! injected at build time. The default is [`NoOpMetrics`]; [`RuntimeMetrics`]
//! is an atomic-counter implementation suitable for tests and embedding.

use crate::pool::OpKind;
use crate::types::{SignalKind, TaskId};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Increments by 1.
    pub fn increment(&self) {
        self.add(1);
    }

    /// Adds `value`.
    pub fn add(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A gauge that can move in both directions.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    /// Increments by 1.
    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements by 1.
    pub fn decrement(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Callback sink for runtime events that are worth counting.
///
/// All methods default to no-ops so implementations opt into the events they
/// care about.
pub trait MetricsProvider: Send + Sync + 'static {
    /// A task record was created.
    fn task_spawned(&self, task: TaskId) {
        let _ = task;
    }

    /// A task reached a terminal state.
    fn task_completed(&self, task: TaskId, outcome: &'static str, lifetime: Duration) {
        let _ = (task, outcome, lifetime);
    }

    /// An operation context was acquired; `reused` distinguishes a recycled
    /// slot from fresh growth.
    fn op_acquired(&self, kind: OpKind, reused: bool) {
        let _ = (kind, reused);
    }

    /// The reactor completed an operation.
    fn op_completed(&self, kind: OpKind) {
        let _ = kind;
    }

    /// An awaiting task walked away from an in-flight operation.
    fn op_abandoned(&self, kind: OpKind) {
        let _ = kind;
    }

    /// An operation context returned to the free set.
    fn op_released(&self, kind: OpKind) {
        let _ = kind;
    }

    /// A cancellation signal was stored in a pending slot.
    fn signal_injected(&self, kind: SignalKind) {
        let _ = kind;
    }

    /// A timer fired.
    fn timer_fired(&self) {}

    /// A throttler paced an iteration.
    fn throttle_waited(&self, wait: Duration) {
        let _ = wait;
    }
}

/// Metrics sink that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpMetrics;

impl MetricsProvider for NoOpMetrics {}

/// Atomic-counter metrics, readable at any time.
#[derive(Debug, Default)]
pub struct RuntimeMetrics {
    /// Tasks ever spawned.
    pub tasks_spawned: Counter,
    /// Tasks that reached a terminal state.
    pub tasks_completed: Counter,
    /// Currently live tasks.
    pub live_tasks: Gauge,
    /// Operation contexts acquired, fresh or reused.
    pub ops_acquired: Counter,
    /// Acquisitions that recycled a free slot.
    pub ops_reused: Counter,
    /// Operations abandoned by an interrupted awaiter.
    pub ops_abandoned: Counter,
    /// Currently in-flight operations.
    pub active_ops: Gauge,
    /// Signals stored into pending slots.
    pub signals_injected: Counter,
    /// Timers fired.
    pub timers_fired: Counter,
    /// Throttle pauses taken.
    pub throttle_waits: Counter,
}

impl RuntimeMetrics {
    /// Fresh zeroed metrics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsProvider for RuntimeMetrics {
    fn task_spawned(&self, _task: TaskId) {
        self.tasks_spawned.increment();
        self.live_tasks.increment();
    }

    fn task_completed(&self, _task: TaskId, _outcome: &'static str, _lifetime: Duration) {
        self.tasks_completed.increment();
        self.live_tasks.decrement();
    }

    fn op_acquired(&self, _kind: OpKind, reused: bool) {
        self.ops_acquired.increment();
        if reused {
            self.ops_reused.increment();
        }
        self.active_ops.increment();
    }

    fn op_abandoned(&self, _kind: OpKind) {
        self.ops_abandoned.increment();
    }

    fn op_released(&self, _kind: OpKind) {
        self.active_ops.decrement();
    }

    fn signal_injected(&self, _kind: SignalKind) {
        self.signals_injected.increment();
    }

    fn timer_fired(&self) {
        self.timers_fired.increment();
    }

    fn throttle_waited(&self, _wait: Duration) {
        self.throttle_waits.increment();
    }
}
