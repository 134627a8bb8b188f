//! Run queue and task waker.
//!
//! The queue is FIFO with membership dedup: waking a task twice before it
//! runs schedules it once. It sits behind a `Mutex` purely because the
//! standard `Waker` contract demands `Send + Sync`; within this runtime the
//! lock is never contended, all pushes and pops happen on the one thread.

use crate::types::TaskId;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::Wake;

#[derive(Debug, Default)]
struct QueueInner {
    order: VecDeque<TaskId>,
    queued: HashSet<TaskId>,
}

/// FIFO run queue with at-most-once membership.
#[derive(Debug, Default)]
pub(crate) struct RunQueue {
    inner: Mutex<QueueInner>,
}

impl RunQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues `task` unless it is already waiting. Returns `true` when the
    /// task was newly queued.
    pub(crate) fn push(&self, task: TaskId) -> bool {
        let mut inner = self.lock();
        if inner.queued.insert(task) {
            inner.order.push_back(task);
            true
        } else {
            false
        }
    }

    pub(crate) fn pop(&self) -> Option<TaskId> {
        let mut inner = self.lock();
        let task = inner.order.pop_front()?;
        inner.queued.remove(&task);
        Some(task)
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn contains(&self, task: TaskId) -> bool {
        self.lock().queued.contains(&task)
    }
}

/// Wakes a task by putting it back on the run queue.
///
/// Built fresh for each poll; a waker that outlives its task wakes a stale
/// id, which the dispatcher skips when the record lookup fails.
pub(crate) struct TaskWaker {
    pub(crate) task: TaskId,
    pub(crate) queue: Arc<RunQueue>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.queue.push(self.task);
    }
}
