//! Per-task message queue.
//!
//! Every task owns a mailbox of type-erased messages, delivered through its
//! handle and drained by the task itself. Receiving is typed: the task names
//! the message type it expects, and a message of any other type is consumed
//! and reported as a mismatch rather than left to clog the queue.

use crate::error::{Error, Result};
use std::any::Any;
use std::collections::VecDeque;
use std::task::Waker;

/// FIFO queue of boxed messages plus the waker of a task suspended on it.
#[derive(Debug, Default)]
pub(crate) struct Mailbox {
    queue: VecDeque<Box<dyn Any>>,
    waiter: Option<Waker>,
}

impl Mailbox {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Messages currently queued.
    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    /// Enqueues a message and hands back the waker to fire, if the owner is
    /// suspended waiting for one.
    pub(crate) fn push(&mut self, message: Box<dyn Any>) -> Option<Waker> {
        self.queue.push_back(message);
        self.waiter.take()
    }

    /// Pops the front message as `M`. `None` means the queue is empty; a
    /// queued message of the wrong type is consumed and returned as an error.
    pub(crate) fn take<M: 'static>(&mut self) -> Option<Result<M>> {
        let message = self.queue.pop_front()?;
        match message.downcast::<M>() {
            Ok(boxed) => Some(Ok(*boxed)),
            Err(_) => Some(Err(Error::mailbox_type_mismatch(
                std::any::type_name::<M>(),
            ))),
        }
    }

    /// Registers the owner's waker for the next delivery.
    pub(crate) fn register(&mut self, waker: &Waker) {
        self.waiter = Some(waker.clone());
    }
}
