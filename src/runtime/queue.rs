//! Storage and ready list for tasks spawned on a reactor.
//!
//! Tasks live in a slab; a task's slot index doubles as its waker identity.
//! While a task is being polled its slot holds `None`, so a nested loop
//! never polls the same future re-entrantly.

use crate::runtime::waker::{ReadyList, make_waker};
use crate::utils::slab::Slab;

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::sync::PoisonError;
use std::task::{Context, Poll};

pub(crate) type LocalTask = Pin<Box<dyn Future<Output = ()>>>;

pub(crate) struct TaskQueue {
    tasks: RefCell<Slab<Option<LocalTask>>>,
    ready: ReadyList,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self {
            tasks: RefCell::new(Slab::new(0)),
            ready: ReadyList::default(),
        }
    }

    /// Stores a task and returns its slot index. The task is not polled.
    pub(crate) fn insert(&self, task: LocalTask) -> usize {
        self.tasks.borrow_mut().insert(Some(task))
    }

    /// Polls the task in slot `index` once.
    ///
    /// Finished tasks are dropped; missing or running slots are ignored.
    pub(crate) fn poll(&self, index: usize) {
        let task = self
            .tasks
            .borrow_mut()
            .get_mut(index)
            .and_then(Option::take);

        let Some(mut task) = task else {
            return;
        };

        let waker = make_waker(index, self.ready.clone());
        let mut context = Context::from_waker(&waker);

        match task.as_mut().poll(&mut context) {
            Poll::Pending => {
                if let Some(slot) = self.tasks.borrow_mut().get_mut(index) {
                    *slot = Some(task);
                }
            }
            Poll::Ready(()) => {
                self.tasks.borrow_mut().remove(index);
                log::trace!("task {index} finished");
            }
        }
    }

    /// Polls every task woken since the last call, in wake order.
    pub(crate) fn poll_ready(&self) {
        let woken: Vec<usize> = self
            .ready
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        for index in woken {
            self.poll(index);
        }
    }

    pub(crate) fn has_ready(&self) -> bool {
        !self
            .ready
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Number of tasks that have not finished.
    pub(crate) fn len(&self) -> usize {
        self.tasks.borrow().len()
    }
}
