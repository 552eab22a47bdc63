//! Waker implementation for spawned tasks.
//!
//! Waking a task pushes its slot index onto the reactor's ready list; the
//! next tick polls it again. The ready list sits behind `Arc<Mutex<_>>`
//! because the `Waker` contract requires `Send + Sync`, even though every
//! poll happens on the reactor's thread.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{RawWaker, RawWakerVTable, Waker};

/// Indices of the tasks woken since the last poll.
pub(crate) type ReadyList = Arc<Mutex<VecDeque<usize>>>;

/// Custom waker that re-queues a task slot when awakened.
pub(crate) struct TaskWaker {
    index: usize,
    ready: ReadyList,
}

impl TaskWaker {
    fn new(index: usize, ready: ReadyList) -> Arc<Self> {
        Arc::new(Self { index, ready })
    }

    fn wake(self: &Arc<Self>) {
        self.ready
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(self.index);
    }

    fn clone_raw(ptr: *const ()) -> RawWaker {
        unsafe {
            let arc = Arc::<TaskWaker>::from_raw(ptr as *const TaskWaker);
            let cloned = arc.clone();
            std::mem::forget(arc);
            RawWaker::new(Arc::into_raw(cloned) as *const (), &Self::VTABLE)
        }
    }

    fn wake_raw(ptr: *const ()) {
        unsafe {
            let arc = Arc::<TaskWaker>::from_raw(ptr as *const TaskWaker);
            arc.wake();
        }
    }

    fn wake_by_ref_raw(ptr: *const ()) {
        unsafe {
            let arc = Arc::<TaskWaker>::from_raw(ptr as *const TaskWaker);
            arc.wake();
            let _ = Arc::into_raw(arc);
        }
    }

    fn drop_raw(ptr: *const ()) {
        unsafe {
            drop(Arc::<TaskWaker>::from_raw(ptr as *const TaskWaker));
        }
    }

    const VTABLE: RawWakerVTable = RawWakerVTable::new(
        Self::clone_raw,
        Self::wake_raw,
        Self::wake_by_ref_raw,
        Self::drop_raw,
    );
}

/// Creates a waker that pushes `index` onto `ready`.
pub(crate) fn make_waker(index: usize, ready: ReadyList) -> Waker {
    let waker = TaskWaker::new(index, ready);
    let raw = RawWaker::new(Arc::into_raw(waker) as *const (), &TaskWaker::VTABLE);

    unsafe { Waker::from_raw(raw) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wake_pushes_index() {
        let ready = ReadyList::default();
        let waker = make_waker(7, ready.clone());

        waker.wake_by_ref();
        waker.clone().wake();

        let woken: Vec<usize> = ready.lock().unwrap().drain(..).collect();
        assert_eq!(woken, vec![7, 7]);
    }
}
