//! Async tasks driven by the reactor.
//!
//! A task wraps a future whose output is `Result<T, Error>` and exposes it as
//! a [`Promise<T>`]. Inside the future, promises are awaited directly:
//!
//! ```no_run
//! use tickloop::{task, time::sleep, Error};
//! use std::time::Duration;
//!
//! let promise = task::spawn(async {
//!     sleep(Duration::from_millis(10)).await?;
//!     Ok::<_, Error>("done")
//! });
//!
//! assert_eq!(promise.wait().unwrap(), "done");
//! ```
//!
//! # How Tasks Work
//!
//! 1. The future is stored in the reactor's task slab and polled once, synchronously
//! 2. When it returns `Poll::Pending`, it stays in its slot
//! 3. Settling an awaited promise wakes the task, pushing its index onto the ready list
//! 4. The next tick polls every woken task again
//! 5. The returned promise settles with the future's output

use crate::error::Error;
use crate::promise::{Deferred, Promise};
use crate::reactor::Reactor;

use std::future::Future;

/// Spawns `future` on the current reactor.
pub fn spawn<F, T>(future: F) -> Promise<T>
where
    F: Future<Output = Result<T, Error>> + 'static,
    T: Clone + 'static,
{
    Reactor::current().spawn(future)
}

impl Reactor {
    /// Spawns `future` on this reactor and returns a promise of its output.
    ///
    /// The future is polled once before this returns.
    pub fn spawn<F, T>(&self, future: F) -> Promise<T>
    where
        F: Future<Output = Result<T, Error>> + 'static,
        T: Clone + 'static,
    {
        let deferred = Deferred::new();
        let promise = deferred.promise();

        let index = self.tasks().insert(Box::pin(async move {
            let outcome = future.await;

            if let Err(err) = deferred.settle(outcome) {
                Reactor::current().report(err);
            }
        }));

        log::trace!("spawned task {index}");
        self.enter(|| self.tasks().poll(index));

        promise
    }
}
