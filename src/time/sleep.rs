//! Promises that settle after a delay.

use crate::promise::{Deferred, Promise};
use crate::reactor::Reactor;

use std::time::Duration;

/// Resolves with `()` once `duration` has elapsed.
pub fn sleep(duration: Duration) -> Promise<()> {
    pause(duration, ())
}

/// Resolves with `value` once `duration` has elapsed.
///
/// The delay watcher is referenced, so it keeps the loop alive until it fires.
pub fn pause<T>(duration: Duration, value: T) -> Promise<T>
where
    T: Clone + 'static,
{
    let deferred = Deferred::new();
    let promise = deferred.promise();

    Reactor::current().delay(duration, move |_, _| deferred.resolve(value.clone()));

    promise
}
