//! Deadline for a pending promise.
//!
//! # Example
//!
//! ```no_run
//! use tickloop::time::{pause, timeout};
//! use std::time::Duration;
//!
//! let fast = timeout(pause(Duration::from_millis(5), "done"), Duration::from_millis(100));
//! assert_eq!(fast.wait().unwrap(), "done");
//! ```

use crate::error::Error;
use crate::promise::{Deferred, Promise};
use crate::reactor::Reactor;

use std::rc::Rc;
use std::time::Duration;

/// Adopts the outcome of `promise` if it settles within `duration`, and
/// fails with [`Error::Timeout`] otherwise.
///
/// The timer is cancelled as soon as `promise` settles.
pub fn timeout<T>(promise: Promise<T>, duration: Duration) -> Promise<T>
where
    T: Clone + 'static,
{
    let deferred = Rc::new(Deferred::new());
    let bounded = deferred.promise();
    let reactor = Reactor::current();

    let timer = {
        let deferred = deferred.clone();

        reactor.delay(duration, move |_, _| {
            if deferred.is_resolved() {
                return Ok(());
            }

            deferred.fail(Error::Timeout(duration))
        })
    };

    promise.on_settled(move |outcome| {
        reactor.cancel(&timer);

        if deferred.is_resolved() {
            return Ok(());
        }

        deferred.settle(outcome)
    });

    bounded
}
