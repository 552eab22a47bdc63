//! Contract between the reactor and a native event multiplexer.
//!
//! The reactor owns the watcher table and the callbacks; a backend only arms
//! and disarms watchers and reports which of them fired. Any type satisfying
//! the three operations can replace the bundled
//! [`EpollBackend`](crate::reactor::EpollBackend), see
//! [`ReactorBuilder::backend`](crate::ReactorBuilder::backend).

use crate::reactor::watcher::{Watch, WatcherId};

use std::io;

/// A native event multiplexer.
pub trait Backend {
    /// Arms a batch of watchers.
    ///
    /// Returns the watchers that could not be armed together with the reason.
    /// The reactor reports each failure and disables the watcher.
    fn activate(&mut self, watchers: &[(WatcherId, Watch)]) -> Vec<(WatcherId, io::Error)>;

    /// Disarms one watcher. Disarming a watcher that is not armed is a no-op.
    fn deactivate(&mut self, id: &WatcherId, watch: &Watch);

    /// Performs one bounded wait and returns the watchers that fired, in order.
    ///
    /// When `blocking` is false the wait must return immediately.
    fn dispatch(&mut self, blocking: bool) -> io::Result<Vec<WatcherId>>;
}
