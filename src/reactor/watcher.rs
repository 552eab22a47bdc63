//! Watcher identities and kinds.

use crate::outcome::Outcome;
use crate::reactor::core::Reactor;

use libc::c_int;
use std::fmt;
use std::os::fd::RawFd;
use std::time::Duration;

/// Opaque identifier of a registered watcher.
///
/// Ids are unique for the lifetime of the reactor that issued them and are
/// never reused, even after the watcher is cancelled.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(String);

impl WatcherId {
    pub(crate) fn from_sequence(sequence: u64) -> Self {
        Self(format!("w{sequence:x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a watcher waits for. The kind is fixed for the lifetime of the watcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Watch {
    /// The descriptor has data to read (or reached end of stream).
    Readable(RawFd),

    /// The descriptor can accept a write.
    Writable(RawFd),

    /// Fire once after the duration, then cancel.
    Delay(Duration),

    /// Fire every time the duration elapses.
    Repeat(Duration),

    /// Fire when the process receives the signal.
    Signal(c_int),
}

impl Watch {
    pub fn is_signal(&self) -> bool {
        matches!(self, Watch::Signal(_))
    }
}

/// Callback invoked when a watcher fires.
pub(crate) type Callback = Box<dyn FnMut(&Reactor, &WatcherId) -> Outcome<()>>;

/// Reactor-side record of a registered watcher.
pub(crate) struct Watcher {
    pub(crate) watch: Watch,

    /// `None` while the callback is running.
    pub(crate) callback: Option<Callback>,

    pub(crate) enabled: bool,
    pub(crate) referenced: bool,

    /// Armed in the backend.
    pub(crate) active: bool,
}

impl Watcher {
    pub(crate) fn new(watch: Watch, callback: Callback) -> Self {
        Self {
            watch,
            callback: Some(callback),
            enabled: true,
            referenced: true,
            active: false,
        }
    }

    /// Keeps the run loop alive.
    pub(crate) fn is_live(&self) -> bool {
        self.enabled && self.referenced
    }
}
