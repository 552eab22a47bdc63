//! Error type shared by every part of the runtime.
//!
//! A settled failure is handed to every subscriber of a promise, so [`Error`]
//! is cheap to clone: foreign errors are kept behind an [`Rc`].
//!
//! # Example
//!
//! ```no_run
//! use tickloop::{Error, Promise};
//!
//! let promise: Promise<u32> = Promise::failed(Error::msg("boom"));
//! assert_eq!(promise.wait().unwrap_err().to_string(), "boom");
//! ```

use std::fmt;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure the runtime produces or transports.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// `resolve`, `resolve_with` or `fail` was called on a promise that was
    /// already resolved.
    #[error("promise has already been resolved")]
    AlreadySettled,

    /// A promise was resolved with itself, or with a promise that forwards to it.
    #[error("a promise cannot be resolved with itself or with a promise forwarding to it")]
    CircularResolution,

    /// A combinator that needs at least one input received none.
    #[error("{0} requires at least one input")]
    EmptyInput(&'static str),

    /// The collections given to [`map`](crate::combinator::map) differ in length.
    #[error("collections must have the same length: expected {expected}, found {found}")]
    ShapeMismatch { expected: usize, found: usize },

    /// The watcher id does not name a live watcher.
    #[error("invalid watcher id: {0}")]
    InvalidWatcher(String),

    /// The reactor stopped before the awaited promise settled.
    #[error("loop stopped without resolving the promise")]
    LoopStopped,

    /// Every input of [`first`](crate::combinator::first) failed.
    #[error(transparent)]
    Multi(#[from] MultiReasonError),

    /// A promise did not settle before its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// An operating system error raised by the backend.
    #[error("{0}")]
    Io(Rc<io::Error>),

    /// An application failure carried through promises.
    #[error("{0}")]
    Custom(Rc<dyn std::error::Error>),
}

impl Error {
    /// Builds an application failure from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Error::Custom(Rc::new(Message(message.into())))
    }

    /// Wraps any error type as an application failure.
    pub fn custom<E>(error: E) -> Self
    where
        E: std::error::Error + 'static,
    {
        Error::Custom(Rc::new(error))
    }

    /// Returns true for errors caused by misusing the API.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Error::AlreadySettled
                | Error::CircularResolution
                | Error::EmptyInput(_)
                | Error::ShapeMismatch { .. }
                | Error::InvalidWatcher(_)
        )
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Io(Rc::new(error))
    }
}

/// Plain message error behind [`Error::msg`].
#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Message {}

/// Aggregate failure carrying every individual reason, in settlement order.
#[derive(Debug, Clone, Error)]
#[error("all {} inputs failed", .reasons.len())]
pub struct MultiReasonError {
    reasons: Vec<Error>,
}

impl MultiReasonError {
    pub(crate) fn new(reasons: Vec<Error>) -> Self {
        Self { reasons }
    }

    /// The individual failures, in the order the inputs settled.
    pub fn reasons(&self) -> &[Error] {
        &self.reasons
    }

    pub fn into_reasons(self) -> Vec<Error> {
        self.reasons
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_display() {
        assert_eq!(Error::msg("boom").to_string(), "boom");
    }

    #[test]
    fn test_multi_reason_display() {
        let error: Error = MultiReasonError::new(vec![Error::msg("a"), Error::msg("b")]).into();

        assert_eq!(error.to_string(), "all 2 inputs failed");
        assert!(!error.is_usage());
    }

    #[test]
    fn test_usage_classification() {
        assert!(Error::AlreadySettled.is_usage());
        assert!(Error::EmptyInput("first").is_usage());
        assert!(!Error::LoopStopped.is_usage());
    }
}
