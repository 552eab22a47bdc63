//! Time utilities built on delay watchers.
//!
//! - [`sleep`] settles after a duration
//! - [`pause`] settles with a value after a duration
//! - [`timeout`] bounds how long a promise may stay pending
//!
//! # Example: Timeout
//!
//! ```no_run
//! use tickloop::time::{pause, timeout};
//! use tickloop::Error;
//! use std::time::Duration;
//!
//! let slow = pause(Duration::from_millis(100), "late");
//! let bounded = timeout(slow, Duration::from_millis(10));
//!
//! assert!(matches!(bounded.wait(), Err(Error::Timeout(_))));
//! ```

pub mod sleep;
pub mod timeout;

pub use sleep::{pause, sleep};
pub use timeout::timeout;
