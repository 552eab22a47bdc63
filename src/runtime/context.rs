//! Thread-local reactor context.
//!
//! Promises, combinators and timing helpers schedule their work on the
//! *current* reactor instead of taking one as a parameter. The current
//! reactor is the one of the innermost [`enter`] (or running loop) on this
//! thread; outside of any, every thread lazily creates a default reactor.
//!
//! # Example
//!
//! ```no_run
//! use tickloop::Reactor;
//!
//! let reactor = Reactor::new();
//! reactor.enter(|| {
//!     // `Reactor::current()` is `reactor` here.
//! });
//! ```

use crate::reactor::Reactor;

use std::cell::RefCell;

thread_local! {
    /// Reactor of the innermost `enter` or `run` on this thread.
    static CURRENT: RefCell<Option<Reactor>> = const { RefCell::new(None) };

    /// Created on first use outside of any context.
    static DEFAULT: Reactor = Reactor::new();
}

/// Returns the current reactor, falling back to the thread's default one.
pub(crate) fn current() -> Reactor {
    CURRENT
        .with(|current| current.borrow().clone())
        .unwrap_or_else(|| DEFAULT.with(Reactor::clone))
}

/// Replaces the current reactor and returns the previous one.
pub(crate) fn swap(reactor: Option<Reactor>) -> Option<Reactor> {
    CURRENT.with(|current| current.replace(reactor))
}

/// Makes `reactor` current while `function` runs.
///
/// The previous reactor is restored on exit, including when `function` panics.
pub(crate) fn enter<F, R>(reactor: Reactor, function: F) -> R
where
    F: FnOnce() -> R,
{
    let _restore = Restore(swap(Some(reactor)));

    function()
}

struct Restore(Option<Reactor>);

impl Drop for Restore {
    fn drop(&mut self) {
        swap(self.0.take());
    }
}
