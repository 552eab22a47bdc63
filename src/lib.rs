//! Single-threaded cooperative runtime built around a reactor and promises.
//!
//! The crate provides a reactor that multiplexes I/O readiness, timers and
//! signals behind one blocking wait, resolution cells settling exactly once,
//! drivers resuming routines and futures when the cells they await settle,
//! and combinators composing many cells into one.
//!
//! # Architecture
//!
//! - **Reactor**: watcher table, deferred queue, error handler and run loop
//! - **Backend**: native multiplexer behind the reactor (`epoll` on Linux)
//! - **Promise / Deferred**: the resolution cell and its single producer
//! - **Coroutine**: drives explicit [`Routine`] state machines
//! - **Task**: drives `async` futures that await promises
//! - **Combinators**: [`all`], [`any`], [`first`] and [`map`]
//! - **Stream**: pushes the items of an iterator through listeners
//! - **ReactorBuilder**: fluent configuration of a reactor
//!
//! # Example
//!
//! ```no_run
//! use tickloop::{all, time::pause, Reactor};
//! use std::time::Duration;
//!
//! let reactor = Reactor::new();
//! let values = reactor.enter(|| {
//!     let inputs = vec![
//!         pause(Duration::from_millis(20), 1),
//!         pause(Duration::from_millis(10), 2),
//!     ];
//!     all(inputs.into_iter().enumerate()).wait()
//! });
//!
//! assert_eq!(values.unwrap().into_values(), vec![1, 2]);
//! ```

mod builder;
pub mod combinator;
pub mod coroutine;
mod error;
mod keyed;
mod outcome;
mod promise;
pub mod reactor;
mod runtime;
pub mod stream;
pub mod task;
pub mod time;

mod utils {
    pub(crate) mod slab;
}

pub use builder::ReactorBuilder;
pub use combinator::{all, any, first, map};
pub use coroutine::{Coroutine, FrameState, Resume, Routine, Step};
pub use error::{Error, MultiReasonError, Result};
pub use keyed::Keyed;
pub use outcome::{LocalBoxFuture, Outcome, StartRoutine, call};
pub use promise::{Deferred, Promise, PromiseFuture, rethrow};
pub use reactor::{Backend, EpollBackend, ErrorHandler, Reactor, Watch, WatcherId};
pub use stream::Stream;
