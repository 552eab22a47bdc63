//! Event-driven reactor module.
//!
//! - [`core`]: the [`Reactor`] handle, watcher lifecycle and run loop
//! - [`watcher`]: watcher ids and kinds
//! - [`backend`]: the contract with native event multiplexers
//! - `poller`: the bundled `epoll` backend
//! - `timer`: deadline queue used by the bundled backend
//! - `signal`: process-wide signal delivery through a self-pipe

pub mod backend;
pub mod core;
mod poller;
mod signal;
mod timer;
pub mod watcher;

pub use backend::Backend;
pub use self::core::{ErrorHandler, Reactor};
pub use poller::EpollBackend;
pub(crate) use poller::DEFAULT_CAPACITY;
pub use watcher::{Watch, WatcherId};
