//! Platform-specific multiplexing backends.
//!
//! The concrete implementation is selected at compile time depending on the
//! target operating system. Only Linux (`epoll`) ships with the crate; other
//! platforms can plug their own [`Backend`](crate::reactor::Backend) through
//! the builder.

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "linux")]
pub use epoll::EpollBackend;

#[cfg(target_os = "linux")]
pub(crate) use epoll::DEFAULT_CAPACITY;
