//! Fluent builder for Reactor construction.
//!
//! # Example
//! ```no_run
//! use tickloop::ReactorBuilder;
//!
//! # fn main() -> std::io::Result<()> {
//! let reactor = ReactorBuilder::new()
//!     .event_capacity(256)
//!     .error_handler(|err| eprintln!("callback failed: {err}"))
//!     .build()?;
//!
//! reactor.run();
//! # Ok(())
//! # }
//! ```

use crate::error::Error;
use crate::reactor::core::{ErrorHandler, Reactor};
use crate::reactor::{Backend, DEFAULT_CAPACITY, EpollBackend};

use std::io;

/// Builder for [`Reactor`] instances.
pub struct ReactorBuilder {
    event_capacity: usize,
    backend: Option<Box<dyn Backend>>,
    error_handler: Option<ErrorHandler>,
}

impl Default for ReactorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReactorBuilder {
    pub fn new() -> Self {
        Self {
            event_capacity: DEFAULT_CAPACITY,
            backend: None,
            error_handler: None,
        }
    }

    /// Sets the size of the event buffer of the bundled backend.
    ///
    /// Ignored when a custom backend is installed.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Replaces the bundled `epoll` backend.
    pub fn backend<B>(mut self, backend: B) -> Self
    where
        B: Backend + 'static,
    {
        self.backend = Some(Box::new(backend));
        self
    }

    /// Installs the initial error handler.
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: FnMut(Error) + 'static,
    {
        self.error_handler = Some(Box::new(handler));
        self
    }

    /// Builds the reactor.
    ///
    /// Fails when the bundled backend cannot create its `epoll` instance or
    /// signal pipe.
    pub fn build(self) -> io::Result<Reactor> {
        let backend = match self.backend {
            Some(backend) => backend,
            None => Box::new(EpollBackend::with_capacity(self.event_capacity)?),
        };

        log::debug!("building reactor");
        Ok(Reactor::from_parts(backend, self.error_handler))
    }
}
