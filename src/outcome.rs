//! Unified callback results.
//!
//! Watcher callbacks, deferred callbacks, stream items and [`call`] all
//! return something that converts into an [`Outcome`]: a plain value, a
//! failure, a promise, a routine to drive, or a future to spawn. Every
//! variant can be turned into a [`Promise`].

use crate::coroutine::{Coroutine, Routine};
use crate::error::Error;
use crate::promise::Promise;
use crate::task;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Future accepted by [`Outcome::Task`].
pub type LocalBoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, Error>>>>;

/// A routine waiting to be started, with its input type erased.
pub trait StartRoutine<T> {
    fn start(self: Box<Self>) -> Promise<T>;
}

impl<R> StartRoutine<R::Output> for R
where
    R: Routine,
{
    fn start(self: Box<Self>) -> Promise<R::Output> {
        Coroutine::new(*self).promise()
    }
}

/// What a callback produced.
pub enum Outcome<T> {
    Value(T),
    Fail(Error),
    Promise(Promise<T>),
    Routine(Box<dyn StartRoutine<T>>),
    Task(LocalBoxFuture<T>),
}

impl<T> Outcome<T>
where
    T: Clone + 'static,
{
    /// An outcome that drives `routine` as a coroutine.
    pub fn routine<R>(routine: R) -> Self
    where
        R: Routine<Output = T>,
    {
        Outcome::Routine(Box::new(routine))
    }

    /// An outcome that spawns `future` as a task.
    pub fn task<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, Error>> + 'static,
    {
        Outcome::Task(Box::pin(future))
    }

    /// Starts whatever work the outcome carries and returns its promise.
    ///
    /// Routines run to their first suspension point and futures are polled
    /// once before this returns.
    pub fn into_promise(self) -> Promise<T> {
        match self {
            Outcome::Value(value) => Promise::resolved(value),
            Outcome::Fail(error) => Promise::failed(error),
            Outcome::Promise(promise) => promise,
            Outcome::Routine(routine) => routine.start(),
            Outcome::Task(future) => task::spawn(future),
        }
    }
}

impl<T> From<Result<T, Error>> for Outcome<T> {
    fn from(result: Result<T, Error>) -> Self {
        match result {
            Ok(value) => Outcome::Value(value),
            Err(error) => Outcome::Fail(error),
        }
    }
}

impl<T> From<Promise<T>> for Outcome<T> {
    fn from(promise: Promise<T>) -> Self {
        Outcome::Promise(promise)
    }
}

impl From<()> for Outcome<()> {
    fn from(_: ()) -> Self {
        Outcome::Value(())
    }
}

impl<T> fmt::Debug for Outcome<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Outcome::Fail(error) => f.debug_tuple("Fail").field(error).finish(),
            Outcome::Promise(promise) => f.debug_tuple("Promise").field(promise).finish(),
            Outcome::Routine(_) => f.write_str("Routine(..)"),
            Outcome::Task(_) => f.write_str("Task(..)"),
        }
    }
}

/// Invokes `f` and wraps whatever it produced in a promise.
///
/// ```no_run
/// use tickloop::{call, Error, Promise};
///
/// let ok: Promise<u32> = call(|| Ok(3));
/// let failed: Promise<u32> = call(|| Err(Error::msg("nope")));
///
/// assert_eq!(ok.wait().unwrap(), 3);
/// assert!(failed.wait().is_err());
/// ```
pub fn call<T, O, F>(f: F) -> Promise<T>
where
    T: Clone + 'static,
    O: Into<Outcome<T>>,
    F: FnOnce() -> O,
{
    f().into().into_promise()
}
