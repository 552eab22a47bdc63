//! Coroutine driver for explicit state-machine routines.
//!
//! A [`Routine`] is resumed with [`Resume`] inputs and answers with a
//! [`Step`]: await a promise, return a value, or raise an error. The
//! [`Coroutine`] drives it: it runs the routine synchronously up to the first
//! `Await`, then resumes it once per settlement of the awaited promise, with
//! the value or with the error injected. The coroutine's own promise settles
//! with the routine's return value or raised error.
//!
//! # Example
//!
//! ```no_run
//! use tickloop::coroutine::{from_fn, Coroutine, Resume, Step};
//! use tickloop::time::pause;
//! use std::time::Duration;
//!
//! let coroutine = Coroutine::new(from_fn(|input| match input {
//!     Resume::Start => Step::Await(pause(Duration::from_millis(5), 20)),
//!     Resume::Value(n) => Step::Return(n + 1),
//!     Resume::Error(err) => Step::Raise(err),
//! }));
//!
//! assert_eq!(coroutine.promise().wait().unwrap(), 21);
//! ```

use crate::error::Error;
use crate::promise::{Deferred, Promise};
use crate::reactor::Reactor;

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

/// Input handed to [`Routine::resume`].
#[derive(Debug)]
pub enum Resume<I> {
    /// First resumption.
    Start,

    /// The awaited promise resolved.
    Value(I),

    /// The awaited promise failed.
    Error(Error),
}

/// What a routine does next.
pub enum Step<I, T> {
    Await(Promise<I>),
    Return(T),
    Raise(Error),
}

/// A suspendable routine.
pub trait Routine: 'static {
    /// Type of the values the routine awaits.
    type Input: Clone + 'static;

    /// Type of the value the routine returns.
    type Output: Clone + 'static;

    fn resume(&mut self, input: Resume<Self::Input>) -> Step<Self::Input, Self::Output>;
}

/// Lifecycle of a coroutine frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Created,
    Running,
    Suspended,
    Completed,
    Failed,
}

struct Frame<R: Routine> {
    /// `None` while the routine runs and after it finished.
    routine: Option<R>,
    deferred: Deferred<R::Output>,
    state: FrameState,
}

/// A routine being driven by the reactor.
pub struct Coroutine<R: Routine> {
    frame: Rc<RefCell<Frame<R>>>,
    promise: Promise<R::Output>,
}

impl<R: Routine> Coroutine<R> {
    /// Starts `routine` and runs it up to its first suspension point.
    pub fn new(routine: R) -> Self {
        let deferred = Deferred::new();
        let promise = deferred.promise();

        let frame = Rc::new(RefCell::new(Frame {
            routine: Some(routine),
            deferred,
            state: FrameState::Created,
        }));

        drive(&frame, Resume::Start);

        Self { frame, promise }
    }

    /// Settles with the routine's result.
    pub fn promise(&self) -> Promise<R::Output> {
        self.promise.clone()
    }

    pub fn state(&self) -> FrameState {
        self.frame.borrow().state
    }
}

// Resumes the routine once and acts on its step.
fn drive<R: Routine>(frame: &Rc<RefCell<Frame<R>>>, input: Resume<R::Input>) {
    let routine = {
        let mut current = frame.borrow_mut();
        current.state = FrameState::Running;
        current.routine.take()
    };

    let Some(mut routine) = routine else {
        return;
    };

    let step = routine.resume(input);

    let settled = {
        let mut current = frame.borrow_mut();

        match step {
            Step::Await(promise) => {
                current.state = FrameState::Suspended;
                current.routine = Some(routine);
                drop(current);

                let frame = frame.clone();
                promise.on_settled(move |outcome| {
                    let input = match outcome {
                        Ok(value) => Resume::Value(value),
                        Err(err) => Resume::Error(err),
                    };

                    drive(&frame, input);
                    Ok(())
                });

                return;
            }
            Step::Return(value) => {
                current.state = FrameState::Completed;
                current.deferred.resolve(value)
            }
            Step::Raise(error) => {
                current.state = FrameState::Failed;
                current.deferred.fail(error)
            }
        }
    };

    if let Err(err) = settled {
        Reactor::current().report(err);
    }
}

/// Routine built from a closure, see [`from_fn`].
pub struct FnRoutine<F, I, T> {
    f: F,
    _marker: PhantomData<fn(I) -> T>,
}

/// Adapts a closure into a [`Routine`].
///
/// State carried between resumptions lives in the closure's captures.
pub fn from_fn<F, I, T>(f: F) -> FnRoutine<F, I, T>
where
    F: FnMut(Resume<I>) -> Step<I, T> + 'static,
    I: Clone + 'static,
    T: Clone + 'static,
{
    FnRoutine {
        f,
        _marker: PhantomData,
    }
}

impl<F, I, T> Routine for FnRoutine<F, I, T>
where
    F: FnMut(Resume<I>) -> Step<I, T> + 'static,
    I: Clone + 'static,
    T: Clone + 'static,
{
    type Input = I;
    type Output = T;

    fn resume(&mut self, input: Resume<I>) -> Step<I, T> {
        (self.f)(input)
    }
}
