//! Resolution cells: [`Deferred`] produces, [`Promise`] consumes.
//!
//! A cell settles exactly once, with a value or an [`Error`]. Callbacks are
//! never invoked synchronously: delivery always goes through the current
//! reactor's deferred queue, so code registering a callback finishes before
//! the callback runs.
//!
//! A cell can also be resolved with another cell ([`Deferred::resolve_with`]).
//! It then forwards: it stays pending until the other cell settles and adopts
//! its outcome. Each hop of a forwarding chain is one deferred job, so chains
//! of any length settle without growing the native stack.
//!
//! # Example
//!
//! ```no_run
//! use tickloop::{Deferred, Reactor};
//!
//! let reactor = Reactor::new();
//! reactor.enter(|| {
//!     let deferred = Deferred::new();
//!     let promise = deferred.promise();
//!
//!     promise.on_settled(|outcome| {
//!         println!("settled: {:?}", outcome);
//!         Ok(())
//!     });
//!
//!     deferred.resolve(42).unwrap();
//!     reactor.run();
//! });
//! ```

use crate::error::Error;
use crate::reactor::Reactor;

use std::cell::RefCell;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

/// Callback registered with [`Promise::on_settled`].
type Settled<T> = Box<dyn FnOnce(Result<T, Error>) -> Result<(), Error>>;

type CellRef<T> = Rc<RefCell<Shared<T>>>;

/// Something to notify when a pending cell settles.
enum Waiter<T> {
    Callback(Settled<T>),

    /// A cell that was resolved with this one and adopts its outcome.
    Forward(CellRef<T>),
}

enum State<T> {
    Pending(Vec<Waiter<T>>),
    Settled(Result<T, Error>),
}

struct Shared<T> {
    state: State<T>,

    /// The producer has acted; further attempts fail.
    resolved: bool,

    /// A later cell of the forwarding chain, for cycle detection. Walks
    /// shorten it to the end of the chain.
    forward: Option<Weak<RefCell<Shared<T>>>>,
}

impl<T> Drop for Shared<T> {
    // A pending cell owns the cells forwarding to it. Abandoned chains are
    // released link by link, without recursion.
    fn drop(&mut self) {
        let mut orphans = Vec::new();
        take_forwards(&mut self.state, &mut orphans);

        while let Some(cell) = orphans.pop() {
            if let Ok(cell) = Rc::try_unwrap(cell) {
                let mut shared = cell.into_inner();
                take_forwards(&mut shared.state, &mut orphans);
            }
        }
    }
}

fn take_forwards<T>(state: &mut State<T>, into: &mut Vec<CellRef<T>>) {
    if let State::Pending(waiters) = state {
        for waiter in std::mem::take(waiters) {
            if let Waiter::Forward(cell) = waiter {
                into.push(cell);
            }
        }
    }
}

// Last cell reachable from `start` through forward links of pending cells.
// Every link walked is shortened to point at it.
fn chain_end<T>(start: &CellRef<T>) -> CellRef<T> {
    let mut walked = Vec::new();
    let mut cursor = start.clone();

    loop {
        let next = {
            let shared = cursor.borrow();
            match shared.state {
                State::Pending(_) => shared.forward.as_ref().and_then(Weak::upgrade),
                State::Settled(_) => None,
            }
        };

        match next {
            Some(next) => walked.push(std::mem::replace(&mut cursor, next)),
            None => break,
        }
    }

    let end = Rc::downgrade(&cursor);
    for cell in walked {
        cell.borrow_mut().forward = Some(end.clone());
    }

    cursor
}

/// Consumer handle of a resolution cell.
///
/// Cloning a promise clones the handle, not the cell.
pub struct Promise<T> {
    shared: CellRef<T>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.shared.borrow().state {
            State::Pending(_) => "pending",
            State::Settled(Ok(_)) => "resolved",
            State::Settled(Err(_)) => "failed",
        };

        f.debug_struct("Promise").field("state", &state).finish()
    }
}

impl<T> Promise<T>
where
    T: Clone + 'static,
{
    fn pending() -> Self {
        Self {
            shared: Rc::new(RefCell::new(Shared {
                state: State::Pending(Vec::new()),
                resolved: false,
                forward: None,
            })),
        }
    }

    /// A cell already settled with `value`.
    pub fn resolved(value: T) -> Self {
        Self::settled(Ok(value))
    }

    /// A cell already settled with `error`.
    pub fn failed(error: Error) -> Self {
        Self::settled(Err(error))
    }

    fn settled(outcome: Result<T, Error>) -> Self {
        Self {
            shared: Rc::new(RefCell::new(Shared {
                state: State::Settled(outcome),
                resolved: true,
                forward: None,
            })),
        }
    }

    /// Registers a callback invoked once with the outcome.
    ///
    /// Callbacks run in registration order on a later tick of the current
    /// reactor, even when the cell is already settled. An `Err` returned by
    /// the callback goes to the reactor's error handler.
    pub fn on_settled<F>(&self, callback: F)
    where
        F: FnOnce(Result<T, Error>) -> Result<(), Error> + 'static,
    {
        let outcome = {
            let mut shared = self.shared.borrow_mut();
            match &mut shared.state {
                State::Pending(waiters) => {
                    waiters.push(Waiter::Callback(Box::new(callback)));
                    return;
                }
                State::Settled(outcome) => outcome.clone(),
            }
        };

        Reactor::current().defer_job(Box::new(move |reactor| {
            if let Err(err) = callback(outcome) {
                reactor.report(err);
            }
        }));
    }

    /// Pipes a success value through `f`; failures pass through untouched.
    pub fn then<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<U, Error> + 'static,
    {
        let deferred = Deferred::new();
        let promise = deferred.promise();

        self.on_settled(move |outcome| deferred.settle(outcome.and_then(f)));

        promise
    }

    /// The outcome, if the cell has settled.
    pub fn outcome(&self) -> Option<Result<T, Error>> {
        match &self.shared.borrow().state {
            State::Pending(_) => None,
            State::Settled(outcome) => Some(outcome.clone()),
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.shared.borrow().state, State::Settled(_))
    }

    /// Runs the current reactor until the cell settles.
    ///
    /// Returns immediately when the cell is already settled. Fails with
    /// [`Error::LoopStopped`] when the loop drains or is stopped first.
    pub fn wait(&self) -> Result<T, Error> {
        Reactor::current().block_on(self)
    }

    fn ptr_eq(&self, other: &Promise<T>) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    // Makes `target` adopt this cell's outcome.
    fn forward_to(&self, target: Promise<T>) {
        let outcome = {
            let mut shared = self.shared.borrow_mut();
            match &mut shared.state {
                State::Pending(waiters) => {
                    waiters.push(Waiter::Forward(target.shared));
                    return;
                }
                State::Settled(outcome) => outcome.clone(),
            }
        };

        Reactor::current().defer_job(Box::new(move |_| target.settle(outcome)));
    }

    // Settles the cell and schedules one job notifying every waiter in
    // registration order. Forwarded cells settle in turn, one job per hop.
    fn settle(&self, outcome: Result<T, Error>) {
        let waiters = {
            let mut shared = self.shared.borrow_mut();
            if let State::Settled(_) = shared.state {
                return;
            }

            match std::mem::replace(&mut shared.state, State::Settled(outcome.clone())) {
                State::Pending(waiters) => waiters,
                State::Settled(_) => return,
            }
        };

        if waiters.is_empty() {
            return;
        }

        Reactor::current().defer_job(Box::new(move |reactor| {
            for waiter in waiters {
                match waiter {
                    Waiter::Callback(callback) => {
                        if let Err(err) = callback(outcome.clone()) {
                            reactor.report(err);
                        }
                    }
                    Waiter::Forward(shared) => Promise { shared }.settle(outcome.clone()),
                }
            }
        }));
    }
}

/// Forwards the failure of `promise`, if any, to the current error handler.
pub fn rethrow<T>(promise: &Promise<T>)
where
    T: Clone + 'static,
{
    promise.on_settled(|outcome| outcome.map(|_| ()));
}

/// Producer side of a resolution cell.
///
/// Only the holder of the `Deferred` can settle the cell; the cell can be
/// observed through any number of [`Promise`] handles.
pub struct Deferred<T> {
    promise: Promise<T>,
}

impl<T> Deferred<T>
where
    T: Clone + 'static,
{
    pub fn new() -> Self {
        Self {
            promise: Promise::pending(),
        }
    }

    /// A consumer handle for this cell.
    pub fn promise(&self) -> Promise<T> {
        self.promise.clone()
    }

    /// True once `resolve`, `resolve_with`, `fail` or `settle` succeeded.
    pub fn is_resolved(&self) -> bool {
        self.promise.shared.borrow().resolved
    }

    pub fn resolve(&self, value: T) -> Result<(), Error> {
        self.settle(Ok(value))
    }

    pub fn fail(&self, error: Error) -> Result<(), Error> {
        self.settle(Err(error))
    }

    /// Settles with a ready outcome.
    pub fn settle(&self, outcome: Result<T, Error>) -> Result<(), Error> {
        self.claim()?;
        self.promise.settle(outcome);

        Ok(())
    }

    /// Makes this cell adopt the outcome of `promise` once it settles.
    ///
    /// Fails with [`Error::CircularResolution`] when `promise` is this cell
    /// or forwards to it, directly or through other cells.
    pub fn resolve_with(&self, promise: Promise<T>) -> Result<(), Error> {
        if self.is_resolved() {
            return Err(Error::AlreadySettled);
        }

        // An unresolved cell forwards nowhere, so it can only be the end of
        // a chain.
        if Rc::ptr_eq(&chain_end(&promise.shared), &self.promise.shared) {
            return Err(Error::CircularResolution);
        }

        self.claim()?;
        self.promise.shared.borrow_mut().forward = Some(Rc::downgrade(&promise.shared));
        promise.forward_to(self.promise.clone());

        Ok(())
    }

    fn claim(&self) -> Result<(), Error> {
        let mut shared = self.promise.shared.borrow_mut();
        if shared.resolved {
            return Err(Error::AlreadySettled);
        }

        shared.resolved = true;
        Ok(())
    }
}

impl<T> Default for Deferred<T>
where
    T: Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PartialEq for Promise<T>
where
    T: Clone + 'static,
{
    /// Two handles are equal when they observe the same cell.
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

/// Future returned by awaiting a [`Promise`] inside a spawned task.
pub struct PromiseFuture<T> {
    promise: Promise<T>,
    waker: Option<Rc<RefCell<Option<Waker>>>>,
}

impl<T> Future for PromiseFuture<T>
where
    T: Clone + 'static,
{
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(outcome) = this.promise.outcome() {
            return Poll::Ready(outcome);
        }

        match &this.waker {
            Some(slot) => {
                *slot.borrow_mut() = Some(cx.waker().clone());
            }
            None => {
                let slot = Rc::new(RefCell::new(Some(cx.waker().clone())));
                let wake = slot.clone();

                this.promise.on_settled(move |_| {
                    if let Some(waker) = wake.borrow_mut().take() {
                        waker.wake();
                    }
                    Ok(())
                });

                this.waker = Some(slot);
            }
        }

        Poll::Pending
    }
}

impl<T> IntoFuture for Promise<T>
where
    T: Clone + 'static,
{
    type Output = Result<T, Error>;
    type IntoFuture = PromiseFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        PromiseFuture {
            promise: self,
            waker: None,
        }
    }
}
