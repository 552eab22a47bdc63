//! The reactor: watcher table, deferred queue and the run loop.
//!
//! A [`Reactor`] is a cheap, cloneable handle to single-threaded state. It
//! owns every watcher and every queued callback; the [`Backend`] only arms
//! and disarms watchers and reports which ones fired. Callbacks are always
//! invoked by the reactor, outside of the backend's native wait and without
//! any internal borrow held, so a callback may freely register, cancel,
//! defer, or even start a nested [`run`](Reactor::run).
//!
//! # Ticks
//!
//! One tick of the loop:
//! 1. hand newly enabled watchers to [`Backend::activate`] in one batch,
//! 2. run the deferred callbacks that were queued when the tick began,
//! 3. poll the tasks woken since the last tick,
//! 4. call [`Backend::dispatch`], blocking only when no deferred work is left,
//! 5. invoke the callbacks of the watchers that fired.
//!
//! # Example
//!
//! ```no_run
//! use tickloop::Reactor;
//! use std::time::Duration;
//!
//! let reactor = Reactor::new();
//! reactor.delay(Duration::from_millis(10), |_, _| println!("fired"));
//! reactor.run();
//! ```

use crate::builder::ReactorBuilder;
use crate::error::Error;
use crate::outcome::Outcome;
use crate::promise::{Promise, rethrow};
use crate::reactor::backend::Backend;
use crate::reactor::watcher::{Callback, Watch, Watcher, WatcherId};
use crate::runtime::context;
use crate::runtime::queue::TaskQueue;

use libc::c_int;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};
use std::time::Duration;

/// Receives every error raised by a callback while the loop dispatches.
pub type ErrorHandler = Box<dyn FnMut(Error)>;

/// A zero-delay callback queued on the reactor.
pub(crate) type Job = Box<dyn FnOnce(&Reactor)>;

thread_local! {
    /// Reactor whose run loop currently owns signal delivery on this thread.
    static SIGNAL_OWNER: RefCell<Option<Weak<Inner>>> = const { RefCell::new(None) };
}

struct Inner {
    backend: RefCell<Box<dyn Backend>>,
    watchers: RefCell<HashMap<WatcherId, Watcher>>,

    /// Watchers waiting for activation, in enable order.
    pending: RefCell<Vec<WatcherId>>,

    deferred: RefCell<VecDeque<Job>>,
    tasks: TaskQueue,

    error_handler: RefCell<Option<ErrorHandler>>,

    /// Bumped by every `set_error_handler`.
    handler_generation: Cell<u64>,

    running: Cell<bool>,
    depth: Cell<usize>,

    /// Signal watchers are armed in the backend.
    signals_attached: Cell<bool>,

    next_id: Cell<u64>,
}

/// Handle to a single-threaded event loop.
#[derive(Clone)]
pub struct Reactor {
    inner: Rc<Inner>,
}

impl Reactor {
    /// Creates a reactor with the default configuration.
    ///
    /// # Panics
    /// Panics if the operating system refuses to create the `epoll` backend.
    /// Use [`ReactorBuilder::build`] to handle that error instead.
    pub fn new() -> Self {
        ReactorBuilder::new()
            .build()
            .expect("failed to create the reactor backend")
    }

    pub fn builder() -> ReactorBuilder {
        ReactorBuilder::new()
    }

    pub(crate) fn from_parts(backend: Box<dyn Backend>, error_handler: Option<ErrorHandler>) -> Self {
        Self {
            inner: Rc::new(Inner {
                backend: RefCell::new(backend),
                watchers: RefCell::new(HashMap::new()),
                pending: RefCell::new(Vec::new()),
                deferred: RefCell::new(VecDeque::new()),
                tasks: TaskQueue::new(),
                error_handler: RefCell::new(error_handler),
                handler_generation: Cell::new(0),
                running: Cell::new(false),
                depth: Cell::new(0),
                signals_attached: Cell::new(false),
                next_id: Cell::new(1),
            }),
        }
    }

    /// Returns the reactor of the innermost [`enter`](Self::enter) or
    /// [`run`](Self::run) on this thread, or the thread's default reactor.
    pub fn current() -> Reactor {
        context::current()
    }

    /// Makes this reactor the [`current`](Self::current) one while `function` runs.
    pub fn enter<F, R>(&self, function: F) -> R
    where
        F: FnOnce() -> R,
    {
        context::enter(self.clone(), function)
    }

    /// Registers a watcher and returns its id.
    ///
    /// The watcher starts enabled and referenced, and is armed in the backend
    /// at the beginning of the next tick.
    pub fn register<F, O>(&self, watch: Watch, mut callback: F) -> WatcherId
    where
        F: FnMut(&Reactor, &WatcherId) -> O + 'static,
        O: Into<Outcome<()>>,
    {
        let sequence = self.inner.next_id.get();
        self.inner.next_id.set(sequence + 1);

        let id = WatcherId::from_sequence(sequence);
        let callback: Callback = Box::new(move |reactor, id| callback(reactor, id).into());

        self.inner
            .watchers
            .borrow_mut()
            .insert(id.clone(), Watcher::new(watch, callback));
        self.inner.pending.borrow_mut().push(id.clone());

        log::trace!("registered watcher {id} for {watch:?}");
        id
    }

    /// Invokes `callback` every time `fd` becomes readable.
    pub fn on_readable<F, O>(&self, fd: RawFd, callback: F) -> WatcherId
    where
        F: FnMut(&Reactor, &WatcherId) -> O + 'static,
        O: Into<Outcome<()>>,
    {
        self.register(Watch::Readable(fd), callback)
    }

    /// Invokes `callback` every time `fd` becomes writable.
    pub fn on_writable<F, O>(&self, fd: RawFd, callback: F) -> WatcherId
    where
        F: FnMut(&Reactor, &WatcherId) -> O + 'static,
        O: Into<Outcome<()>>,
    {
        self.register(Watch::Writable(fd), callback)
    }

    /// Invokes `callback` once after `after`; the watcher is cancelled before the call.
    pub fn delay<F, O>(&self, after: Duration, callback: F) -> WatcherId
    where
        F: FnMut(&Reactor, &WatcherId) -> O + 'static,
        O: Into<Outcome<()>>,
    {
        self.register(Watch::Delay(after), callback)
    }

    /// Invokes `callback` every `interval` until the watcher is cancelled.
    pub fn repeat<F, O>(&self, interval: Duration, callback: F) -> WatcherId
    where
        F: FnMut(&Reactor, &WatcherId) -> O + 'static,
        O: Into<Outcome<()>>,
    {
        self.register(Watch::Repeat(interval), callback)
    }

    /// Invokes `callback` every time the process receives `signum`.
    pub fn on_signal<F, O>(&self, signum: c_int, callback: F) -> WatcherId
    where
        F: FnMut(&Reactor, &WatcherId) -> O + 'static,
        O: Into<Outcome<()>>,
    {
        self.register(Watch::Signal(signum), callback)
    }

    /// Queues `callback` to run on the next tick, before the next blocking wait.
    pub fn defer<F, O>(&self, callback: F)
    where
        F: FnOnce(&Reactor) -> O + 'static,
        O: Into<Outcome<()>>,
    {
        self.defer_job(Box::new(move |reactor| {
            let outcome = callback(reactor).into();
            reactor.handle_outcome(outcome);
        }));
    }

    pub(crate) fn defer_job(&self, job: Job) {
        self.inner.deferred.borrow_mut().push_back(job);
    }

    /// Cancels a watcher. Unknown ids are ignored.
    pub fn cancel(&self, id: &WatcherId) {
        let Some(watcher) = self.inner.watchers.borrow_mut().remove(id) else {
            return;
        };

        self.inner.pending.borrow_mut().retain(|pending| pending != id);

        if watcher.active {
            self.inner
                .backend
                .borrow_mut()
                .deactivate(id, &watcher.watch);
        }

        log::trace!("cancelled watcher {id}");
    }

    /// Re-enables a disabled watcher.
    pub fn enable(&self, id: &WatcherId) -> Result<(), Error> {
        {
            let mut watchers = self.inner.watchers.borrow_mut();
            let watcher = watchers
                .get_mut(id)
                .ok_or_else(|| Error::InvalidWatcher(id.to_string()))?;

            if watcher.enabled {
                return Ok(());
            }
            watcher.enabled = true;
        }

        self.inner.pending.borrow_mut().push(id.clone());
        Ok(())
    }

    /// Disables a watcher without destroying it. Unknown ids are ignored.
    pub fn disable(&self, id: &WatcherId) {
        let armed = {
            let mut watchers = self.inner.watchers.borrow_mut();
            let Some(watcher) = watchers.get_mut(id) else {
                return;
            };

            if !watcher.enabled {
                return;
            }
            watcher.enabled = false;

            let was_active = std::mem::replace(&mut watcher.active, false);
            was_active.then_some(watcher.watch)
        };

        self.inner.pending.borrow_mut().retain(|pending| pending != id);

        if let Some(watch) = armed {
            self.inner.backend.borrow_mut().deactivate(id, &watch);
        }
    }

    /// Makes the watcher keep [`run`](Self::run) alive again.
    pub fn reference(&self, id: &WatcherId) -> Result<(), Error> {
        let mut watchers = self.inner.watchers.borrow_mut();
        let watcher = watchers
            .get_mut(id)
            .ok_or_else(|| Error::InvalidWatcher(id.to_string()))?;

        watcher.referenced = true;
        Ok(())
    }

    /// Lets the loop end even while the watcher is enabled. Unknown ids are ignored.
    pub fn unreference(&self, id: &WatcherId) {
        if let Some(watcher) = self.inner.watchers.borrow_mut().get_mut(id) {
            watcher.referenced = false;
        }
    }

    pub fn contains(&self, id: &WatcherId) -> bool {
        self.inner.watchers.borrow().contains_key(id)
    }

    pub fn is_enabled(&self, id: &WatcherId) -> bool {
        self.inner
            .watchers
            .borrow()
            .get(id)
            .is_some_and(|watcher| watcher.enabled)
    }

    pub fn is_referenced(&self, id: &WatcherId) -> bool {
        self.inner
            .watchers
            .borrow()
            .get(id)
            .is_some_and(|watcher| watcher.referenced)
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Replaces the error handler, returning the previous one.
    ///
    /// Without a handler, callback errors are logged and dropped.
    pub fn set_error_handler(&self, handler: Option<ErrorHandler>) -> Option<ErrorHandler> {
        self.inner
            .handler_generation
            .set(self.inner.handler_generation.get() + 1);

        self.inner.error_handler.replace(handler)
    }

    /// Forwards an error to the error handler.
    pub(crate) fn report(&self, error: Error) {
        let handler = self.inner.error_handler.borrow_mut().take();
        let Some(mut handler) = handler else {
            log::error!("unhandled error in reactor callback: {error}");
            return;
        };

        let generation = self.inner.handler_generation.get();
        handler(error);

        if self.inner.handler_generation.get() == generation {
            *self.inner.error_handler.borrow_mut() = Some(handler);
        }
    }

    pub(crate) fn handle_outcome(&self, outcome: Outcome<()>) {
        match outcome {
            Outcome::Value(()) => {}
            Outcome::Fail(error) => self.report(error),
            other => rethrow(&other.into_promise()),
        }
    }

    pub(crate) fn tasks(&self) -> &TaskQueue {
        &self.inner.tasks
    }

    /// Runs the loop until no enabled, referenced watcher and no deferred
    /// work remains, or until [`stop`](Self::stop) is called.
    ///
    /// Calling `run` from a callback starts a nested loop that returns to the
    /// caller once it drains.
    pub fn run(&self) {
        self.run_until(|| false);
    }

    /// Asks the innermost running loop of this reactor to return after the
    /// current tick. Does nothing when the loop is not running.
    pub fn stop(&self) {
        self.inner.running.set(false);
    }

    /// Runs the loop until `promise` settles and returns its outcome.
    ///
    /// Fails with [`Error::LoopStopped`] if the loop stops first.
    pub fn block_on<T>(&self, promise: &Promise<T>) -> Result<T, Error>
    where
        T: Clone + 'static,
    {
        if let Some(outcome) = promise.outcome() {
            return outcome;
        }

        let slot: Rc<RefCell<Option<Result<T, Error>>>> = Rc::new(RefCell::new(None));
        let sink = slot.clone();

        self.enter(|| {
            promise.on_settled(move |outcome| {
                *sink.borrow_mut() = Some(outcome);
                Ok(())
            });
        });

        self.run_until(|| slot.borrow().is_some());

        let outcome = slot.borrow_mut().take();
        outcome.unwrap_or(Err(Error::LoopStopped))
    }

    fn run_until(&self, done: impl Fn() -> bool) {
        let _guard = RunGuard::enter(self);

        while self.inner.running.get() && !done() {
            if !self.is_alive() {
                break;
            }

            self.tick();
        }
    }

    fn is_alive(&self) -> bool {
        !self.inner.deferred.borrow().is_empty()
            || self.inner.tasks.has_ready()
            || self
                .inner
                .watchers
                .borrow()
                .values()
                .any(Watcher::is_live)
    }

    fn tick(&self) {
        self.activate_pending();
        self.run_deferred();
        self.inner.tasks.poll_ready();
        self.activate_pending();

        let blocking = self.inner.running.get()
            && self.inner.deferred.borrow().is_empty()
            && !self.inner.tasks.has_ready()
            && self.is_alive();

        let dispatched = self.inner.backend.borrow_mut().dispatch(blocking);
        let fired = match dispatched {
            Ok(fired) => fired,
            Err(err) => {
                self.report(err.into());
                return;
            }
        };

        for id in fired {
            self.fire(&id);
        }
    }

    fn run_deferred(&self) {
        let count = self.inner.deferred.borrow().len();

        for _ in 0..count {
            let job = self.inner.deferred.borrow_mut().pop_front();
            let Some(job) = job else {
                break;
            };

            job(self);
        }
    }

    fn fire(&self, id: &WatcherId) {
        let taken = {
            let mut watchers = self.inner.watchers.borrow_mut();
            match watchers.get_mut(id) {
                Some(watcher) if watcher.enabled && watcher.active => watcher
                    .callback
                    .take()
                    .map(|callback| (callback, watcher.watch)),
                _ => None,
            }
        };

        // Missing callback: the watcher fired again inside its own nested run.
        let Some((mut callback, watch)) = taken else {
            return;
        };

        if matches!(watch, Watch::Delay(_)) {
            self.cancel(id);
        }

        log::trace!("watcher {id} fired");
        let outcome = callback(self, id);

        {
            let mut watchers = self.inner.watchers.borrow_mut();
            if let Some(watcher) = watchers.get_mut(id) {
                watcher.callback.get_or_insert(callback);
            }
        }

        self.handle_outcome(outcome);
    }

    fn activate_pending(&self) {
        let pending = std::mem::take(&mut *self.inner.pending.borrow_mut());
        if pending.is_empty() {
            return;
        }

        let attached = self.inner.signals_attached.get();
        let batch: Vec<(WatcherId, Watch)> = {
            let mut watchers = self.inner.watchers.borrow_mut();

            pending
                .into_iter()
                .filter_map(|id| {
                    let watcher = watchers.get_mut(&id)?;

                    if !watcher.enabled || watcher.active {
                        return None;
                    }
                    // Armed by `attach_signals` once this reactor owns delivery.
                    if watcher.watch.is_signal() && !attached {
                        return None;
                    }

                    watcher.active = true;
                    Some((id, watcher.watch))
                })
                .collect()
        };

        self.arm(batch);
    }

    fn arm(&self, batch: Vec<(WatcherId, Watch)>) {
        if batch.is_empty() {
            return;
        }

        let failures = self.inner.backend.borrow_mut().activate(&batch);

        for (id, err) in failures {
            if let Some(watcher) = self.inner.watchers.borrow_mut().get_mut(&id) {
                watcher.enabled = false;
                watcher.active = false;
            }

            log::trace!("watcher {id} could not be armed: {err}");
            self.report(err.into());
        }
    }

    fn attach_signals(&self) {
        self.inner.signals_attached.set(true);

        let batch: Vec<(WatcherId, Watch)> = self
            .inner
            .watchers
            .borrow_mut()
            .iter_mut()
            .filter(|(_, watcher)| watcher.watch.is_signal() && watcher.enabled && !watcher.active)
            .map(|(id, watcher)| {
                watcher.active = true;
                (id.clone(), watcher.watch)
            })
            .collect();

        self.arm(batch);
    }

    fn detach_signals(&self) {
        self.inner.signals_attached.set(false);

        let armed: Vec<(WatcherId, Watch)> = self
            .inner
            .watchers
            .borrow_mut()
            .iter_mut()
            .filter(|(_, watcher)| watcher.watch.is_signal() && watcher.active)
            .map(|(id, watcher)| {
                watcher.active = false;
                (id.clone(), watcher.watch)
            })
            .collect();

        let mut backend = self.inner.backend.borrow_mut();
        for (id, watch) in &armed {
            backend.deactivate(id, watch);
        }
    }

    // Takes signal delivery away from the reactor that owned it.
    fn claim_signals(&self) -> (Option<Weak<Inner>>, bool) {
        let previous =
            SIGNAL_OWNER.with(|owner| owner.replace(Some(Rc::downgrade(&self.inner))));

        let outer = previous.as_ref().and_then(Weak::upgrade);
        if outer
            .as_ref()
            .is_some_and(|outer| Rc::ptr_eq(outer, &self.inner))
        {
            return (previous, false);
        }

        if let Some(outer) = outer {
            log::debug!("nested run takes signal delivery from an outer reactor");
            Reactor { inner: outer }.detach_signals();
        }
        self.attach_signals();

        (previous, true)
    }

    fn release_signals(&self, previous: Option<Weak<Inner>>, swapped: bool) {
        SIGNAL_OWNER.with(|owner| owner.replace(previous.clone()));

        if !swapped {
            return;
        }

        self.detach_signals();
        if let Some(outer) = previous.as_ref().and_then(Weak::upgrade) {
            Reactor { inner: outer }.attach_signals();
        }
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}

/// Saves the loop state on entry to `run` and restores it on exit.
struct RunGuard<'a> {
    reactor: &'a Reactor,
    was_running: bool,
    context: Option<Reactor>,
    signal_owner: Option<Weak<Inner>>,
    swapped: bool,
}

impl<'a> RunGuard<'a> {
    fn enter(reactor: &'a Reactor) -> Self {
        let inner = &reactor.inner;

        let was_running = inner.running.replace(true);
        inner.depth.set(inner.depth.get() + 1);
        log::debug!("entering run loop (depth {})", inner.depth.get());

        let context = context::swap(Some(reactor.clone()));
        let (signal_owner, swapped) = reactor.claim_signals();

        Self {
            reactor,
            was_running,
            context,
            signal_owner,
            swapped,
        }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let inner = &self.reactor.inner;

        self.reactor
            .release_signals(self.signal_owner.take(), self.swapped);
        context::swap(self.context.take());

        log::debug!(
            "leaving run loop (depth {}, {} unfinished tasks)",
            inner.depth.get(),
            inner.tasks.len()
        );
        inner.depth.set(inner.depth.get() - 1);
        inner.running.set(self.was_running);
    }
}
