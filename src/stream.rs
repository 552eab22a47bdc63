//! Push-based streams fed from ordinary iterators.
//!
//! [`from_iter`] turns an iterator of promise-producing items into a
//! [`Stream`]. Items are consumed one at a time on the reactor: an item is
//! pulled only after the previous one succeeded and its value reached every
//! listener. The first failure ends the stream.
//!
//! ```no_run
//! use tickloop::{stream, Error, Promise};
//!
//! let numbers = stream::from_iter((1..=3).map(|n| Ok::<_, Error>(n)));
//! numbers.listen(|n| {
//!     println!("got {n}");
//!     Ok(())
//! });
//! numbers.done().wait().unwrap();
//! ```

use crate::error::Error;
use crate::outcome::Outcome;
use crate::promise::{Deferred, Promise};
use crate::reactor::Reactor;

use std::cell::RefCell;
use std::rc::Rc;

type Listener<T> = Rc<RefCell<dyn FnMut(&T) -> Result<(), Error>>>;

struct Shared<T> {
    listeners: RefCell<Vec<Listener<T>>>,
    done: Promise<()>,
}

/// Handle to a live stream. Clones observe the same stream.
pub struct Stream<T> {
    shared: Rc<Shared<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Stream<T>
where
    T: 'static,
{
    /// Observes every value emitted from now on.
    ///
    /// An `Err` returned by the listener goes to the error handler; the
    /// stream keeps going.
    pub fn listen<F>(&self, listener: F)
    where
        F: FnMut(&T) -> Result<(), Error> + 'static,
    {
        self.shared
            .listeners
            .borrow_mut()
            .push(Rc::new(RefCell::new(listener)));
    }

    /// Observes the end of the stream.
    pub fn when<F>(&self, callback: F)
    where
        F: FnOnce(Result<(), Error>) -> Result<(), Error> + 'static,
    {
        self.shared.done.on_settled(callback);
    }

    /// Resolves when the source is exhausted; fails with the first failed item.
    pub fn done(&self) -> Promise<()> {
        self.shared.done.clone()
    }

    fn emit(&self, value: &T) {
        let listeners: Vec<Listener<T>> = self.shared.listeners.borrow().clone();

        for listener in listeners {
            let result = {
                let mut listener = listener.borrow_mut();
                (*listener)(value)
            };

            if let Err(err) = result {
                Reactor::current().report(err);
            }
        }
    }
}

struct Pump<T> {
    source: RefCell<Box<dyn Iterator<Item = Outcome<T>>>>,
    stream: Stream<T>,
    finished: Deferred<()>,
}

/// Streams the items of `source`, starting on the next tick.
pub fn from_iter<I, O, T>(source: I) -> Stream<T>
where
    I: IntoIterator<Item = O>,
    I::IntoIter: 'static,
    O: Into<Outcome<T>> + 'static,
    T: Clone + 'static,
{
    let finished = Deferred::new();
    let stream = Stream {
        shared: Rc::new(Shared {
            listeners: RefCell::new(Vec::new()),
            done: finished.promise(),
        }),
    };

    let source: Box<dyn Iterator<Item = Outcome<T>>> = Box::new(source.into_iter().map(Into::into));
    let pump = Rc::new(Pump {
        source: RefCell::new(source),
        stream: stream.clone(),
        finished,
    });

    Reactor::current().defer(move |_| advance(pump));

    stream
}

// Pulls the next item and subscribes to it.
fn advance<T>(pump: Rc<Pump<T>>) -> Result<(), Error>
where
    T: Clone + 'static,
{
    let next = pump.source.borrow_mut().next();

    let Some(item) = next else {
        return pump.finished.resolve(());
    };

    item.into_promise().on_settled(move |outcome| match outcome {
        Ok(value) => {
            pump.stream.emit(&value);
            advance(pump)
        }
        Err(err) => pump.finished.fail(err),
    });

    Ok(())
}
