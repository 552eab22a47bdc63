//! Combinators building one promise out of many.
//!
//! Every combinator takes `(key, promise)` pairs, so positional inputs
//! (`promises.into_iter().enumerate()`) and labelled inputs go through the
//! same code. Results come back as [`Keyed`] collections in input order,
//! regardless of the order in which the inputs settled.

use crate::error::{Error, MultiReasonError};
use crate::keyed::Keyed;
use crate::promise::{Deferred, Promise};

use std::cell::RefCell;
use std::rc::Rc;

/// Per-input results, filled as inputs settle.
struct Gather<K, T> {
    keys: Vec<K>,
    slots: Vec<Option<T>>,
    remaining: usize,
}

impl<K, T> Gather<K, T> {
    fn new(keys: Vec<K>) -> Rc<RefCell<Self>> {
        let remaining = keys.len();

        Rc::new(RefCell::new(Self {
            slots: (0..remaining).map(|_| None).collect(),
            keys,
            remaining,
        }))
    }

    /// Stores the result of input `index`; true once every input reported.
    fn store(&mut self, index: usize, value: T) -> bool {
        self.slots[index] = Some(value);
        self.remaining -= 1;

        self.remaining == 0
    }

    fn take(&mut self) -> impl Iterator<Item = (K, T)> {
        let keys = std::mem::take(&mut self.keys);
        let slots = std::mem::take(&mut self.slots);

        keys.into_iter()
            .zip(slots)
            .filter_map(|(key, slot)| slot.map(|value| (key, value)))
    }
}

/// Resolves with every value once all inputs succeeded; fails with the
/// first failure.
///
/// An empty input resolves with an empty collection.
pub fn all<K, T, I>(inputs: I) -> Promise<Keyed<K, T>>
where
    I: IntoIterator<Item = (K, Promise<T>)>,
    K: Clone + 'static,
    T: Clone + 'static,
{
    let (keys, promises): (Vec<K>, Vec<Promise<T>>) = inputs.into_iter().unzip();
    if promises.is_empty() {
        return Promise::resolved(Keyed::new());
    }

    let deferred = Rc::new(Deferred::new());
    let promise = deferred.promise();
    let gather = Gather::new(keys);

    for (index, input) in promises.into_iter().enumerate() {
        let deferred = deferred.clone();
        let gather = gather.clone();

        input.on_settled(move |outcome| {
            if deferred.is_resolved() {
                return Ok(());
            }

            match outcome {
                Err(err) => deferred.fail(err),
                Ok(value) => {
                    let mut gather = gather.borrow_mut();
                    if !gather.store(index, value) {
                        return Ok(());
                    }

                    let values: Keyed<K, T> = gather.take().collect();
                    drop(gather);

                    deferred.resolve(values)
                }
            }
        });
    }

    promise
}

/// Waits for every input and never fails.
///
/// Resolves with `(failures, values)`, both in input order.
pub fn any<K, T, I>(inputs: I) -> Promise<(Keyed<K, Error>, Keyed<K, T>)>
where
    I: IntoIterator<Item = (K, Promise<T>)>,
    K: Clone + 'static,
    T: Clone + 'static,
{
    let (keys, promises): (Vec<K>, Vec<Promise<T>>) = inputs.into_iter().unzip();
    if promises.is_empty() {
        return Promise::resolved((Keyed::new(), Keyed::new()));
    }

    let deferred = Rc::new(Deferred::new());
    let promise = deferred.promise();
    let gather = Gather::new(keys);

    for (index, input) in promises.into_iter().enumerate() {
        let deferred = deferred.clone();
        let gather = gather.clone();

        input.on_settled(move |outcome| {
            let mut gather = gather.borrow_mut();
            if !gather.store(index, outcome) {
                return Ok(());
            }

            let mut failures = Vec::new();
            let mut values = Vec::new();
            for (key, outcome) in gather.take() {
                match outcome {
                    Ok(value) => values.push((key, value)),
                    Err(err) => failures.push((key, err)),
                }
            }
            drop(gather);

            deferred.resolve((failures.into(), values.into()))
        });
    }

    promise
}

/// Resolves with the first success.
///
/// Fails with [`Error::Multi`] carrying every failure, in settlement order,
/// when all inputs fail. An empty input is rejected with [`Error::EmptyInput`].
pub fn first<K, T, I>(inputs: I) -> Result<Promise<T>, Error>
where
    I: IntoIterator<Item = (K, Promise<T>)>,
    T: Clone + 'static,
{
    let promises: Vec<Promise<T>> = inputs.into_iter().map(|(_, promise)| promise).collect();
    if promises.is_empty() {
        return Err(Error::EmptyInput("first"));
    }

    let total = promises.len();
    let deferred = Rc::new(Deferred::new());
    let promise = deferred.promise();
    let failures: Rc<RefCell<Vec<Error>>> = Rc::new(RefCell::new(Vec::with_capacity(total)));

    for input in promises {
        let deferred = deferred.clone();
        let failures = failures.clone();

        input.on_settled(move |outcome| {
            if deferred.is_resolved() {
                return Ok(());
            }

            match outcome {
                Ok(value) => deferred.resolve(value),
                Err(err) => {
                    let mut failures = failures.borrow_mut();
                    failures.push(err);
                    if failures.len() < total {
                        return Ok(());
                    }

                    let reasons = std::mem::take(&mut *failures);
                    drop(failures);

                    deferred.fail(MultiReasonError::new(reasons).into())
                }
            }
        });
    }

    Ok(promise)
}

/// Applies `callback` position by position across several collections.
///
/// Keys come from the first collection. For each position, `callback`
/// receives the values of every collection at that position (in collection
/// order) once they all succeeded; a failed input or an `Err` from the
/// callback fails that key only.
///
/// ```no_run
/// use tickloop::{combinator::map, Promise};
///
/// # fn main() -> tickloop::Result<()> {
/// let a = vec![Promise::resolved(1), Promise::resolved(2)];
/// let b = vec![Promise::resolved(10), Promise::resolved(20)];
///
/// let sums = map(
///     |values: Vec<i32>| Ok(values.iter().sum::<i32>()),
///     [a.into_iter().enumerate(), b.into_iter().enumerate()],
/// )?;
///
/// assert_eq!(sums.len(), 2);
/// # Ok(())
/// # }
/// ```
pub fn map<K, T, U, F, I, C>(callback: F, collections: C) -> Result<Keyed<K, Promise<U>>, Error>
where
    C: IntoIterator<Item = I>,
    I: IntoIterator<Item = (K, Promise<T>)>,
    K: Clone + 'static,
    T: Clone + 'static,
    U: Clone + 'static,
    F: Fn(Vec<T>) -> Result<U, Error> + 'static,
{
    let columns: Vec<Vec<(K, Promise<T>)>> = collections
        .into_iter()
        .map(|column| column.into_iter().collect())
        .collect();

    let Some(leading) = columns.first() else {
        return Err(Error::EmptyInput("map"));
    };

    let len = leading.len();
    if let Some(column) = columns.iter().find(|column| column.len() != len) {
        return Err(Error::ShapeMismatch {
            expected: len,
            found: column.len(),
        });
    }

    let keys: Vec<K> = leading.iter().map(|(key, _)| key.clone()).collect();

    let mut rows: Vec<Vec<Promise<T>>> = (0..len)
        .map(|_| Vec::with_capacity(columns.len()))
        .collect();
    for column in columns {
        for (row, (_, promise)) in rows.iter_mut().zip(column) {
            row.push(promise);
        }
    }

    let callback = Rc::new(callback);

    Ok(keys
        .into_iter()
        .zip(rows)
        .map(|(key, row)| {
            let callback = callback.clone();
            let joined = all(row.into_iter().enumerate());

            (key, joined.then(move |values| (*callback)(values.into_values())))
        })
        .collect())
}
