use std::time::Duration;

use tickloop::time::pause;
use tickloop::{Deferred, Error, Keyed, Promise, Reactor, all, any, first, map};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A promise failing with `message` after `millis`.
fn fail_after<T: Clone + 'static>(millis: u64, message: &'static str) -> Promise<T> {
    let deferred = Deferred::new();
    let promise = deferred.promise();

    Reactor::current().delay(Duration::from_millis(millis), move |_, _| {
        deferred.fail(Error::msg(message))
    });

    promise
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[test]
fn test_all_of_nothing_is_empty() {
    init();
    let reactor = Reactor::new();

    reactor.enter(|| {
        let empty: Vec<(usize, Promise<u8>)> = Vec::new();
        let result = all(empty).wait().unwrap();

        assert!(result.is_empty());
    });
}

#[test]
fn test_all_keeps_key_order() {
    init();
    let reactor = Reactor::new();

    reactor.enter(|| {
        let settled = vec![Promise::resolved('a'), Promise::resolved('b'), Promise::resolved('c')];
        let result = all(settled.into_iter().enumerate()).wait().unwrap();
        assert_eq!(result, Keyed::from(vec![(0, 'a'), (1, 'b'), (2, 'c')]));

        let delayed = vec![("slow", pause(ms(20), 1)), ("fast", pause(ms(5), 2))];
        let result = all(delayed).wait().unwrap();
        assert_eq!(result.into_inner(), vec![("slow", 1), ("fast", 2)]);
    });
}

#[test]
fn test_all_fails_with_first_failure() {
    init();
    let reactor = Reactor::new();

    reactor.enter(|| {
        let inputs = vec![
            pause(ms(5), 1),
            fail_after(10, "second"),
            fail_after(20, "third"),
        ];

        let err = all(inputs.into_iter().enumerate()).wait().unwrap_err();
        assert_eq!(err.to_string(), "second");
    });
}

#[test]
fn test_any_splits_failures_and_values() {
    init();
    let reactor = Reactor::new();

    reactor.enter(|| {
        let inputs = vec![
            ("one", pause(ms(20), 1)),
            ("two", fail_after(10, "two failed")),
            ("three", pause(ms(10), 3)),
        ];

        let (failures, values) = any(inputs).wait().unwrap();

        assert_eq!(failures.keys().copied().collect::<Vec<_>>(), vec!["two"]);
        assert_eq!(failures.get(&"two").unwrap().to_string(), "two failed");
        assert_eq!(values, Keyed::from(vec![("one", 1), ("three", 3)]));
    });
}

#[test]
fn test_any_of_nothing_is_empty() {
    init();
    let reactor = Reactor::new();

    reactor.enter(|| {
        let empty: Vec<(usize, Promise<u8>)> = Vec::new();
        let (failures, values) = any(empty).wait().unwrap();

        assert!(failures.is_empty());
        assert!(values.is_empty());
    });
}

#[test]
fn test_first_skips_failures() {
    init();
    let reactor = Reactor::new();

    reactor.enter(|| {
        let inputs = vec![
            Promise::failed(Error::msg("a")),
            Promise::failed(Error::msg("b")),
            Promise::resolved(3),
        ];

        let value = first(inputs.into_iter().enumerate()).unwrap().wait().unwrap();
        assert_eq!(value, 3);
    });
}

#[test]
fn test_first_collects_every_failure() {
    init();
    let reactor = Reactor::new();

    reactor.enter(|| {
        let inputs: Vec<Promise<u8>> = vec![
            fail_after(15, "late"),
            Promise::failed(Error::msg("immediate")),
            fail_after(5, "early"),
        ];

        let err = first(inputs.into_iter().enumerate()).unwrap().wait().unwrap_err();
        let multi = match err {
            Error::Multi(multi) => multi,
            other => panic!("expected an aggregate error, got {other:?}"),
        };

        let reasons: Vec<String> = multi.reasons().iter().map(ToString::to_string).collect();
        assert_eq!(reasons, vec!["immediate", "early", "late"]);
    });
}

#[test]
fn test_first_of_nothing_fails_immediately() {
    init();
    let reactor = Reactor::new();

    reactor.enter(|| {
        let empty: Vec<(usize, Promise<u8>)> = Vec::new();
        assert!(matches!(first(empty), Err(Error::EmptyInput(_))));
    });
}

#[test]
fn test_map_combines_positions() {
    init();
    let reactor = Reactor::new();

    reactor.enter(|| {
        let left = [1, 2, 3].map(Promise::resolved);
        let right = [3, 2, 1].map(Promise::resolved);

        let sums = map(
            |values: Vec<i32>| Ok(values.iter().sum::<i32>()),
            [left.into_iter().enumerate(), right.into_iter().enumerate()],
        )
        .unwrap();

        assert_eq!(sums.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
        for promise in sums.values() {
            assert_eq!(promise.wait().unwrap(), 4);
        }
    });
}

#[test]
fn test_map_failure_stays_with_its_key() {
    init();
    let reactor = Reactor::new();

    reactor.enter(|| {
        let inputs = vec![
            ("ok", Promise::resolved(2)),
            ("zero", Promise::resolved(0)),
            ("broken", Promise::failed(Error::msg("no input"))),
        ];

        let results = map(
            |values: Vec<i32>| match values[0] {
                0 => Err(Error::msg("division by zero")),
                n => Ok(10 / n),
            },
            [inputs],
        )
        .unwrap();

        assert_eq!(results.get(&"ok").unwrap().wait().unwrap(), 5);
        assert_eq!(
            results.get(&"zero").unwrap().wait().unwrap_err().to_string(),
            "division by zero"
        );
        assert_eq!(
            results.get(&"broken").unwrap().wait().unwrap_err().to_string(),
            "no input"
        );
    });
}

#[test]
fn test_map_rejects_bad_shapes() {
    init();
    let reactor = Reactor::new();

    reactor.enter(|| {
        let none: Vec<Vec<(usize, Promise<i32>)>> = Vec::new();
        let result = map(|values: Vec<i32>| Ok(values.len()), none);
        assert!(matches!(result, Err(Error::EmptyInput(_))));

        let long = vec![(0, Promise::resolved(1)), (1, Promise::resolved(2))];
        let short = vec![(0, Promise::resolved(1))];
        let result = map(|values: Vec<i32>| Ok(values.len()), [long, short]);
        assert!(matches!(
            result,
            Err(Error::ShapeMismatch {
                expected: 2,
                found: 1
            })
        ));
    });
}
