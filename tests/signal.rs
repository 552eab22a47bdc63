use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tickloop::Reactor;

/// Signal dispositions are process-wide; tests in this binary take turns.
static SERIAL: Mutex<()> = Mutex::new(());

fn serialize() -> MutexGuard<'static, ()> {
    let _ = env_logger::builder().is_test(true).try_init();
    SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
}

fn raise(signum: libc::c_int) {
    assert_eq!(unsafe { libc::raise(signum) }, 0);
}

#[test]
fn test_signal_watcher_fires() {
    let _serial = serialize();
    let reactor = Reactor::new();
    let received = Rc::new(RefCell::new(Vec::new()));

    let sink = received.clone();
    reactor.on_signal(libc::SIGUSR1, move |reactor, id| {
        sink.borrow_mut().push(libc::SIGUSR1);
        reactor.cancel(id);
    });

    reactor.delay(Duration::from_millis(1), |_, _| raise(libc::SIGUSR1));
    reactor.run();

    assert_eq!(*received.borrow(), vec![libc::SIGUSR1]);
}

#[test]
fn test_every_watcher_of_a_signal_fires() {
    let _serial = serialize();
    let reactor = Reactor::new();
    let received = Rc::new(RefCell::new(Vec::new()));

    for name in ["first", "second"] {
        let sink = received.clone();
        reactor.on_signal(libc::SIGUSR2, move |reactor, id| {
            sink.borrow_mut().push(name);
            reactor.cancel(id);
        });
    }

    reactor.delay(Duration::from_millis(1), |_, _| raise(libc::SIGUSR2));
    reactor.run();

    assert_eq!(*received.borrow(), vec!["first", "second"]);
}

#[test]
fn test_nested_run_owns_signal_delivery() {
    let _serial = serialize();
    let outer = Reactor::new();
    let received = Rc::new(RefCell::new(Vec::new()));

    let sink = received.clone();
    let outer_watcher = outer.on_signal(libc::SIGUSR1, move |_, _| {
        sink.borrow_mut().push("outer");
    });

    let sink = received.clone();
    outer.delay(Duration::from_millis(1), move |outer, _| {
        let inner = Reactor::new();

        let log = sink.clone();
        inner.on_signal(libc::SIGUSR1, move |inner, id| {
            log.borrow_mut().push("inner");
            inner.cancel(id);
        });
        inner.delay(Duration::from_millis(1), |_, _| raise(libc::SIGUSR1));

        inner.run();

        // Ownership is back with the outer loop; nothing is left to deliver.
        outer.cancel(&outer_watcher);
    });

    outer.run();

    assert_eq!(*received.borrow(), vec!["inner"]);
}
