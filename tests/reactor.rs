use std::cell::{Cell, RefCell};
use std::io;
use std::os::fd::AsRawFd;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tickloop::{Backend, Error, Promise, Reactor, Watch, WatcherId};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn capture_errors(reactor: &Reactor) -> Rc<RefCell<Vec<Error>>> {
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = errors.clone();

    reactor.set_error_handler(Some(Box::new(move |err: Error| sink.borrow_mut().push(err))));

    errors
}

#[test]
fn test_delay_fires_once_and_is_cancelled() {
    init();
    let reactor = Reactor::new();
    let fired = Rc::new(Cell::new(0));

    let counter = fired.clone();
    let id = reactor.delay(Duration::from_millis(5), move |reactor, id| {
        assert!(!reactor.contains(id), "delay is cancelled before its callback");
        counter.set(counter.get() + 1);
    });

    let start = Instant::now();
    reactor.run();

    assert_eq!(fired.get(), 1);
    assert!(start.elapsed() >= Duration::from_millis(5));
    assert!(!reactor.contains(&id));
}

#[test]
fn test_repeat_fires_until_cancelled() {
    init();
    let reactor = Reactor::new();
    let fired = Rc::new(Cell::new(0));

    let counter = fired.clone();
    reactor.repeat(Duration::from_millis(1), move |reactor, id| {
        counter.set(counter.get() + 1);
        if counter.get() == 3 {
            reactor.cancel(id);
        }
    });

    reactor.run();
    assert_eq!(fired.get(), 3);
}

#[test]
fn test_zero_interval_repeat_fires_once_per_tick() {
    init();
    let reactor = Reactor::new();
    let fired = Rc::new(Cell::new(0));
    let delayed = Rc::new(Cell::new(false));

    let counter = fired.clone();
    reactor.repeat(Duration::ZERO, move |reactor, id| {
        counter.set(counter.get() + 1);
        if counter.get() == 3 {
            reactor.cancel(id);
        }
    });

    let flag = delayed.clone();
    reactor.delay(Duration::ZERO, move |_, _| flag.set(true));

    reactor.run();
    assert_eq!(fired.get(), 3);
    assert!(delayed.get());
}

#[test]
fn test_disabled_watcher_does_not_keep_loop_alive() {
    init();
    let reactor = Reactor::new();
    let fired = Rc::new(Cell::new(false));

    let flag = fired.clone();
    let id = reactor.repeat(Duration::from_millis(1), move |_, _| flag.set(true));
    reactor.disable(&id);

    reactor.run();

    assert!(!fired.get());
    assert!(reactor.contains(&id));
    assert!(!reactor.is_enabled(&id));
}

#[test]
fn test_reenabled_watcher_fires() {
    init();
    let reactor = Reactor::new();
    let fired = Rc::new(Cell::new(0));

    let counter = fired.clone();
    let id = reactor.delay(Duration::from_millis(1), move |_, _| counter.set(counter.get() + 1));
    reactor.disable(&id);
    reactor.enable(&id).unwrap();

    reactor.run();
    assert_eq!(fired.get(), 1);
}

#[test]
fn test_unreferenced_watcher_does_not_keep_loop_alive() {
    init();
    let reactor = Reactor::new();
    let ticks = Rc::new(Cell::new(0));

    let counter = ticks.clone();
    let background = reactor.repeat(Duration::from_millis(1), move |_, _| {
        counter.set(counter.get() + 1);
    });
    reactor.unreference(&background);
    assert!(!reactor.is_referenced(&background));

    reactor.delay(Duration::from_millis(20), |_, _| {});

    let start = Instant::now();
    reactor.run();

    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(ticks.get() > 0, "unreferenced watchers still fire while the loop runs");
    assert!(reactor.contains(&background));
}

#[test]
fn test_unknown_ids() {
    init();
    let reactor = Reactor::new();

    let id = reactor.delay(Duration::from_millis(1), |_, _| {});
    reactor.cancel(&id);
    reactor.cancel(&id);

    assert!(matches!(reactor.enable(&id), Err(Error::InvalidWatcher(_))));
    assert!(matches!(reactor.reference(&id), Err(Error::InvalidWatcher(_))));

    reactor.disable(&id);
    reactor.unreference(&id);

    reactor.run();
}

#[test]
fn test_ids_are_never_reused() {
    init();
    let reactor = Reactor::new();

    let first = reactor.delay(Duration::ZERO, |_, _| {});
    reactor.cancel(&first);
    let second = reactor.delay(Duration::ZERO, |_, _| {});

    assert_ne!(first, second);
}

#[test]
fn test_stop_ends_the_run() {
    init();
    let reactor = Reactor::new();
    let fired = Rc::new(Cell::new(0));

    let counter = fired.clone();
    let id = reactor.repeat(Duration::from_millis(1), move |reactor, _| {
        counter.set(counter.get() + 1);
        if counter.get() == 3 {
            reactor.stop();
        }
    });

    reactor.run();

    assert_eq!(fired.get(), 3);
    assert!(reactor.is_enabled(&id));
    assert!(!reactor.is_running());

    // Stopping an idle loop does nothing.
    reactor.stop();
    reactor.cancel(&id);
    reactor.run();
}

#[test]
fn test_deferred_callbacks_run_in_order() {
    init();
    let reactor = Reactor::new();
    let order = Rc::new(RefCell::new(Vec::new()));

    for name in ["a", "b"] {
        let order = order.clone();
        reactor.defer(move |reactor| {
            order.borrow_mut().push(name);

            if name == "a" {
                let order = order.clone();
                reactor.defer(move |_| order.borrow_mut().push("c"));
            }
        });
    }

    reactor.run();
    assert_eq!(*order.borrow(), vec!["a", "b", "c"]);
}

#[test]
fn test_pipe_readiness() {
    init();
    let reactor = Reactor::new();

    let mut fds = [0; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    let [read_fd, write_fd] = fds;

    let received = Rc::new(RefCell::new(Vec::new()));

    reactor.on_writable(write_fd, move |reactor, id| {
        let written = unsafe { libc::write(write_fd, b"ping".as_ptr() as *const libc::c_void, 4) };
        assert_eq!(written, 4);
        reactor.cancel(id);
    });

    let sink = received.clone();
    reactor.on_readable(read_fd, move |reactor, id| {
        let mut buffer = [0u8; 16];
        let n = unsafe { libc::read(read_fd, buffer.as_mut_ptr() as *mut libc::c_void, buffer.len()) };
        assert!(n > 0);

        sink.borrow_mut().extend_from_slice(&buffer[..n as usize]);
        reactor.cancel(id);
    });

    reactor.run();
    assert_eq!(received.borrow().as_slice(), b"ping");

    unsafe {
        libc::close(read_fd);
        libc::close(write_fd);
    }
}

#[test]
fn test_callback_errors_reach_the_handler() {
    init();
    let reactor = Reactor::new();
    let errors = capture_errors(&reactor);

    reactor.delay(Duration::ZERO, |_, _| Err::<(), _>(Error::msg("watcher failed")));
    reactor.defer(|_| Err::<(), _>(Error::msg("deferred failed")));
    reactor.delay(Duration::from_millis(1), |_, _| {
        Promise::<()>::failed(Error::msg("returned promise failed"))
    });

    reactor.run();

    let messages: Vec<String> = errors.borrow().iter().map(ToString::to_string).collect();
    assert_eq!(
        messages,
        vec!["deferred failed", "watcher failed", "returned promise failed"]
    );
}

#[test]
fn test_errors_without_handler_do_not_abort_the_loop() {
    init();
    let reactor = Reactor::new();
    let reached = Rc::new(Cell::new(false));

    reactor.defer(|_| Err::<(), _>(Error::msg("logged and dropped")));

    let flag = reached.clone();
    reactor.delay(Duration::from_millis(1), move |_, _| flag.set(true));

    reactor.run();
    assert!(reached.get());
}

#[test]
fn test_set_error_handler_returns_previous() {
    init();
    let reactor = Reactor::builder()
        .error_handler(|_| {})
        .build()
        .unwrap();

    assert!(reactor.set_error_handler(None).is_some());
    assert!(reactor.set_error_handler(None).is_none());
}

#[test]
fn test_failed_activation_disables_watcher() {
    init();
    let reactor = Reactor::new();
    let errors = capture_errors(&reactor);

    let path = std::env::temp_dir().join(format!("tickloop-reactor-{}", std::process::id()));
    let file = std::fs::File::create(&path).unwrap();

    let id = reactor.on_readable(file.as_raw_fd(), |_, _| {});
    reactor.run();

    assert!(!reactor.is_enabled(&id));
    assert!(matches!(errors.borrow().as_slice(), [Error::Io(_)]));

    std::fs::remove_file(path).unwrap();
}

#[test]
fn test_nested_run_returns_to_outer_loop() {
    init();
    let reactor = Reactor::new();
    let order = Rc::new(RefCell::new(Vec::new()));

    let log = order.clone();
    reactor.delay(Duration::from_millis(1), move |reactor, _| {
        let inner = log.clone();
        reactor.delay(Duration::from_millis(1), move |_, _| inner.borrow_mut().push("inner"));

        assert!(reactor.is_running());
        reactor.run();
        assert!(reactor.is_running(), "outer loop keeps running after the nested one");

        log.borrow_mut().push("after nested run");
    });

    reactor.run();
    assert_eq!(*order.borrow(), vec!["inner", "after nested run"]);
}

#[test]
fn test_block_on_returns_the_outcome() {
    init();
    let reactor = Reactor::new();

    let value = reactor.enter(|| {
        let deferred = tickloop::Deferred::new();
        let promise = deferred.promise();

        Reactor::current().delay(Duration::from_millis(1), move |_, _| deferred.resolve(11));
        promise
    });

    assert_eq!(reactor.block_on(&value).unwrap(), 11);
}

/// Backend that fires every armed timer on the next dispatch.
struct RecordingBackend {
    log: Rc<RefCell<Vec<String>>>,
    due: Vec<WatcherId>,
}

impl Backend for RecordingBackend {
    fn activate(&mut self, watchers: &[(WatcherId, Watch)]) -> Vec<(WatcherId, io::Error)> {
        for (id, watch) in watchers {
            self.log.borrow_mut().push(format!("activate {id}"));
            if let Watch::Delay(_) | Watch::Repeat(_) = watch {
                self.due.push(id.clone());
            }
        }

        Vec::new()
    }

    fn deactivate(&mut self, id: &WatcherId, _watch: &Watch) {
        self.log.borrow_mut().push(format!("deactivate {id}"));
        self.due.retain(|due| due != id);
    }

    fn dispatch(&mut self, blocking: bool) -> io::Result<Vec<WatcherId>> {
        self.log.borrow_mut().push(format!("dispatch blocking={blocking}"));
        Ok(std::mem::take(&mut self.due))
    }
}

#[test]
fn test_custom_backend_sees_watcher_lifecycle() {
    init();
    let log = Rc::new(RefCell::new(Vec::new()));

    let reactor = Reactor::builder()
        .backend(RecordingBackend {
            log: log.clone(),
            due: Vec::new(),
        })
        .build()
        .unwrap();

    let fired = Rc::new(Cell::new(false));
    let flag = fired.clone();
    let id = reactor.delay(Duration::from_secs(60), move |_, _| flag.set(true));

    reactor.run();

    assert!(fired.get());
    assert_eq!(
        *log.borrow(),
        vec![
            format!("activate {id}"),
            "dispatch blocking=true".to_string(),
            format!("deactivate {id}"),
        ]
    );
}
