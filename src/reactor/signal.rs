//! Process-wide signal plumbing for the reference backend.
//!
//! Signals are delivered through a self-pipe: an async-signal-safe
//! `sigaction` handler writes the signal number to the write end of the pipe
//! owned by the backend that armed signals last, and that backend reads it
//! back from its `epoll` set.
//!
//! Dispositions are reference counted per signal number: the handler is
//! installed when the first watcher for a number is armed anywhere in the
//! process and the previous disposition comes back when the last one is
//! disarmed.

use libc::{SA_RESTART, c_int, sigaction, sigemptyset};
use std::collections::HashMap;
use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::ptr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

/// Write end of the pipe currently receiving signals, or -1.
static DELIVERY_FD: AtomicI32 = AtomicI32::new(-1);

/// Armed watchers per signal number and the disposition to restore.
static DISPOSITIONS: OnceLock<Mutex<HashMap<c_int, Disposition>>> = OnceLock::new();

struct Disposition {
    armed: usize,
    previous: sigaction,
}

// Only ever touched under the mutex.
unsafe impl Send for Disposition {}

extern "C" fn deliver(signum: c_int) {
    let fd = DELIVERY_FD.load(Ordering::Relaxed);
    if fd < 0 {
        return;
    }

    unsafe {
        let errno = libc::__errno_location();
        let saved = *errno;

        let byte = signum as u8;
        libc::write(fd, &byte as *const u8 as *const libc::c_void, 1);

        *errno = saved;
    }
}

fn dispositions() -> &'static Mutex<HashMap<c_int, Disposition>> {
    DISPOSITIONS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Routes every future signal to `fd`.
pub(crate) fn route_to(fd: RawFd) {
    DELIVERY_FD.store(fd, Ordering::SeqCst);
}

/// Stops routing signals to `fd` if it is still the destination.
pub(crate) fn unroute(fd: RawFd) {
    let _ = DELIVERY_FD.compare_exchange(fd, -1, Ordering::SeqCst, Ordering::SeqCst);
}

/// Installs the delivery handler for `signum`, once per process.
pub(crate) fn arm(signum: c_int) -> io::Result<()> {
    let mut table = dispositions().lock().unwrap_or_else(PoisonError::into_inner);

    if let Some(disposition) = table.get_mut(&signum) {
        disposition.armed += 1;
        return Ok(());
    }

    let previous = unsafe {
        let mut action: sigaction = mem::zeroed();
        action.sa_sigaction = deliver as extern "C" fn(c_int) as libc::sighandler_t;
        action.sa_flags = SA_RESTART;
        sigemptyset(&mut action.sa_mask);

        let mut previous: sigaction = mem::zeroed();
        if libc::sigaction(signum, &action, &mut previous) != 0 {
            return Err(io::Error::last_os_error());
        }

        previous
    };

    log::debug!("installed delivery handler for signal {signum}");
    table.insert(signum, Disposition { armed: 1, previous });

    Ok(())
}

/// Releases one watcher of `signum`, restoring the old disposition after the last.
pub(crate) fn disarm(signum: c_int) {
    let mut table = dispositions().lock().unwrap_or_else(PoisonError::into_inner);

    let Some(disposition) = table.get_mut(&signum) else {
        return;
    };

    disposition.armed -= 1;
    if disposition.armed > 0 {
        return;
    }

    if let Some(disposition) = table.remove(&signum) {
        unsafe {
            libc::sigaction(signum, &disposition.previous, ptr::null_mut());
        }
        log::debug!("restored disposition of signal {signum}");
    }
}
