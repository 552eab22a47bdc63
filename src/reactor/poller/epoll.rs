//! Linux `epoll`-based backend.
//!
//! Responsibilities:
//! - arm descriptors with read/write interests (level-triggered),
//! - keep the deadline queue of delay and repeat watchers,
//! - receive signals through the process-wide self-pipe,
//! - perform one bounded `epoll_wait()` per dispatch.
//!
//! Read and write watchers on the same descriptor share one `epoll`
//! registration whose interest set is the union of both.

use crate::reactor::backend::Backend;
use crate::reactor::signal;
use crate::reactor::timer::TimerQueue;
use crate::reactor::watcher::{Watch, WatcherId};

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLHUP, EPOLLIN,
    EPOLLOUT, O_CLOEXEC, O_NONBLOCK, c_int, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

/// Token of the signal pipe's read end. Descriptor tokens are non-negative.
const SIGNAL_TOKEN: u64 = u64::MAX;

/// Default size of the event buffer.
pub(crate) const DEFAULT_CAPACITY: usize = 64;

/// Watchers interested in one descriptor.
#[derive(Default)]
struct Interest {
    readers: Vec<WatcherId>,
    writers: Vec<WatcherId>,
}

impl Interest {
    fn flags(&self) -> u32 {
        let mut flags = 0;

        if !self.readers.is_empty() {
            flags |= EPOLLIN;
        }
        if !self.writers.is_empty() {
            flags |= EPOLLOUT;
        }

        flags as u32
    }

    fn is_empty(&self) -> bool {
        self.readers.is_empty() && self.writers.is_empty()
    }
}

/// Reference [`Backend`] built on `epoll`.
pub struct EpollBackend {
    /// Epoll file descriptor.
    epoll: RawFd,

    /// Reusable buffer for epoll events.
    events: Vec<epoll_event>,

    descriptors: HashMap<RawFd, Interest>,
    timers: TimerQueue,

    /// Signal watchers per signal number.
    signals: HashMap<c_int, Vec<WatcherId>>,

    /// Self-pipe: `[read, write]`.
    pipe: [RawFd; 2],
}

impl EpollBackend {
    /// Creates a backend with the default event buffer size.
    pub fn new() -> io::Result<Self> {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a backend able to report `capacity` descriptors per wait.
    pub fn with_capacity(capacity: usize) -> io::Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut pipe = [-1; 2];
        let rc = unsafe { libc::pipe2(pipe.as_mut_ptr(), O_NONBLOCK | O_CLOEXEC) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(epoll) };
            return Err(err);
        }

        let backend = Self {
            epoll,
            events: Vec::with_capacity(capacity.max(1)),
            descriptors: HashMap::new(),
            timers: TimerQueue::new(),
            signals: HashMap::new(),
            pipe,
        };

        backend.control(EPOLL_CTL_ADD, pipe[0], EPOLLIN as u32, SIGNAL_TOKEN)?;

        Ok(backend)
    }

    fn control(&self, op: c_int, fd: RawFd, flags: u32, token: u64) -> io::Result<()> {
        let mut event = epoll_event {
            events: flags,
            u64: token,
        };

        let rc = unsafe { epoll_ctl(self.epoll, op, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    fn arm_descriptor(&mut self, id: &WatcherId, fd: RawFd, write: bool) -> io::Result<()> {
        let existed = self.descriptors.contains_key(&fd);
        let interest = self.descriptors.entry(fd).or_default();

        if write {
            interest.writers.push(id.clone());
        } else {
            interest.readers.push(id.clone());
        }
        let flags = interest.flags();

        let op = if existed { EPOLL_CTL_MOD } else { EPOLL_CTL_ADD };
        let result = self.control(op, fd, flags, fd as u64);

        if result.is_err() {
            self.forget_descriptor(id, fd);
        }

        result
    }

    // Removes `id` from the interest of `fd`, returning the remaining flags.
    fn forget_descriptor(&mut self, id: &WatcherId, fd: RawFd) -> Option<u32> {
        let interest = self.descriptors.get_mut(&fd)?;

        interest.readers.retain(|reader| reader != id);
        interest.writers.retain(|writer| writer != id);

        if interest.is_empty() {
            self.descriptors.remove(&fd);
            return None;
        }

        Some(interest.flags())
    }

    fn disarm_descriptor(&mut self, id: &WatcherId, fd: RawFd) {
        if !self.descriptors.contains_key(&fd) {
            return;
        }

        // The descriptor may already be closed; nothing to do about a failure here.
        let _ = match self.forget_descriptor(id, fd) {
            Some(flags) => self.control(EPOLL_CTL_MOD, fd, flags, fd as u64),
            None => self.control(EPOLL_CTL_DEL, fd, 0, 0),
        };
    }

    fn arm_signal(&mut self, id: &WatcherId, signum: c_int) -> io::Result<()> {
        signal::arm(signum)?;
        signal::route_to(self.pipe[1]);

        self.signals.entry(signum).or_default().push(id.clone());

        Ok(())
    }

    fn disarm_signal(&mut self, id: &WatcherId, signum: c_int) {
        let Some(watchers) = self.signals.get_mut(&signum) else {
            return;
        };

        let before = watchers.len();
        watchers.retain(|watcher| watcher != id);
        if watchers.len() == before {
            return;
        }

        if watchers.is_empty() {
            self.signals.remove(&signum);
        }
        signal::disarm(signum);

        if self.signals.is_empty() {
            signal::unroute(self.pipe[1]);
        }
    }

    fn drain_signals(&mut self, fired: &mut Vec<WatcherId>) {
        let mut buffer = [0u8; 64];

        loop {
            let n = unsafe {
                libc::read(
                    self.pipe[0],
                    buffer.as_mut_ptr() as *mut libc::c_void,
                    buffer.len(),
                )
            };

            if n <= 0 {
                return;
            }

            for &signum in &buffer[..n as usize] {
                if let Some(watchers) = self.signals.get(&(signum as c_int)) {
                    fired.extend(watchers.iter().cloned());
                }
            }
        }
    }

    fn wait_timeout(&mut self, blocking: bool) -> c_int {
        if !blocking {
            return 0;
        }

        match self.timers.next_remaining(Instant::now()) {
            Some(remaining) => millis_rounded_up(remaining),
            None => -1,
        }
    }
}

/// Rounds up so that a wait never wakes before the deadline it waits for.
fn millis_rounded_up(duration: Duration) -> c_int {
    let millis = duration.as_nanos().div_ceil(1_000_000);
    millis.min(c_int::MAX as u128) as c_int
}

impl Backend for EpollBackend {
    fn activate(&mut self, watchers: &[(WatcherId, Watch)]) -> Vec<(WatcherId, io::Error)> {
        let now = Instant::now();
        let mut failures = Vec::new();

        for (id, watch) in watchers {
            let result = match *watch {
                Watch::Readable(fd) => self.arm_descriptor(id, fd, false),
                Watch::Writable(fd) => self.arm_descriptor(id, fd, true),
                Watch::Delay(after) => {
                    self.timers.insert(id.clone(), after, false, now);
                    Ok(())
                }
                Watch::Repeat(interval) => {
                    self.timers.insert(id.clone(), interval, true, now);
                    Ok(())
                }
                Watch::Signal(signum) => self.arm_signal(id, signum),
            };

            if let Err(err) = result {
                failures.push((id.clone(), err));
            }
        }

        failures
    }

    fn deactivate(&mut self, id: &WatcherId, watch: &Watch) {
        match *watch {
            Watch::Readable(fd) | Watch::Writable(fd) => self.disarm_descriptor(id, fd),
            Watch::Delay(_) | Watch::Repeat(_) => self.timers.remove(id),
            Watch::Signal(signum) => self.disarm_signal(id, signum),
        }
    }

    fn dispatch(&mut self, blocking: bool) -> io::Result<Vec<WatcherId>> {
        let timeout = self.wait_timeout(blocking);

        self.events.clear();
        let n = unsafe {
            epoll_wait(
                self.epoll,
                self.events.as_mut_ptr(),
                self.events.capacity() as c_int,
                timeout,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        } else {
            unsafe {
                self.events.set_len(n as usize);
            }
        }

        let mut fired = Vec::new();
        if !self.timers.is_empty() {
            self.timers.expire(Instant::now(), &mut fired);
        }

        let ready: Vec<(u64, u32)> = self
            .events
            .iter()
            .map(|event| (event.u64, event.events))
            .collect();

        for (token, flags) in ready {
            if token == SIGNAL_TOKEN {
                self.drain_signals(&mut fired);
                continue;
            }

            let Some(interest) = self.descriptors.get(&(token as RawFd)) else {
                continue;
            };

            let broken = flags & ((EPOLLERR | EPOLLHUP) as u32) != 0;
            if broken || flags & (EPOLLIN as u32) != 0 {
                fired.extend(interest.readers.iter().cloned());
            }
            if broken || flags & (EPOLLOUT as u32) != 0 {
                fired.extend(interest.writers.iter().cloned());
            }
        }

        Ok(fired)
    }
}

impl Drop for EpollBackend {
    fn drop(&mut self) {
        for (&signum, watchers) in &self.signals {
            for _ in watchers {
                signal::disarm(signum);
            }
        }
        signal::unroute(self.pipe[1]);

        unsafe {
            libc::close(self.pipe[0]);
            libc::close(self.pipe[1]);
            libc::close(self.epoll);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounding_never_shortens_a_wait() {
        assert_eq!(millis_rounded_up(Duration::ZERO), 0);
        assert_eq!(millis_rounded_up(Duration::from_micros(1)), 1);
        assert_eq!(millis_rounded_up(Duration::from_millis(5)), 5);
        assert_eq!(millis_rounded_up(Duration::from_micros(5_001)), 6);
    }

    #[test]
    fn test_expired_delay_is_reported() {
        let mut backend = EpollBackend::new().unwrap();
        let id = WatcherId::from_sequence(1);

        let failures = backend.activate(&[(id.clone(), Watch::Delay(Duration::ZERO))]);
        assert!(failures.is_empty());

        assert_eq!(backend.dispatch(true).unwrap(), vec![id]);
        assert!(backend.dispatch(false).unwrap().is_empty());
    }

    #[test]
    fn test_regular_file_cannot_be_armed() {
        let path = std::env::temp_dir().join(format!("tickloop-epoll-{}", std::process::id()));
        let file = std::fs::File::create(&path).unwrap();
        let fd = std::os::fd::AsRawFd::as_raw_fd(&file);

        let mut backend = EpollBackend::new().unwrap();
        let failures = backend.activate(&[(WatcherId::from_sequence(1), Watch::Readable(fd))]);

        assert_eq!(failures.len(), 1);
        std::fs::remove_file(path).unwrap();
    }
}
