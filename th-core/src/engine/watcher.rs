//! Thermal watcher loop
//!
//! A dedicated thread that blocks on kernel uevents (or a plain timeout when
//! uevents are unavailable) and hands the set of sensors that fired to a
//! callback. The callback reports whether anything is still throttled, which
//! selects the next wait interval:
//!
//! - **Fast poll**: something is throttled, or the platform has no uevents
//! - **Slow wait**: uevent-capable and calm
//!
//! The interval decision ([`poll_interval`]) is separate from the blocking
//! wait ([`EventSource`]) so the loop can be driven without real I/O.

use crate::constants::watcher;
use crate::error::{Result, ThermalError};
use crate::hw::UeventSocket;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Wait interval for the next iteration
pub fn poll_interval(thermal_triggered: bool, is_polling: bool) -> Duration {
    if thermal_triggered || is_polling {
        watcher::MIN_POLL_INTERVAL
    } else {
        watcher::UEVENT_POLL_TIMEOUT
    }
}

// ============================================================================
// Wake Signal
// ============================================================================

/// Cross-thread wake signal backed by an eventfd
///
/// Also carries the stop request, so a wake-up can be told apart from a
/// shutdown.
#[derive(Debug)]
pub struct Waker {
    fd: OwnedFd,
    stopped: AtomicBool,
}

impl Waker {
    pub fn new() -> io::Result<Self> {
        // SAFETY: eventfd() has no memory-safety preconditions; the result is checked below.
        let raw = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: raw is a freshly created descriptor owned by nobody else.
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(raw) },
            stopped: AtomicBool::new(false),
        })
    }

    pub fn wake(&self) {
        let one: u64 = 1;
        // SAFETY: writes exactly 8 bytes from a live u64, as eventfd requires.
        let ret = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                &one as *const u64 as *const libc::c_void,
                mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            // EAGAIN means the counter is saturated, which still wakes the poller
            trace!(error = %io::Error::last_os_error(), "eventfd write failed");
        }
    }

    /// Request the loop to exit and wake it
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.wake();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Block until woken or `timeout` passes; returns whether a wake-up arrived
    pub fn park(&self, timeout: Duration) -> bool {
        match poll_readable(&[self.as_raw_fd()], timeout) {
            Ok(ready) if ready[0] => {
                self.reset();
                true
            }
            Ok(_) => false,
            Err(e) => {
                trace!(error = %e, "eventfd poll failed, sleeping instead");
                thread::sleep(timeout);
                false
            }
        }
    }

    /// Clear any pending wake-ups
    pub fn reset(&self) {
        let mut value: u64 = 0;
        // SAFETY: reads exactly 8 bytes into a live u64, as eventfd requires.
        unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                &mut value as *mut u64 as *mut libc::c_void,
                mem::size_of::<u64>(),
            );
        }
    }
}

impl AsRawFd for Waker {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

// ============================================================================
// Event Sources
// ============================================================================

/// Result of one blocking wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Nothing arrived before the timeout
    TimedOut,
    /// Woken through the [`Waker`] or interrupted; re-checks every sensor
    Woken,
    /// Uevents arrived; the set holds the monitored sensors they named
    Uevent(BTreeSet<String>),
}

/// Blocking wait primitive used by the watcher loop
#[cfg_attr(test, mockall::automock)]
pub trait EventSource: Send {
    /// Whether kernel uevents are delivered; false means fixed-interval polling
    fn is_event_driven(&self) -> bool;

    /// Block for up to `timeout`, returning early on a wake-up or uevent
    fn wait(&mut self, timeout: Duration, waker: &Waker) -> io::Result<WaitOutcome>;
}

/// Poll `fds` for readability; returns the readiness of each
fn poll_readable(fds: &[RawFd], timeout: Duration) -> io::Result<Vec<bool>> {
    let mut pollfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|&fd| libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();
    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

    // SAFETY: pollfds is a live, correctly sized array of pollfd structs.
    let ret =
        unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout_ms) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(pollfds.iter().map(|p| p.revents & libc::POLLIN != 0).collect())
}

/// Event source backed by the kernel uevent socket, or a bare timer when the
/// socket could not be opened
#[derive(Debug)]
pub struct KernelEventSource {
    socket: Option<UeventSocket>,
    monitored: BTreeSet<String>,
}

impl KernelEventSource {
    /// Subscribe to uevents for `monitored`, falling back to polling on failure
    pub fn new(monitored: BTreeSet<String>) -> Self {
        let socket = match UeventSocket::open(watcher::UEVENT_SOCKET_RCVBUF) {
            Ok(socket) => Some(socket),
            Err(e) => {
                error!(error = %e, "Failed to open uevent socket, falling back to polling");
                None
            }
        };
        Self { socket, monitored }
    }

    /// Fixed-interval polling without a uevent socket
    pub fn polling(monitored: BTreeSet<String>) -> Self {
        Self {
            socket: None,
            monitored,
        }
    }
}

impl EventSource for KernelEventSource {
    fn is_event_driven(&self) -> bool {
        self.socket.is_some()
    }

    fn wait(&mut self, timeout: Duration, waker: &Waker) -> io::Result<WaitOutcome> {
        let mut fds = vec![waker.as_raw_fd()];
        if let Some(socket) = &self.socket {
            fds.push(socket.as_raw_fd());
        }

        let ready = match poll_readable(&fds, timeout) {
            Ok(ready) => ready,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(WaitOutcome::Woken),
            Err(e) => return Err(e),
        };

        if ready[0] {
            waker.reset();
            return Ok(WaitOutcome::Woken);
        }
        match &self.socket {
            Some(socket) if ready.get(1).copied().unwrap_or(false) => {
                Ok(WaitOutcome::Uevent(socket.drain(&self.monitored)))
            }
            _ => Ok(WaitOutcome::TimedOut),
        }
    }
}

// ============================================================================
// Loop State
// ============================================================================

/// Per-iteration scheduling state of the watcher loop
#[derive(Debug, Clone)]
pub struct WatcherState {
    pub thermal_triggered: bool,
    pub is_polling: bool,
    pub last_update: Instant,
}

impl WatcherState {
    /// Initial state; an event-driven source starts triggered so the first
    /// pass re-checks every sensor promptly
    pub fn new(event_driven: bool) -> Self {
        Self {
            thermal_triggered: event_driven,
            is_polling: !event_driven,
            last_update: Instant::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        poll_interval(self.thermal_triggered, self.is_polling)
    }

    /// Run one iteration: wait, then invoke `callback` unless the wait ended
    /// in a stop request or a uevent batch naming no monitored sensor.
    /// Returns whether the callback ran.
    ///
    /// A timeout, a wake-up and a failed wait all pass the empty set, which
    /// means every monitored sensor.
    pub fn step<S, F>(&mut self, source: &mut S, waker: &Waker, callback: &mut F) -> bool
    where
        S: EventSource + ?Sized,
        F: FnMut(&BTreeSet<String>) -> bool + ?Sized,
    {
        let interval = self.interval();
        let elapsed = self.last_update.elapsed();

        let sensors = if elapsed < interval {
            match source.wait(interval - elapsed, waker) {
                Ok(WaitOutcome::Woken) => {
                    if waker.is_stopped() {
                        return false;
                    }
                    trace!("Watcher woken, re-checking all sensors");
                    BTreeSet::new()
                }
                Ok(WaitOutcome::Uevent(sensors)) if sensors.is_empty() => {
                    trace!("Uevent batch named no monitored sensors");
                    return false;
                }
                Ok(WaitOutcome::Uevent(sensors)) => sensors,
                Ok(WaitOutcome::TimedOut) => BTreeSet::new(),
                Err(e) => {
                    // Keep the poll rate bounded while the wait keeps failing
                    warn!(error = %e, "Watcher wait failed, polling all sensors");
                    waker.park(interval.saturating_sub(self.last_update.elapsed()));
                    if waker.is_stopped() {
                        return false;
                    }
                    BTreeSet::new()
                }
            }
        } else {
            BTreeSet::new()
        };

        debug!(sensors = ?sensors, "Watcher evaluating sensors");
        self.thermal_triggered = callback(&sensors);
        self.last_update = Instant::now();
        true
    }
}

// ============================================================================
// Watcher Thread
// ============================================================================

/// Handle to the running watcher thread
pub struct ThermalWatcher {
    waker: Arc<Waker>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ThermalWatcher {
    /// Spawn the watcher thread over `source`, calling `callback` on each batch
    pub fn start<S, F>(mut source: S, mut callback: F) -> Result<Self>
    where
        S: EventSource + 'static,
        F: FnMut(&BTreeSet<String>) -> bool + Send + 'static,
    {
        let waker = Arc::new(
            Waker::new().map_err(|e| ThermalError::watcher(format!("eventfd: {e}")))?,
        );
        let thread_waker = Arc::clone(&waker);
        let handle = thread::Builder::new()
            .name(watcher::THREAD_NAME.to_string())
            .spawn(move || {
                let mut state = WatcherState::new(source.is_event_driven());
                info!(polling = state.is_polling, "Thermal watcher started");
                while !thread_waker.is_stopped() {
                    state.step(&mut source, &thread_waker, &mut callback);
                }
                info!("Thermal watcher stopped");
            })
            .map_err(|e| ThermalError::watcher(format!("failed to spawn thread: {e}")))?;

        Ok(Self {
            waker,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Force the loop to re-check every monitored sensor now
    pub fn wake(&self) {
        self.waker.wake();
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop the loop and join the thread
    pub fn shutdown(&self) {
        self.waker.stop();
        if let Some(handle) = self.handle.lock().take() {
            // Dropped from inside the callback; the loop exits on its own
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!("Thermal watcher thread panicked");
            }
        }
    }
}

impl Drop for ThermalWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_interval_selection() {
        assert_eq!(poll_interval(false, false), watcher::UEVENT_POLL_TIMEOUT);
        assert_eq!(poll_interval(true, false), watcher::MIN_POLL_INTERVAL);
        assert_eq!(poll_interval(false, true), watcher::MIN_POLL_INTERVAL);
        assert_eq!(poll_interval(true, true), watcher::MIN_POLL_INTERVAL);
    }

    #[test]
    fn test_initial_state() {
        let state = WatcherState::new(true);
        assert!(state.thermal_triggered);
        assert!(!state.is_polling);
        assert_eq!(state.interval(), watcher::MIN_POLL_INTERVAL);

        let state = WatcherState::new(false);
        assert!(state.is_polling);
        assert_eq!(state.interval(), watcher::MIN_POLL_INTERVAL);
    }

    #[test]
    fn test_timeout_invokes_callback_with_empty_set() {
        let waker = Waker::new().unwrap();
        let mut source = MockEventSource::new();
        source
            .expect_wait()
            .times(1)
            .returning(|_, _| Ok(WaitOutcome::TimedOut));

        let mut state = WatcherState::new(true);
        let mut seen = Vec::new();
        let mut cb = |s: &BTreeSet<String>| {
            seen.push(s.clone());
            false
        };
        assert!(state.step(&mut source, &waker, &mut cb));
        assert_eq!(seen, vec![BTreeSet::new()]);
        assert!(!state.thermal_triggered);
        assert_eq!(state.interval(), watcher::UEVENT_POLL_TIMEOUT);
    }

    #[test]
    fn test_uevent_batch_passed_through() {
        let waker = Waker::new().unwrap();
        let mut source = MockEventSource::new();
        source
            .expect_wait()
            .times(1)
            .returning(|_, _| Ok(WaitOutcome::Uevent(names(&["battery"]))));

        let mut state = WatcherState::new(false);
        let mut seen = Vec::new();
        let mut cb = |s: &BTreeSet<String>| {
            seen.push(s.clone());
            true
        };
        assert!(state.step(&mut source, &waker, &mut cb));
        assert_eq!(seen, vec![names(&["battery"])]);
        assert!(state.thermal_triggered);
    }

    #[test]
    fn test_wake_rechecks_all_sensors() {
        let waker = Waker::new().unwrap();
        let mut source = MockEventSource::new();
        source
            .expect_wait()
            .times(1)
            .returning(|_, _| Ok(WaitOutcome::Woken));

        let mut state = WatcherState::new(true);
        let mut seen = Vec::new();
        let mut cb = |s: &BTreeSet<String>| {
            seen.push(s.clone());
            false
        };
        assert!(state.step(&mut source, &waker, &mut cb));
        assert_eq!(seen, vec![BTreeSet::new()]);
        assert!(!state.thermal_triggered);
    }

    #[test]
    fn test_empty_uevent_and_stop_skip_callback() {
        let waker = Waker::new().unwrap();
        let mut source = MockEventSource::new();
        let mut outcomes = vec![WaitOutcome::Woken, WaitOutcome::Uevent(BTreeSet::new())];
        source
            .expect_wait()
            .times(2)
            .returning(move |_, _| Ok(outcomes.pop().unwrap()));

        let mut state = WatcherState::new(true);
        let before = state.last_update;
        let mut calls = 0;
        let mut cb = |_: &BTreeSet<String>| {
            calls += 1;
            true
        };
        assert!(!state.step(&mut source, &waker, &mut cb));
        waker.stop();
        assert!(!state.step(&mut source, &waker, &mut cb));
        assert_eq!(calls, 0);
        assert_eq!(state.last_update, before);
        assert!(state.thermal_triggered);
    }

    #[test]
    fn test_wait_uses_remaining_interval() {
        let waker = Waker::new().unwrap();
        let mut source = MockEventSource::new();
        source
            .expect_wait()
            .withf(|timeout, _| *timeout <= watcher::MIN_POLL_INTERVAL)
            .times(1)
            .returning(|_, _| Ok(WaitOutcome::TimedOut));

        let mut state = WatcherState::new(true);
        let mut cb = |_: &BTreeSet<String>| true;
        state.step(&mut source, &waker, &mut cb);
    }

    #[test]
    fn test_overdue_iteration_skips_wait() {
        let waker = Waker::new().unwrap();
        let mut source = MockEventSource::new();
        source.expect_wait().times(0);

        let mut state = WatcherState::new(true);
        state.last_update = Instant::now() - Duration::from_secs(10);
        let mut calls = 0;
        let mut cb = |_: &BTreeSet<String>| {
            calls += 1;
            false
        };
        assert!(state.step(&mut source, &waker, &mut cb));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_wait_error_polls_everything() {
        let waker = Waker::new().unwrap();
        let mut source = MockEventSource::new();
        source
            .expect_wait()
            .returning(|_, _| Err(io::Error::new(io::ErrorKind::Other, "boom")));

        let mut state = WatcherState::new(true);
        state.last_update = Instant::now() - watcher::MIN_POLL_INTERVAL + Duration::from_millis(10);
        let mut seen = Vec::new();
        let mut cb = |s: &BTreeSet<String>| {
            seen.push(s.len());
            true
        };
        assert!(state.step(&mut source, &waker, &mut cb));
        assert_eq!(seen, vec![0]);
    }

    #[test]
    fn test_failing_wait_is_rate_limited() {
        let waker = Waker::new().unwrap();
        let mut source = MockEventSource::new();
        source
            .expect_wait()
            .times(2)
            .returning(|_, _| Err(io::Error::new(io::ErrorKind::Other, "boom")));

        let remaining = Duration::from_millis(100);
        let mut state = WatcherState::new(true);
        state.last_update = Instant::now() - watcher::MIN_POLL_INTERVAL + remaining;
        let mut cb = |_: &BTreeSet<String>| true;

        let started = Instant::now();
        assert!(state.step(&mut source, &waker, &mut cb));
        assert!(started.elapsed() >= remaining - Duration::from_millis(20));

        // A stop request cuts the back-off short and skips the callback
        waker.stop();
        let started = Instant::now();
        assert!(!state.step(&mut source, &waker, &mut cb));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_waker_interrupts_poll() {
        let waker = Waker::new().unwrap();
        let mut source = KernelEventSource::polling(BTreeSet::new());
        assert!(!source.is_event_driven());

        waker.wake();
        let started = Instant::now();
        let outcome = source.wait(Duration::from_secs(5), &waker).unwrap();
        assert_eq!(outcome, WaitOutcome::Woken);
        assert!(started.elapsed() < Duration::from_secs(1));

        // Wake-ups are consumed
        let outcome = source.wait(Duration::from_millis(20), &waker).unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[test]
    fn test_thread_runs_and_shuts_down() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut source = MockEventSource::new();
        source.expect_is_event_driven().return_const(false);
        source.expect_wait().returning(|timeout, _| {
            thread::sleep(timeout.min(Duration::from_millis(5)));
            Ok(WaitOutcome::TimedOut)
        });

        let watcher = ThermalWatcher::start(source, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        })
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while calls.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(calls.load(Ordering::SeqCst) >= 3);
        assert!(watcher.is_running());

        watcher.wake();
        watcher.shutdown();
        assert!(!watcher.is_running());
    }

    #[test]
    fn test_wake_triggers_reevaluation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        // Event-driven and calm: the next scheduled pass is minutes away
        let mut source = MockEventSource::new();
        source.expect_is_event_driven().return_const(true);
        source.expect_wait().returning(|timeout, waker| {
            Ok(if waker.park(timeout) {
                WaitOutcome::Woken
            } else {
                WaitOutcome::TimedOut
            })
        });

        let watcher = ThermalWatcher::start(source, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        })
        .unwrap();

        let deadline = Instant::now() + watcher::MIN_POLL_INTERVAL * 3;
        while calls.load(Ordering::SeqCst) < 1 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        watcher.wake();
        let deadline = Instant::now() + Duration::from_secs(5);
        while calls.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        watcher.shutdown();
        assert!(!watcher.is_running());
    }
}
