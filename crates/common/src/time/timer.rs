//! Recurring timer running on a dedicated thread
//!
//! The cache must work inside hosts that have no async runtime, so the
//! sweep driver is a plain named OS thread. The thread sleeps on a condition
//! variable, which lets [`TimerHandle::cancel`] wake it immediately instead
//! of waiting out the rest of the period.

use std::io;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct TimerState {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// A timer handle that can be used to cancel a timer
#[derive(Debug, Clone)]
pub struct TimerHandle {
    state: Arc<TimerState>,
}

impl TimerHandle {
    fn new() -> Self {
        Self { state: Arc::new(TimerState::default()) }
    }

    /// Cancel the timer and wake its thread.
    ///
    /// A tick that is already running completes; no further tick starts.
    pub fn cancel(&self) {
        let mut cancelled = self.state.cancelled.lock();
        *cancelled = true;
        self.state.wake.notify_all();
    }

    /// Check if the timer has been cancelled
    pub fn is_cancelled(&self) -> bool {
        *self.state.cancelled.lock()
    }
}

/// A timer that invokes a callback every `period` on its own thread.
///
/// The callback returns [`ControlFlow::Break`] to end the timer from the
/// inside, e.g. when the object it services has been dropped. Dropping the
/// timer stops it.
///
/// # Examples
///
/// ```
/// use std::ops::ControlFlow;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use sirensong_common::time::RecurringTimer;
///
/// let ticks = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&ticks);
/// let timer = RecurringTimer::start("doc-timer", Duration::from_millis(5), move || {
///     counter.fetch_add(1, Ordering::SeqCst);
///     ControlFlow::Continue(())
/// })?;
///
/// timer.stop();
/// assert!(timer.handle().is_cancelled());
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug)]
pub struct RecurringTimer {
    name: String,
    period: Duration,
    handle: TimerHandle,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl RecurringTimer {
    /// Spawn the timer thread. The first tick happens one `period` after
    /// start.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn start<F>(name: impl Into<String>, period: Duration, tick: F) -> io::Result<Self>
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let name = name.into();
        let handle = TimerHandle::new();
        let state = Arc::clone(&handle.state);

        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_timer_loop(&state, period, tick))?;

        debug!(timer = %name, period_ms = period.as_millis(), "recurring timer started");
        Ok(Self { name, period, handle, thread: Mutex::new(Some(thread)) })
    }

    /// Thread name given at start.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Interval between ticks.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Get a handle to cancel the timer
    pub fn handle(&self) -> TimerHandle {
        self.handle.clone()
    }

    /// Whether the timer thread is still alive.
    pub fn is_running(&self) -> bool {
        self.thread.lock().as_ref().is_some_and(|thread| !thread.is_finished())
    }

    /// Cancel the timer and wait for an in-flight tick to finish.
    ///
    /// When called from the timer's own thread (a tick stopping its own
    /// timer) the join is skipped; the loop exits once that tick returns.
    pub fn stop(&self) {
        self.handle.cancel();

        let Some(thread) = self.thread.lock().take() else {
            return;
        };

        if thread.thread().id() == thread::current().id() {
            debug!(timer = %self.name, "timer stopped from its own thread");
            return;
        }

        if thread.join().is_err() {
            warn!(timer = %self.name, "timer thread terminated with a panic");
        } else {
            debug!(timer = %self.name, "recurring timer stopped");
        }
    }
}

impl Drop for RecurringTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_timer_loop<F>(state: &TimerState, period: Duration, mut tick: F)
where
    F: FnMut() -> ControlFlow<()>,
{
    let mut cancelled = state.cancelled.lock();
    loop {
        // A period too large to represent as a deadline never elapses.
        let deadline = Instant::now().checked_add(period);
        while !*cancelled {
            match deadline {
                Some(deadline) => {
                    if state.wake.wait_until(&mut cancelled, deadline).timed_out() {
                        break;
                    }
                }
                None => state.wake.wait(&mut cancelled),
            }
        }
        if *cancelled {
            break;
        }

        // The flag lock is released while the callback runs so cancel() never
        // blocks on a long tick.
        if MutexGuard::unlocked(&mut cancelled, &mut tick).is_break() {
            break;
        }
    }
}
