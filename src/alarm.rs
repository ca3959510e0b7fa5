//! Re-armable one-shot alarm.
//!
//! The scheduler folds every pending expiry into a single wake-up by keeping
//! exactly one alarm armed at the earliest deadline. [`AlarmTimer`] is the
//! seam: a delay setter plus a handler slot. [`ThreadAlarm`] is the
//! production implementation, backed by one worker thread parked on a
//! condvar.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Callback invoked when an armed alarm elapses.
pub type AlarmHandler = Arc<dyn Fn() + Send + Sync>;

/// A re-armable one-shot alarm.
///
/// Contract for [`AlarmTimer::set_delay`]:
/// - `ms < 0` cancels any pending alarm and leaves the timer disarmed;
/// - `ms == 0` cancels any pending alarm and invokes the handler
///   synchronously, before returning;
/// - `ms > 0` arms the alarm to fire the handler exactly once after `ms`
///   milliseconds, replacing any previously armed delay.
pub trait AlarmTimer: Send + Sync {
    /// Install the handler fired on expiry. Replaces any previous handler.
    fn set_handler(&self, handler: AlarmHandler);

    /// Arm, disarm, or synchronously fire per the trait contract.
    fn set_delay(&self, ms: i32);
}

struct AlarmState {
    deadline: Option<Instant>,
    /// Bumped on every `set_delay`; a sleeper only fires if its epoch is
    /// still current when the deadline elapses.
    epoch: u64,
    handler: Option<AlarmHandler>,
    shutdown: bool,
}

/// Thread-backed [`AlarmTimer`].
///
/// One worker thread waits on a condvar until the armed deadline, then
/// invokes the handler (outside the internal lock). Re-arming before expiry
/// cancels the pending alarm. The worker is joined on drop.
pub struct ThreadAlarm {
    shared: Arc<(Mutex<AlarmState>, Condvar)>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadAlarm {
    /// Spawn the worker thread and return a disarmed alarm.
    #[must_use]
    pub fn new() -> Self {
        let shared = Arc::new((
            Mutex::new(AlarmState {
                deadline: None,
                epoch: 0,
                handler: None,
                shutdown: false,
            }),
            Condvar::new(),
        ));
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("stallwatch-alarm".to_owned())
            .spawn(move || Self::run(&worker_shared));
        Self {
            shared,
            worker: worker.ok(),
        }
    }

    fn run(shared: &(Mutex<AlarmState>, Condvar)) {
        let (lock, condvar) = shared;
        let mut state = lock.lock();
        loop {
            if state.shutdown {
                return;
            }
            match state.deadline {
                None => {
                    condvar.wait(&mut state);
                }
                Some(deadline) => {
                    let armed_epoch = state.epoch;
                    let timed_out = condvar.wait_until(&mut state, deadline).timed_out();
                    if timed_out && !state.shutdown && state.epoch == armed_epoch {
                        state.deadline = None;
                        let handler = state.handler.clone();
                        drop(state);
                        if let Some(handler) = handler {
                            handler();
                        }
                        state = lock.lock();
                    }
                }
            }
        }
    }
}

impl AlarmTimer for ThreadAlarm {
    fn set_handler(&self, handler: AlarmHandler) {
        self.shared.0.lock().handler = Some(handler);
    }

    #[allow(clippy::cast_sign_loss)]
    fn set_delay(&self, ms: i32) {
        let (lock, condvar) = &*self.shared;
        let mut state = lock.lock();
        state.epoch += 1;
        if ms < 0 {
            state.deadline = None;
            condvar.notify_one();
        } else if ms == 0 {
            state.deadline = None;
            condvar.notify_one();
            let handler = state.handler.clone();
            drop(state);
            if let Some(handler) = handler {
                handler();
            }
        } else {
            state.deadline = Some(Instant::now() + Duration::from_millis(ms as u64));
            condvar.notify_one();
        }
    }
}

impl Default for ThreadAlarm {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadAlarm {
    fn drop(&mut self) {
        {
            let (lock, condvar) = &*self.shared;
            let mut state = lock.lock();
            state.shutdown = true;
            condvar.notify_one();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl fmt::Debug for ThreadAlarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.0.lock();
        f.debug_struct("ThreadAlarm")
            .field("armed", &state.deadline.is_some())
            .field("epoch", &state.epoch)
            .finish()
    }
}
