//! Deterministic clock and alarm for tests.
//!
//! Production schedulers run against [`SystemClock`](crate::clock::SystemClock)
//! and [`ThreadAlarm`](crate::alarm::ThreadAlarm). The types here replace
//! both with hand-driven equivalents so scenarios can be stepped
//! millisecond-exact and without real sleeps: a [`ManualClock`] that only
//! moves when told to, a [`ManualAlarm`] that records its deadline against
//! that clock, and a [`ManualDriver`] that plays the role of the timer
//! service thread.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use crate::alarm::{AlarmHandler, AlarmTimer};
use crate::clock::{TickClock, Ticks};

/// A [`TickClock`] that advances only on request.
#[derive(Debug)]
pub struct ManualClock {
    raw: Mutex<i32>,
}

impl ManualClock {
    /// Create a clock reading `raw`.
    #[must_use]
    pub fn new(raw: i32) -> Self {
        Self {
            raw: Mutex::new(raw),
        }
    }

    /// Move the clock forward by `ms` (wrapping).
    pub fn advance(&self, ms: i32) {
        let mut raw = self.raw.lock();
        *raw = raw.wrapping_add(ms);
    }

    /// Set the raw reading directly.
    pub fn set(&self, raw: i32) {
        *self.raw.lock() = raw;
    }
}

impl TickClock for ManualClock {
    fn now(&self) -> Ticks {
        Ticks::new(*self.raw.lock())
    }
}

struct ManualAlarmState {
    handler: Option<AlarmHandler>,
    due: Option<Ticks>,
}

/// An [`AlarmTimer`] whose deadline is a [`ManualClock`] reading.
///
/// Never fires on its own; [`ManualAlarm::fire`] (or a zero delay) invokes
/// the handler. Pair it with [`ManualDriver`] to fire at the right readings.
pub struct ManualAlarm {
    clock: Arc<ManualClock>,
    state: Mutex<ManualAlarmState>,
}

impl ManualAlarm {
    /// Create a disarmed alarm deriving deadlines from `clock`.
    #[must_use]
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            state: Mutex::new(ManualAlarmState {
                handler: None,
                due: None,
            }),
        }
    }

    /// The reading at which the alarm is due, if armed.
    #[must_use]
    pub fn due(&self) -> Option<Ticks> {
        self.state.lock().due
    }

    /// Disarm and invoke the handler, as the expiry would.
    pub fn fire(&self) {
        let handler = {
            let mut state = self.state.lock();
            state.due = None;
            state.handler.clone()
        };
        if let Some(handler) = handler {
            handler();
        }
    }
}

impl AlarmTimer for ManualAlarm {
    fn set_handler(&self, handler: AlarmHandler) {
        self.state.lock().handler = Some(handler);
    }

    fn set_delay(&self, ms: i32) {
        if ms == 0 {
            self.state.lock().due = None;
            self.fire();
            return;
        }
        let due = (ms > 0).then(|| self.clock.now().advanced_by(ms));
        self.state.lock().due = due;
    }
}

impl fmt::Debug for ManualAlarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualAlarm")
            .field("due", &self.state.lock().due)
            .finish()
    }
}

/// Steps a [`ManualClock`] and fires a [`ManualAlarm`] when its deadline has
/// elapsed, standing in for the timer service thread.
///
/// `advance` moves the clock in one jump and then delivers however many
/// alarm cycles have become due, which is exactly the coarse wake-up pattern
/// the scheduler's aggregate events are defined against: everything that
/// expired during the jump lands in a single drain.
#[derive(Debug, Clone)]
pub struct ManualDriver {
    clock: Arc<ManualClock>,
    alarm: Arc<ManualAlarm>,
}

impl ManualDriver {
    /// Pair a clock with the alarm it drives.
    #[must_use]
    pub fn new(clock: Arc<ManualClock>, alarm: Arc<ManualAlarm>) -> Self {
        Self { clock, alarm }
    }

    /// Advance the clock by `ms`, then fire the alarm for as long as its
    /// deadline has elapsed (each firing may re-arm it).
    pub fn advance(&self, ms: i32) {
        self.clock.advance(ms);
        while let Some(due) = self.alarm.due() {
            if !due.is_due_at(self.clock.now()) {
                break;
            }
            self.alarm.fire();
        }
    }
}
