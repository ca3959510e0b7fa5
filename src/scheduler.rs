//! Two-tier watchdog scheduler.
//!
//! [`WatchdogScheduler`] tracks one warning and one critical timeout per
//! registered task, keyed by name. Tasks prove liveness with
//! [`WatchdogScheduler::ping`]; when any task misses a tier's deadline the
//! scheduler raises that tier's aggregate notification once per wake cycle.
//! Notifications carry no task identity: one stuck task is reason enough
//! for the subscriber to act, and the per-task detail is in the logs.
//!
//! Per task, the observable states are:
//!
//! ```text
//! Unregistered ──register()──► Armed ──warning due──► WarningFired
//!       ▲                        ▲                         │
//!       │                        │ ping()            critical due
//!  unregister()                  │                         ▼
//!  (from any state)              └──────ping()─────── CriticalFired
//! ```
//!
//! Both tiers live in expiry-ordered [`TimerQueue`]s behind a single lock,
//! and one re-armable alarm wakes the scheduler at the earliest pending
//! expiry across both queues.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::alarm::{AlarmTimer, ThreadAlarm};
use crate::clock::{SystemClock, TickClock};
use crate::error::{WatchdogError, WatchdogResult};
use crate::queue::TimerQueue;

/// Callback type for stall notifications. No payload by design.
pub type StallCallback = Arc<dyn Fn() + Send + Sync>;

/// Delay passed to the alarm to leave it disarmed.
const DISARM: i32 = -1;

/// Default task timeouts used by [`WatchdogScheduler::register_default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Default warning timeout in milliseconds. Negative disables the tier.
    pub default_warning_ms: i32,
    /// Default critical timeout in milliseconds. Negative disables the tier.
    pub default_critical_ms: i32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_warning_ms: 30_000,
            default_critical_ms: 45_000,
        }
    }
}

impl SchedulerConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the warning timeout exceeds the critical timeout
    /// while both tiers are enabled.
    pub fn validate(&self) -> WatchdogResult<()> {
        if self.default_warning_ms >= 0
            && self.default_critical_ms >= 0
            && self.default_warning_ms > self.default_critical_ms
        {
            return Err(WatchdogError::invalid_configuration(
                "default_warning_ms must not exceed default_critical_ms",
            ));
        }
        Ok(())
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::default()
    }
}

/// Builder for [`SchedulerConfig`].
#[derive(Debug, Default)]
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl SchedulerConfigBuilder {
    /// Set the default warning timeout in milliseconds.
    #[must_use]
    pub fn default_warning_ms(mut self, ms: i32) -> Self {
        self.config.default_warning_ms = ms;
        self
    }

    /// Set the default critical timeout in milliseconds.
    #[must_use]
    pub fn default_critical_ms(mut self, ms: i32) -> Self {
        self.config.default_critical_ms = ms;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> WatchdogResult<SchedulerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Counters describing scheduler activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Successful `ping` calls.
    pub pings: u64,
    /// Alarm wake cycles handled.
    pub wake_cycles: u64,
    /// Wake cycles that raised the warning notification.
    pub warning_cycles: u64,
    /// Wake cycles that raised the critical notification.
    pub critical_cycles: u64,
}

#[derive(Clone, Copy)]
struct TaskDelays {
    warning_ms: i32,
    critical_ms: i32,
}

struct Inner {
    warning: TimerQueue,
    critical: TimerQueue,
    delays: HashMap<String, TaskDelays>,
    warning_callbacks: Vec<StallCallback>,
    critical_callbacks: Vec<StallCallback>,
    stats: SchedulerStats,
}

impl Inner {
    /// Milliseconds until the earliest pending expiry across both tiers.
    fn next_delay(&self) -> Option<i32> {
        match (
            self.warning.next_expiry_offset(),
            self.critical.next_expiry_offset(),
        ) {
            (Some(w), Some(c)) => Some(w.min(c)),
            (Some(w), None) => Some(w),
            (None, Some(c)) => Some(c),
            (None, None) => None,
        }
    }
}

/// Aggregate two-tier liveness watchdog.
///
/// # Thread Safety
///
/// The public API and the alarm callback are serialized through one internal
/// lock. A `ping` or `unregister` that returns before a wake cycle starts is
/// reflected in that cycle's drain; one racing with an in-progress drain
/// lands fully before or fully after it.
///
/// Stall callbacks run on whichever thread delivers the alarm (or on the
/// caller's thread when an operation arms a zero delay), always outside the
/// scheduler lock, so they may call back into the scheduler.
pub struct WatchdogScheduler {
    config: SchedulerConfig,
    inner: Arc<Mutex<Inner>>,
    timer: Arc<dyn AlarmTimer>,
}

impl WatchdogScheduler {
    /// Create a scheduler with the default configuration.
    #[must_use]
    pub fn new(clock: Arc<dyn TickClock>, timer: Arc<dyn AlarmTimer>) -> Self {
        Self::with_config(SchedulerConfig::default(), clock, timer)
    }

    /// Create a scheduler with an explicit configuration.
    #[must_use]
    pub fn with_config(
        config: SchedulerConfig,
        clock: Arc<dyn TickClock>,
        timer: Arc<dyn AlarmTimer>,
    ) -> Self {
        let inner = Arc::new(Mutex::new(Inner {
            warning: TimerQueue::new(Arc::clone(&clock)),
            critical: TimerQueue::new(clock),
            delays: HashMap::new(),
            warning_callbacks: Vec::new(),
            critical_callbacks: Vec::new(),
            stats: SchedulerStats::default(),
        }));

        let handler_inner = Arc::downgrade(&inner);
        let handler_timer = Arc::downgrade(&timer);
        timer.set_handler(Arc::new(move || {
            on_alarm(&handler_inner, &handler_timer);
        }));

        Self {
            config,
            inner,
            timer,
        }
    }

    /// Create a scheduler backed by the wall clock and a timer thread.
    #[must_use]
    pub fn with_system_timer() -> Self {
        Self::new(Arc::new(SystemClock::new()), Arc::new(ThreadAlarm::new()))
    }

    /// Register a task with its two tier timeouts.
    ///
    /// Returns `Ok(false)` without mutating anything if the name is already
    /// registered, letting supervisors treat re-registration as a no-op.
    /// A negative timeout leaves that tier disabled until the next `ping`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::EmptyTaskName`] for an empty name.
    pub fn register(&self, name: &str, warning_ms: i32, critical_ms: i32) -> WatchdogResult<bool> {
        if name.is_empty() {
            return Err(WatchdogError::EmptyTaskName);
        }
        {
            let mut inner = self.inner.lock();
            if inner.delays.contains_key(name) {
                tracing::debug!(task = %name, "register ignored, task already present");
                return Ok(false);
            }
            inner.warning.add(name, warning_ms)?;
            inner.critical.add(name, critical_ms)?;
            inner.delays.insert(
                name.to_owned(),
                TaskDelays {
                    warning_ms,
                    critical_ms,
                },
            );
        }
        tracing::debug!(task = %name, warning_ms, critical_ms, "task registered");
        self.reprogram();
        Ok(true)
    }

    /// Register a task with the configured default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::EmptyTaskName`] for an empty name.
    pub fn register_default(&self, name: &str) -> WatchdogResult<bool> {
        self.register(
            name,
            self.config.default_warning_ms,
            self.config.default_critical_ms,
        )
    }

    /// Reset both tiers of a task to run from now with its stored timeouts.
    ///
    /// Valid in every registered state, including after both tiers have
    /// fired. Returns `Ok(false)` if the name was never registered.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::EmptyTaskName`] for an empty name.
    pub fn ping(&self, name: &str) -> WatchdogResult<bool> {
        if name.is_empty() {
            return Err(WatchdogError::EmptyTaskName);
        }
        let known = {
            let mut inner = self.inner.lock();
            match inner.delays.get(name).copied() {
                None => false,
                Some(delays) => {
                    inner.warning.change(name, delays.warning_ms)?;
                    inner.critical.change(name, delays.critical_ms)?;
                    inner.stats.pings = inner.stats.pings.saturating_add(1);
                    true
                }
            }
        };
        if known {
            tracing::trace!(task = %name, "task pinged");
            self.reprogram();
        }
        Ok(known)
    }

    /// Remove a task from both tiers. Returns `Ok(true)` iff it was present.
    ///
    /// Takes effect immediately: a removed task cannot contribute to any
    /// later wake cycle.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::EmptyTaskName`] for an empty name.
    pub fn unregister(&self, name: &str) -> WatchdogResult<bool> {
        if name.is_empty() {
            return Err(WatchdogError::EmptyTaskName);
        }
        let removed = {
            let mut inner = self.inner.lock();
            let in_warning = inner.warning.remove(name);
            let in_critical = inner.critical.remove(name);
            inner.delays.remove(name);
            in_warning || in_critical
        };
        if removed {
            tracing::debug!(task = %name, "task unregistered");
            self.reprogram();
        }
        Ok(removed)
    }

    /// Subscribe to the aggregate warning notification.
    pub fn on_warning<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.lock().warning_callbacks.push(Arc::new(callback));
    }

    /// Subscribe to the aggregate critical notification.
    pub fn on_critical<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner
            .lock()
            .critical_callbacks
            .push(Arc::new(callback));
    }

    /// Whether a task with this name is registered, in any state.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.inner.lock().delays.contains_key(name)
    }

    /// Number of registered tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.inner.lock().delays.len()
    }

    /// Snapshot of the activity counters.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.inner.lock().stats
    }

    /// The configuration in effect.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Re-arm the alarm at the earliest pending expiry, or disarm it.
    fn reprogram(&self) {
        reprogram_timer(&self.inner, self.timer.as_ref());
    }
}

/// Arm the alarm at the earliest pending expiry, or disarm it.
///
/// `set_delay(0)` re-enters the alarm handler synchronously, so the lock is
/// never held across the call. Concurrent reprograms therefore race on the
/// timer, and a stale `set_delay` can land after a fresher one. Whichever
/// call lands last re-reads the earliest expiry and programs again while the
/// delay it just armed is later than the fresh reading, so the race always
/// settles on the earliest pending deadline (or stays disarmed only when
/// nothing is pending).
fn reprogram_timer(inner: &Mutex<Inner>, timer: &dyn AlarmTimer) {
    let mut target = inner.lock().next_delay();
    loop {
        match target {
            Some(offset) => timer.set_delay(offset.max(0)),
            None => timer.set_delay(DISARM),
        }
        let fresh = inner.lock().next_delay();
        let too_late = match (fresh, target) {
            (Some(f), Some(t)) => f < t,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !too_late {
            break;
        }
        target = fresh;
    }
}

/// One wake cycle: drain both tiers, raise at most one notification per
/// tier, re-arm the alarm for whatever remains.
fn on_alarm(inner: &Weak<Mutex<Inner>>, timer: &Weak<dyn AlarmTimer>) {
    let Some(inner) = inner.upgrade() else {
        return;
    };

    let (warning_callbacks, critical_callbacks) = {
        let mut inner = inner.lock();
        let mut warned = 0usize;
        let mut critical = 0usize;

        // Entries that come due while draining fold into this same cycle
        // rather than arming a zero-delay alarm from inside the handler.
        loop {
            for name in inner.warning.expunge_expired() {
                tracing::warn!(task = %name, "task missed its warning deadline");
                warned += 1;
            }
            for name in inner.critical.expunge_expired() {
                tracing::error!(task = %name, "task missed its critical deadline");
                critical += 1;
            }
            match inner.next_delay() {
                Some(offset) if offset <= 0 => {}
                _ => break,
            }
        }

        inner.stats.wake_cycles = inner.stats.wake_cycles.saturating_add(1);
        if warned > 0 {
            inner.stats.warning_cycles = inner.stats.warning_cycles.saturating_add(1);
        }
        if critical > 0 {
            inner.stats.critical_cycles = inner.stats.critical_cycles.saturating_add(1);
        }

        (
            if warned > 0 {
                inner.warning_callbacks.clone()
            } else {
                Vec::new()
            },
            if critical > 0 {
                inner.critical_callbacks.clone()
            } else {
                Vec::new()
            },
        )
    };

    for callback in &warning_callbacks {
        callback();
    }
    for callback in &critical_callbacks {
        callback();
    }

    // Callbacks may have pinged or re-registered tasks, so the earliest
    // expiry is re-read after they return.
    if let Some(timer) = timer.upgrade() {
        reprogram_timer(&inner, timer.as_ref());
    }
}

impl fmt::Debug for WatchdogScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("WatchdogScheduler")
            .field("config", &self.config)
            .field("task_count", &inner.delays.len())
            .field("stats", &inner.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ManualAlarm, ManualClock};

    fn manual_scheduler() -> (Arc<ManualClock>, Arc<ManualAlarm>, WatchdogScheduler) {
        let clock = Arc::new(ManualClock::new(0));
        let alarm = Arc::new(ManualAlarm::new(Arc::clone(&clock)));
        let scheduler = WatchdogScheduler::new(clock.clone(), alarm.clone());
        (clock, alarm, scheduler)
    }

    #[test]
    fn test_register_duplicate_is_noop() {
        let (_clock, _alarm, scheduler) = manual_scheduler();
        assert!(scheduler.register("worker", 100, 200).unwrap());
        assert!(!scheduler.register("worker", 999, 999).unwrap());
        assert_eq!(scheduler.task_count(), 1);
    }

    #[test]
    fn test_empty_name_rejected() {
        let (_clock, _alarm, scheduler) = manual_scheduler();
        assert!(matches!(
            scheduler.register("", 100, 200),
            Err(WatchdogError::EmptyTaskName)
        ));
        assert!(matches!(
            scheduler.ping(""),
            Err(WatchdogError::EmptyTaskName)
        ));
        assert!(matches!(
            scheduler.unregister(""),
            Err(WatchdogError::EmptyTaskName)
        ));
    }

    #[test]
    fn test_ping_unknown_task() {
        let (_clock, _alarm, scheduler) = manual_scheduler();
        assert!(!scheduler.ping("ghost").unwrap());
    }

    #[test]
    fn test_unregister_reports_presence() {
        let (_clock, _alarm, scheduler) = manual_scheduler();
        scheduler.register("worker", 100, 200).unwrap();
        assert!(scheduler.unregister("worker").unwrap());
        assert!(!scheduler.unregister("worker").unwrap());
        assert!(!scheduler.is_registered("worker"));
    }

    #[test]
    fn test_alarm_armed_at_earliest_expiry() {
        let (clock, alarm, scheduler) = manual_scheduler();
        scheduler.register("slow", 500, 900).unwrap();
        assert_eq!(alarm.due(), Some(clock.now().advanced_by(500)));

        scheduler.register("fast", 200, 800).unwrap();
        assert_eq!(alarm.due(), Some(clock.now().advanced_by(200)));
    }

    #[test]
    fn test_alarm_disarmed_when_no_active_entries() {
        let (_clock, alarm, scheduler) = manual_scheduler();
        scheduler.register("worker", 100, 200).unwrap();
        scheduler.unregister("worker").unwrap();
        assert_eq!(alarm.due(), None);
    }

    #[test]
    fn test_disabled_tiers_never_schedule() {
        let (_clock, alarm, scheduler) = manual_scheduler();
        assert!(scheduler.register("worker", -1, -1).unwrap());
        assert_eq!(alarm.due(), None);
        assert!(scheduler.is_registered("worker"));
    }

    #[test]
    fn test_register_default_uses_config() {
        let clock = Arc::new(ManualClock::new(0));
        let alarm = Arc::new(ManualAlarm::new(Arc::clone(&clock)));
        let config = SchedulerConfig::builder()
            .default_warning_ms(1_000)
            .default_critical_ms(2_000)
            .build()
            .unwrap();
        let scheduler = WatchdogScheduler::with_config(config, clock.clone(), alarm.clone());

        scheduler.register_default("worker").unwrap();
        assert_eq!(alarm.due(), Some(clock.now().advanced_by(1_000)));
    }

    #[test]
    fn test_config_validation() {
        let config = SchedulerConfig {
            default_warning_ms: 2_000,
            default_critical_ms: 1_000,
        };
        assert!(config.validate().is_err());

        // A disabled tier never conflicts.
        let config = SchedulerConfig {
            default_warning_ms: 2_000,
            default_critical_ms: -1,
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stats_counting() {
        let (clock, alarm, scheduler) = manual_scheduler();
        scheduler.register("worker", 100, 200).unwrap();
        scheduler.ping("worker").unwrap();

        clock.advance(100);
        alarm.fire();

        let stats = scheduler.stats();
        assert_eq!(stats.pings, 1);
        assert_eq!(stats.wake_cycles, 1);
        assert_eq!(stats.warning_cycles, 1);
        assert_eq!(stats.critical_cycles, 0);
    }

    #[test]
    fn test_zero_timeout_registration_fires_on_next_cycle() {
        let (_clock, _alarm, scheduler) = manual_scheduler();
        let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let fired_in_handler = Arc::clone(&fired);
        scheduler.on_warning(move || {
            fired_in_handler.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        // Zero delay re-enters the handler from reprogram; the entry is
        // drained in that cycle, not from inside `register` itself.
        scheduler.register("worker", 0, 1_000).unwrap();
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
