//! Concurrency smoke tests with the real clock and timer thread.
//!
//! Timings use wide margins: these verify serialization and liveness, not
//! millisecond precision (the manual-harness tests cover that).

use parking_lot::Mutex;
use stallwatch::prelude::*;
use stallwatch::testing::ManualClock;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

fn counting_scheduler() -> (Arc<WatchdogScheduler>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let scheduler = Arc::new(WatchdogScheduler::with_system_timer());

    let warnings = Arc::new(AtomicUsize::new(0));
    let warnings_in_handler = Arc::clone(&warnings);
    scheduler.on_warning(move || {
        warnings_in_handler.fetch_add(1, Ordering::SeqCst);
    });

    let criticals = Arc::new(AtomicUsize::new(0));
    let criticals_in_handler = Arc::clone(&criticals);
    scheduler.on_critical(move || {
        criticals_in_handler.fetch_add(1, Ordering::SeqCst);
    });

    (scheduler, warnings, criticals)
}

#[test]
fn test_concurrent_registration() {
    let (scheduler, _warnings, _criticals) = counting_scheduler();
    let mut handles = vec![];

    for i in 0..10 {
        let scheduler = Arc::clone(&scheduler);
        handles.push(thread::spawn(move || {
            let name = format!("worker-{i}");
            assert!(scheduler.register(&name, 60_000, 120_000).unwrap());
            assert!(scheduler.ping(&name).unwrap());
        }));
    }

    for handle in handles {
        assert!(handle.join().is_ok(), "thread should not panic");
    }
    assert_eq!(scheduler.task_count(), 10);
}

#[test]
fn test_pinged_task_stays_silent() {
    let (scheduler, warnings, criticals) = counting_scheduler();
    assert!(scheduler.register("pinger", 300, 600).unwrap());

    let pinger_scheduler = Arc::clone(&scheduler);
    let pinger = thread::spawn(move || {
        for _ in 0..30 {
            assert!(pinger_scheduler.ping("pinger").unwrap());
            thread::sleep(Duration::from_millis(25));
        }
    });
    assert!(pinger.join().is_ok());

    assert_eq!(warnings.load(Ordering::SeqCst), 0);
    assert_eq!(criticals.load(Ordering::SeqCst), 0);
}

#[test]
fn test_stalled_task_detected() {
    let (scheduler, warnings, criticals) = counting_scheduler();
    assert!(scheduler.register("stalled", 50, 100).unwrap());

    thread::sleep(Duration::from_millis(500));

    assert_eq!(warnings.load(Ordering::SeqCst), 1);
    assert_eq!(criticals.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unregister_races_with_wakeups() {
    let (scheduler, _warnings, criticals) = counting_scheduler();

    for i in 0..8 {
        assert!(scheduler.register(&format!("w{i}"), 40, 80).unwrap());
    }

    let mut handles = vec![];
    for i in 0..8 {
        let scheduler = Arc::clone(&scheduler);
        handles.push(thread::spawn(move || {
            thread::sleep(Duration::from_millis(5 * i));
            scheduler.unregister(&format!("w{i}")).unwrap();
        }));
    }
    for handle in handles {
        assert!(handle.join().is_ok(), "thread should not panic");
    }

    assert_eq!(scheduler.task_count(), 0);
    let settled = criticals.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(200));
    // No task left to expire: the count must have settled.
    assert_eq!(criticals.load(Ordering::SeqCst), settled);
}

/// Alarm stub that records every programmed delay and stalls inside
/// `set_delay` on long arms and disarms, widening the window in which a
/// concurrent reprogram can land first.
struct RecordingAlarm {
    delays: Mutex<Vec<i32>>,
}

impl RecordingAlarm {
    fn new() -> Self {
        Self {
            delays: Mutex::new(Vec::new()),
        }
    }

    fn last_delay(&self) -> Option<i32> {
        self.delays.lock().last().copied()
    }
}

impl AlarmTimer for RecordingAlarm {
    fn set_handler(&self, _handler: AlarmHandler) {}

    fn set_delay(&self, ms: i32) {
        if !(0..1_000).contains(&ms) {
            thread::sleep(Duration::from_millis(100));
        }
        self.delays.lock().push(ms);
    }
}

#[test]
fn test_racing_registrations_arm_earliest_deadline() {
    let clock = Arc::new(ManualClock::new(0));
    let alarm = Arc::new(RecordingAlarm::new());
    let scheduler = Arc::new(WatchdogScheduler::new(clock, alarm.clone()));

    // The slow registration reads a 60s delay, then stalls inside its
    // set_delay while the fast one arms 10ms underneath it.
    let slow_scheduler = Arc::clone(&scheduler);
    let slow = thread::spawn(move || {
        assert!(slow_scheduler.register("slow", 60_000, 120_000).unwrap());
    });
    thread::sleep(Duration::from_millis(30));
    assert!(scheduler.register("fast", 10, 20).unwrap());
    assert!(slow.join().is_ok());

    // Whichever set_delay landed last, the armed delay must be the 10ms
    // warning, not the stale 60s one.
    assert_eq!(alarm.last_delay(), Some(10));
}

#[test]
fn test_stale_disarm_cannot_drop_pending_deadline() {
    let clock = Arc::new(ManualClock::new(0));
    let alarm = Arc::new(RecordingAlarm::new());
    let scheduler = Arc::new(WatchdogScheduler::new(clock, alarm.clone()));
    assert!(scheduler.register("old", 60_000, 120_000).unwrap());

    // Removing the only task reads "disarm", then stalls inside set_delay
    // while a fresh 10ms task arrives.
    let remover_scheduler = Arc::clone(&scheduler);
    let remover = thread::spawn(move || {
        assert!(remover_scheduler.unregister("old").unwrap());
    });
    thread::sleep(Duration::from_millis(30));
    assert!(scheduler.register("fast", 10, 20).unwrap());
    assert!(remover.join().is_ok());

    assert_eq!(alarm.last_delay(), Some(10));
}
