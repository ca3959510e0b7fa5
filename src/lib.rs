//! # stallwatch
//!
//! Two-tier task liveness watchdog with wraparound-safe timer queues.
//!
//! Independent logical tasks (typically worker threads) register a liveness
//! contract of two timeouts, a warning threshold and a critical threshold,
//! and reset it by pinging. When any registered task misses a threshold the
//! scheduler raises that tier's aggregate notification: one edge-triggered,
//! payload-free pulse per wake cycle, however many tasks stalled. A typical
//! subscriber wires `on_critical` to a diagnostic dump trigger.
//!
//! ## Architecture
//!
//! - [`clock`] - wrapping 32-bit millisecond clock readings and their source
//! - [`queue`] - named timer entries ordered by expiry, with O(1) removal
//! - [`alarm`] - the single re-armable one-shot alarm behind all wake-ups
//! - [`scheduler`] - the two-tier watchdog orchestrating the above
//! - [`testing`] - manual clock/alarm harness for deterministic tests
//! - [`error`] - watchdog-specific error types
//!
//! ## Guarantees
//!
//! - All clock comparisons are wraparound-safe; behavior does not depend on
//!   the clock's absolute value, including across the signed 32-bit wrap.
//! - A tier's notification fires at most once per wake cycle, and no earlier
//!   than the configured delay.
//! - One lock serializes the API and the alarm callback; notifications are
//!   delivered outside it.
//!
//! ## Example
//!
//! ```rust
//! use stallwatch::prelude::*;
//!
//! let scheduler = WatchdogScheduler::with_system_timer();
//! scheduler.on_critical(|| {
//!     // e.g. trigger a crash dump
//! });
//!
//! assert!(scheduler.register("worker-1", 30_000, 45_000)?);
//! // ... from the worker, periodically:
//! assert!(scheduler.ping("worker-1")?);
//! # Ok::<(), stallwatch::WatchdogError>(())
//! ```

#![deny(
    unsafe_op_in_unsafe_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::panic,
    missing_docs,
    missing_debug_implementations
)]
#![warn(clippy::pedantic)]

pub mod alarm;
pub mod clock;
pub mod error;
pub mod queue;
pub mod scheduler;
pub mod testing;

pub mod prelude;

pub use alarm::{AlarmHandler, AlarmTimer, ThreadAlarm};
pub use clock::{SystemClock, TickClock, Ticks};
pub use error::{WatchdogError, WatchdogResult};
pub use queue::{ExpiredEntries, TimerQueue};
pub use scheduler::{
    SchedulerConfig, SchedulerConfigBuilder, SchedulerStats, StallCallback, WatchdogScheduler,
};
