//! Prelude for stallwatch.
//!
//! Re-exports the most commonly used types for convenient importing.
//!
//! # Example
//!
//! ```rust
//! use stallwatch::prelude::*;
//!
//! let scheduler = WatchdogScheduler::with_system_timer();
//! scheduler.register("worker-1", 30_000, 45_000).ok();
//! ```

pub use crate::alarm::{AlarmHandler, AlarmTimer, ThreadAlarm};
pub use crate::clock::{SystemClock, TickClock, Ticks};
pub use crate::error::{WatchdogError, WatchdogResult};
pub use crate::queue::TimerQueue;
pub use crate::scheduler::{
    SchedulerConfig, SchedulerConfigBuilder, SchedulerStats, StallCallback, WatchdogScheduler,
};
