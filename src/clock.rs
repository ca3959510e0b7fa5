//! Monotonic tick clock with wraparound-safe arithmetic.
//!
//! All of the scheduler's notion of "now" comes from a [`TickClock`], which
//! yields [`Ticks`]: a millisecond counter confined to the signed 32-bit
//! domain. The counter wraps roughly every 24.9 days, so two readings may
//! never be compared with `<`/`>` on their raw values; every comparison goes
//! through [`Ticks::offset_from`], a wrapping subtraction whose sign decides
//! the ordering. `Ticks` deliberately implements neither `Ord` nor
//! `PartialOrd`.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A single reading of the wrapping millisecond clock.
///
/// The raw value is meaningless in isolation; only offsets between two
/// readings carry information. Offsets are valid as long as the two readings
/// are less than half the counter range (about 12.4 days) apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ticks(i32);

impl Ticks {
    /// Wrap a raw counter value.
    #[must_use]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// The raw counter value. Only useful for diagnostics.
    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Signed milliseconds from `earlier` to `self`, wraparound-safe.
    ///
    /// Positive means `self` is later than `earlier`, negative earlier,
    /// zero the same instant. Correct across a counter wrap.
    #[must_use]
    pub const fn offset_from(self, earlier: Self) -> i32 {
        self.0.wrapping_sub(earlier.0)
    }

    /// The reading `ms` milliseconds after `self`, wraparound-safe.
    #[must_use]
    pub const fn advanced_by(self, ms: i32) -> Self {
        Self(self.0.wrapping_add(ms))
    }

    /// Whether this reading is at or before `other` (wraparound-safe).
    #[must_use]
    pub const fn is_due_at(self, now: Self) -> bool {
        self.offset_from(now) <= 0
    }
}

/// Source of the current tick reading.
///
/// Shared read-only between the API-calling threads and the timer thread,
/// so implementations must be safe for concurrent `now()` calls.
pub trait TickClock: Send + Sync {
    /// The current reading.
    fn now(&self) -> Ticks;
}

/// Wall-clock backed [`TickClock`] anchored at construction time.
///
/// Elapsed milliseconds since the anchor are truncated into the wrapping
/// 32-bit domain, optionally biased by a raw starting offset.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
    offset: i32,
}

impl SystemClock {
    /// Create a clock that reads zero at construction.
    #[must_use]
    pub fn new() -> Self {
        Self::with_offset(0)
    }

    /// Create a clock whose first reading is near `offset`.
    ///
    /// Useful for exercising counter-wrap behavior without waiting weeks.
    #[must_use]
    pub fn with_offset(offset: i32) -> Self {
        Self {
            origin: Instant::now(),
            offset,
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TickClock for SystemClock {
    #[allow(clippy::cast_possible_truncation)]
    fn now(&self) -> Ticks {
        let elapsed_ms = self.origin.elapsed().as_millis() as u32 as i32;
        Ticks::new(self.offset.wrapping_add(elapsed_ms))
    }
}
