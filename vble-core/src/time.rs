//! Time APIs for obtaining the current simulated time and calculating with points in time and
//! durations.
//!
//! Unlike a real radio's microsecond-resolution timer, the physical-layer scheduler advances a
//! free-running nanosecond clock, so these types use `i64` throughout rather than the `u32`
//! microsecond values a hardware-facing BLE stack would use.

use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// A duration with nanosecond resolution.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Duration(i64);

impl Duration {
    /// The interframe spacing between BLE packets, expressed as a duration.
    pub const T_IFS: Self = Duration(150);

    pub fn from_nanos(nanos: i64) -> Self {
        Duration(nanos)
    }

    pub fn from_micros(micros: i64) -> Self {
        Duration(micros * 1_000)
    }

    pub fn from_millis(millis: i64) -> Self {
        Duration(millis * 1_000_000)
    }

    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    pub fn as_micros(&self) -> i64 {
        self.0 / 1_000
    }
}

impl Add for Duration {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Duration(self.0.checked_add(rhs.0).expect("duration overflow"))
    }
}

impl AddAssign for Duration {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Duration {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Duration(self.0.checked_sub(rhs.0).expect("duration underflow"))
    }
}

impl SubAssign for Duration {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 1_000_000_000 {
            write!(f, "{}.{:09}s", self.0 / 1_000_000_000, self.0 % 1_000_000_000)
        } else if self.0 >= 1_000_000 {
            write!(f, "{}ms", self.0 / 1_000_000)
        } else if self.0 >= 1_000 {
            write!(f, "{}µs", self.0 / 1_000)
        } else {
            write!(f, "{}ns", self.0)
        }
    }
}

/// A point in simulated time, relative to the scheduler's start.
///
/// `Instant`s from different schedulers are not comparable; there is only ever one scheduler
/// running in a given process, so this is not enforced at the type level.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Instant(i64);

impl Instant {
    pub const ZERO: Self = Instant(0);

    pub fn from_raw_nanos(nanos: i64) -> Self {
        Instant(nanos)
    }

    pub fn raw_nanos(&self) -> i64 {
        self.0
    }

    /// Duration elapsed between `earlier` and `self`. Negative if `self` precedes `earlier`.
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        Duration(self.0 - earlier.0)
    }
}

impl Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.duration_since(rhs)
    }
}

impl Add<Duration> for Instant {
    type Output = Self;

    fn add(self, d: Duration) -> Self {
        Instant(self.0 + d.as_nanos())
    }
}

impl AddAssign<Duration> for Instant {
    fn add_assign(&mut self, d: Duration) {
        *self = *self + d;
    }
}

impl Sub<Duration> for Instant {
    type Output = Self;

    fn sub(self, d: Duration) -> Self {
        Instant(self.0 - d.as_nanos())
    }
}

impl SubAssign<Duration> for Instant {
    fn sub_assign(&mut self, d: Duration) {
        *self = *self - d;
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// Obtains the scheduler's current simulated time.
///
/// Implemented by the scheduler itself; a mock implementation can be substituted in tests that
/// don't want to run the real time-stepped loop.
pub trait Timer {
    fn now(&self) -> Instant;
}
