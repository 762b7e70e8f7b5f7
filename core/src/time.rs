//! Logical time primitives.
//!
//! All wire-level time values are microsecond counts (spec §6); we keep
//! [`LocalTime`] at microsecond resolution throughout so conversions to and
//! from the wire never lose precision.
use std::ops::{Add, Sub};
use std::time::{SystemTime, UNIX_EPOCH};

/// A point in time, expressed as microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct LocalTime(u64);

/// A span of time, expressed in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct LocalDuration(u64);

impl LocalTime {
    /// The current wall-clock time.
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(since_epoch.as_micros() as u64)
    }

    /// Construct a time from raw microseconds.
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// The raw microsecond value.
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Time elapsed between `self` and an earlier `other`, saturating at zero.
    pub fn duration_since(&self, other: LocalTime) -> LocalDuration {
        LocalDuration(self.0.saturating_sub(other.0))
    }
}

impl LocalDuration {
    /// Zero duration.
    pub const ZERO: Self = Self(0);

    /// Construct a duration from seconds.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * 1_000_000)
    }

    /// Construct a duration from milliseconds.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis * 1_000)
    }

    /// Construct a duration from minutes.
    pub const fn from_mins(mins: u64) -> Self {
        Self::from_secs(mins * 60)
    }

    /// Construct a duration from raw microseconds.
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// The raw microsecond value.
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// As a floating-point number of seconds, for telemetry.
    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Whether this duration is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Add<LocalDuration> for LocalTime {
    type Output = LocalTime;

    fn add(self, rhs: LocalDuration) -> LocalTime {
        LocalTime(self.0.saturating_add(rhs.0))
    }
}

impl Sub<LocalDuration> for LocalTime {
    type Output = LocalTime;

    fn sub(self, rhs: LocalDuration) -> LocalTime {
        LocalTime(self.0.saturating_sub(rhs.0))
    }
}

impl Sub<LocalTime> for LocalTime {
    type Output = LocalDuration;

    fn sub(self, rhs: LocalTime) -> LocalDuration {
        self.duration_since(rhs)
    }
}

impl Add for LocalDuration {
    type Output = LocalDuration;

    fn add(self, rhs: LocalDuration) -> LocalDuration {
        LocalDuration(self.0.saturating_add(rhs.0))
    }
}

/// A source of [`LocalTime`], abstracted so tests can inject a controlled
/// clock instead of the wall clock.
pub trait Clock {
    /// Current local time according to this clock.
    fn local_time(&self) -> LocalTime;
}

/// A clock that always returns the wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock;

impl Clock for WallClock {
    fn local_time(&self) -> LocalTime {
        LocalTime::now()
    }
}

/// A clock whose value is set explicitly, for deterministic tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualClock(LocalTime);

impl ManualClock {
    /// Construct a manual clock at the given time.
    pub fn new(time: LocalTime) -> Self {
        Self(time)
    }

    /// Advance the clock by a duration.
    pub fn advance(&mut self, by: LocalDuration) {
        self.0 = self.0 + by;
    }

    /// Set the clock to an absolute time.
    pub fn set(&mut self, time: LocalTime) {
        self.0 = time;
    }
}

impl Clock for ManualClock {
    fn local_time(&self) -> LocalTime {
        self.0
    }
}
