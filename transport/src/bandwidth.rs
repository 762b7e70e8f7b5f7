//! Per-neighbour token bucket (spec §4.1).
//!
//! The tracker owns no threading; every call is serialized by the
//! transport handle's single-threaded cooperative loop (spec §5), so a
//! plain `&mut self` API is enough — no interior mutability or locking,
//! grounded in the teacher's preference for explicit ownership over
//! shared-state synchronization throughout `fsm.rs`'s sub-managers.
use transport_core::time::{LocalDuration, LocalTime};

/// Default carry-forward horizon when none is configured (Open Question
/// #1 in `SPEC_FULL.md`: spec leaves this as "a few seconds").
pub const DEFAULT_CARRY_FORWARD: LocalDuration = LocalDuration::from_secs(5);

/// A token bucket tracking one neighbour's outbound (or inbound, for
/// session-level rate limiting — spec §4.8) bandwidth allowance.
pub struct Tracker {
    rate_bytes_per_sec: u64,
    window: LocalDuration,
    tokens: f64,
    last_update: LocalTime,
    on_update: Option<Box<dyn FnMut()>>,
    on_excess: Option<Box<dyn FnMut()>>,
}

impl Tracker {
    /// Construct a tracker with the given rate and carry-forward window,
    /// starting full (to avoid penalizing a just-connected neighbour).
    pub fn new(rate_bytes_per_sec: u64, window: LocalDuration, now: LocalTime) -> Self {
        let cap = rate_bytes_per_sec as f64 * window.as_secs_f64();
        Self {
            rate_bytes_per_sec,
            window,
            tokens: cap,
            last_update: now,
            on_update: None,
            on_excess: None,
        }
    }

    /// Register the update/excess notification callbacks (spec §4.1).
    pub fn notification_init(
        &mut self,
        on_update: impl FnMut() + 'static,
        on_excess: impl FnMut() + 'static,
    ) {
        self.on_update = Some(Box::new(on_update));
        self.on_excess = Some(Box::new(on_excess));
    }

    /// Atomically replace the rate.
    pub fn update_quota(&mut self, rate_bytes_per_sec: u64, now: LocalTime) {
        self.accrue(now);
        self.rate_bytes_per_sec = rate_bytes_per_sec;
        self.notify_update();
    }

    /// Deduct `n` bytes from the accumulated reservoir. May drive the
    /// reservoir negative (debt), which `get_delay` accounts for.
    pub fn consume(&mut self, n: u64, now: LocalTime) {
        self.accrue(now);
        self.tokens -= n as f64;
        self.notify_update();
    }

    /// Time until `n` bytes of tokens will have accrued; zero if already
    /// available.
    pub fn get_delay(&mut self, n: u64, now: LocalTime) -> LocalDuration {
        self.accrue(now);
        if self.tokens >= n as f64 {
            return LocalDuration::ZERO;
        }
        if self.rate_bytes_per_sec == 0 {
            // No rate configured: delay is unbounded. Callers treat this
            // as "never ready" rather than stalling on an infinite wait.
            return LocalDuration::from_secs(u64::MAX / 2_000_000);
        }
        let shortfall = n as f64 - self.tokens;
        let secs = shortfall / self.rate_bytes_per_sec as f64;
        LocalDuration::from_micros((secs * 1_000_000.0).ceil() as u64)
    }

    /// The carry-forward cap in bytes, at the current rate.
    fn cap(&self) -> f64 {
        self.rate_bytes_per_sec as f64 * self.window.as_secs_f64()
    }

    fn accrue(&mut self, now: LocalTime) {
        let elapsed = now.duration_since(self.last_update);
        self.last_update = now;
        if elapsed.is_zero() {
            return;
        }
        self.tokens += self.rate_bytes_per_sec as f64 * elapsed.as_secs_f64();
        let cap = self.cap();
        if self.tokens > cap {
            self.tokens = cap;
            self.notify_excess();
        }
    }

    fn notify_update(&mut self) {
        if let Some(cb) = self.on_update.as_mut() {
            cb();
        }
    }

    fn notify_excess(&mut self) {
        if let Some(cb) = self.on_excess.as_mut() {
            cb();
        }
    }

    /// Current reservoir value, for telemetry and tests.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }
}
