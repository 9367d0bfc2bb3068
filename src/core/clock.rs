//! Monotonic time sources and cooperative deadlines
//!
//! All scheduler budgets are enforced by polling a monotonic clock at
//! natural checkpoints. `Deadline` caches the last observed time and
//! refreshes it only every few checks, so hot loops do not pay a
//! syscall per iteration.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Monotonic time source with at least microsecond resolution.
///
/// Timestamps are seconds since an arbitrary per-clock origin. Only
/// differences between timestamps from the same clock are meaningful.
pub trait Clock {
    fn now(&self) -> f64;
}

/// Instant-backed clock for production use.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Manually advanced clock for tests and deterministic replay.
pub struct ManualClock {
    now: Cell<f64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { now: Cell::new(0.0) }
    }

    pub fn advance(&self, secs: f64) {
        self.now.set(self.now.get() + secs);
    }

    pub fn set(&self, now: f64) {
        self.now.set(now);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }
}

/// How many `expired` checks pass between clock reads.
const DEFAULT_POLL_STRIDE: u32 = 8;

/// Absolute deadline polled at a reduced cadence.
///
/// Between reads the last observed time is reused, so a budgeted loop
/// can overshoot its deadline by at most one stride of work. An
/// infinite budget never expires.
pub struct Deadline {
    clock: Rc<dyn Clock>,
    deadline: f64,
    stride: u32,
    counter: u32,
    last_now: f64,
}

impl Deadline {
    /// Deadline `budget_secs` from now.
    pub fn new(clock: Rc<dyn Clock>, budget_secs: f64) -> Self {
        Self::with_stride(clock, budget_secs, DEFAULT_POLL_STRIDE)
    }

    /// Deadline with an explicit clock-read stride (1 = read every check).
    pub fn with_stride(clock: Rc<dyn Clock>, budget_secs: f64, stride: u32) -> Self {
        let now = clock.now();
        Self {
            clock,
            deadline: now + budget_secs,
            stride: stride.max(1),
            counter: 0,
            last_now: now,
        }
    }

    /// Check the deadline, reading the clock every `stride` calls.
    pub fn expired(&mut self) -> bool {
        self.counter += 1;
        if self.counter >= self.stride {
            self.counter = 0;
            self.last_now = self.clock.now();
        }
        self.last_now >= self.deadline
    }

    /// Read the clock immediately and check the deadline.
    pub fn expired_now(&mut self) -> bool {
        self.counter = 0;
        self.last_now = self.clock.now();
        self.last_now >= self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), 0.0);
        clock.advance(0.5);
        assert_eq!(clock.now(), 0.5);
        clock.set(2.0);
        assert_eq!(clock.now(), 2.0);
    }

    #[test]
    fn test_monotonic_clock_increases() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_deadline_zero_budget_expires_immediately() {
        let clock = Rc::new(ManualClock::new());
        let mut deadline = Deadline::with_stride(clock, 0.0, 1);
        assert!(deadline.expired());
    }

    #[test]
    fn test_deadline_expires_after_budget() {
        let clock = Rc::new(ManualClock::new());
        let mut deadline = Deadline::with_stride(clock.clone(), 0.010, 1);
        assert!(!deadline.expired());
        clock.advance(0.005);
        assert!(!deadline.expired());
        clock.advance(0.006);
        assert!(deadline.expired());
    }

    #[test]
    fn test_deadline_infinite_budget_never_expires() {
        let clock = Rc::new(ManualClock::new());
        let mut deadline = Deadline::with_stride(clock.clone(), f64::INFINITY, 1);
        clock.advance(1e9);
        assert!(!deadline.expired());
    }

    #[test]
    fn test_deadline_stride_delays_observation() {
        let clock = Rc::new(ManualClock::new());
        let mut deadline = Deadline::with_stride(clock.clone(), 0.001, 4);
        clock.advance(1.0);
        // First three checks reuse the stale time observed at creation
        assert!(!deadline.expired());
        assert!(!deadline.expired());
        assert!(!deadline.expired());
        // Fourth check reads the clock
        assert!(deadline.expired());
    }

    #[test]
    fn test_deadline_expired_now_reads_immediately() {
        let clock = Rc::new(ManualClock::new());
        let mut deadline = Deadline::with_stride(clock.clone(), 0.001, 100);
        clock.advance(1.0);
        assert!(deadline.expired_now());
    }
}
