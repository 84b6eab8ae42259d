//! Clock abstraction and deadline pacing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Longest single sleep; bounds how long a cancel request can go unnoticed
pub const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Time source for the emitter
pub trait Clock {
    /// Monotonic instant used for pacing
    fn now(&self) -> Instant;
    /// Seconds since the Unix epoch, written to the send log
    fn wall_time(&self) -> f64;
    fn sleep(&self, duration: Duration);
}

/// The real clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_time(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Shared stop request, set from the Ctrl-C handler
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sleep until `deadline` in slices, watching `cancel`.
///
/// Returns `false` if cancelled before the deadline was reached.
pub fn sleep_until(clock: &dyn Clock, deadline: Instant, cancel: &CancelFlag) -> bool {
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = clock.now();
        if now >= deadline {
            return true;
        }
        clock.sleep((deadline - now).min(SLEEP_SLICE));
    }
}

/// Ideal send schedule: packet `n` is due at `start + (n - 1) * interval`.
///
/// The next deadline only ever moves forward by one interval per send, so
/// per-packet overhead below one interval does not accumulate as drift.
#[derive(Debug, Clone)]
pub struct Pacer {
    interval: Duration,
    next: Instant,
}

impl Pacer {
    pub fn new(start: Instant, interval: Duration) -> Self {
        Self { interval, next: start }
    }

    pub fn next_deadline(&self) -> Instant {
        self.next
    }

    /// Move the deadline on by one interval after a send
    pub fn advance(&mut self) {
        self.next += self.interval;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::Cell;

    /// Deterministic clock: time only moves on `sleep` or `advance`
    pub struct ManualClock {
        base: Instant,
        offset: Cell<Duration>,
        pub wall_base: f64,
    }

    impl ManualClock {
        pub fn new(wall_base: f64) -> Self {
            Self {
                base: Instant::now(),
                offset: Cell::new(Duration::ZERO),
                wall_base,
            }
        }

        pub fn advance(&self, d: Duration) {
            self.offset.set(self.offset.get() + d);
        }

        pub fn elapsed(&self) -> Duration {
            self.offset.get()
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.base + self.offset.get()
        }

        fn wall_time(&self) -> f64 {
            self.wall_base + self.offset.get().as_secs_f64()
        }

        fn sleep(&self, duration: Duration) {
            self.advance(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ManualClock;
    use super::*;

    #[test]
    fn test_deadlines_follow_ideal_schedule() {
        let clock = ManualClock::new(0.0);
        let interval = Duration::from_millis(40);
        let mut pacer = Pacer::new(clock.now(), interval);
        let cancel = CancelFlag::new();
        let start = clock.now();

        for n in 1..=50u64 {
            if n > 1 {
                assert!(sleep_until(&clock, pacer.next_deadline(), &cancel));
            }
            assert_eq!(clock.now(), start + interval * (n as u32 - 1));
            assert_eq!(pacer.next_deadline(), start + interval * (n as u32 - 1));
            // Send overhead, always below one interval
            clock.advance(Duration::from_millis(n % 37));
            pacer.advance();
        }
    }

    #[test]
    fn test_overrun_does_not_sleep() {
        let clock = ManualClock::new(0.0);
        let mut pacer = Pacer::new(clock.now(), Duration::from_millis(10));
        pacer.advance();
        clock.advance(Duration::from_millis(25));
        let before = clock.elapsed();
        assert!(sleep_until(&clock, pacer.next_deadline(), &CancelFlag::new()));
        assert_eq!(clock.elapsed(), before);
    }

    #[test]
    fn test_sleep_is_sliced_and_cancellable() {
        let clock = ManualClock::new(0.0);
        let cancel = CancelFlag::new();
        let deadline = clock.now() + Duration::from_millis(120);
        assert!(sleep_until(&clock, deadline, &cancel));
        assert_eq!(clock.elapsed(), Duration::from_millis(120));

        cancel.cancel();
        let deadline = clock.now() + Duration::from_secs(5);
        assert!(!sleep_until(&clock, deadline, &cancel));
        assert!(cancel.clone().is_cancelled());
    }
}
