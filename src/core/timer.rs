//! One-shot deadline timers and the clock they are polled against.
//!
//! Nothing here spawns threads or sleeps. A [`Timer`] only remembers when it is
//! due; the owner polls it from its update loop:
//!
//! ```ignore
//! timer.schedule(clock.now(), Duration::from_millis(250));
//!
//! // In update loop:
//! if timer.fire(clock.now()) {
//!     animate();
//! }
//! ```
//!
//! Scheduling replaces any pending deadline, so a timer can never fire twice
//! for two overlapping schedules.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Source of "now" for timers.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Clone)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(|e| e.into_inner());
        *elapsed += by;
    }

    /// Move time forward by `ms` milliseconds
    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = *self.elapsed.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("ManualClock").field("elapsed", &elapsed).finish()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.elapsed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Cancellable one-shot timer.
#[derive(Debug, Clone, Default)]
pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    pub fn new() -> Self {
        Self { deadline: None }
    }

    /// Arm the timer `delay` after `now`, replacing any pending deadline.
    pub fn schedule(&mut self, now: Instant, delay: Duration) {
        if self.is_pending() {
            log::trace!("Timer: replacing pending deadline");
        }
        self.deadline = Some(now + delay);
    }

    /// Disarm the timer. Returns true if something was pending.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    /// Check whether the timer is due at `now`.
    /// Disarms it when it fires, so each schedule fires at most once.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_due_before_deadline() {
        let clock = ManualClock::new();
        let mut timer = Timer::new();

        timer.schedule(clock.now(), Duration::from_millis(100));
        assert!(timer.is_pending());

        clock.advance_ms(99);
        assert!(!timer.fire(clock.now()));
        assert!(timer.is_pending());
    }

    #[test]
    fn test_fires_once() {
        let clock = ManualClock::new();
        let mut timer = Timer::new();

        timer.schedule(clock.now(), Duration::from_millis(10));
        clock.advance_ms(10);
        assert!(timer.fire(clock.now()));
        assert!(!timer.is_pending());

        clock.advance_ms(100);
        assert!(!timer.fire(clock.now()));
    }

    #[test]
    fn test_reschedule_replaces_deadline() {
        let clock = ManualClock::new();
        let mut timer = Timer::new();

        timer.schedule(clock.now(), Duration::from_millis(50));
        clock.advance_ms(30);
        timer.schedule(clock.now(), Duration::from_millis(50));

        clock.advance_ms(30);
        // First deadline passed, but it was replaced
        assert!(!timer.fire(clock.now()));

        clock.advance_ms(20);
        assert!(timer.fire(clock.now()));
    }

    #[test]
    fn test_cancel() {
        let clock = ManualClock::new();
        let mut timer = Timer::new();

        assert!(!timer.cancel());
        timer.schedule(clock.now(), Duration::from_millis(5));
        assert!(timer.cancel());

        clock.advance_ms(10);
        assert!(!timer.fire(clock.now()));
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        let start = clock.now();

        other.advance_ms(42);
        assert_eq!(clock.now() - start, Duration::from_millis(42));
    }
}
