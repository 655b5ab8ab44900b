use std::time::Duration;

use parking_lot::Mutex;

/// Timed suspension between attempts. Injected so tests can observe the
/// backoff schedule without sleeping.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records every requested sleep instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.lock().push(duration);
    }
}

/// Bounded attempts with linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    /// Delay after the failed attempt `attempt` (1-based): `attempt × base`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

/// How long to wait for the live application to report responsive before
/// each live attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityWait {
    pub polls: u32,
    pub interval: Duration,
    /// Extra pause after the application came back from being unresponsive.
    pub settle: Duration,
}

impl Default for AvailabilityWait {
    fn default() -> Self {
        Self {
            polls: 3,
            interval: Duration::from_millis(500),
            settle: Duration::from_millis(1000),
        }
    }
}

impl AvailabilityWait {
    /// Poll `ready` up to `polls` times. Returns whether it became ready.
    pub fn wait(&self, sleeper: &dyn Sleeper, mut ready: impl FnMut() -> bool) -> bool {
        let polls = self.polls.max(1);
        for poll in 1..=polls {
            if ready() {
                if poll > 1 && !self.settle.is_zero() {
                    sleeper.sleep(self.settle);
                }
                return true;
            }
            if poll < polls {
                sleeper.sleep(self.interval);
            }
        }
        false
    }
}
