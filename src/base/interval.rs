use log::trace;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Fixed-rate timer for the polling loop.
///
/// Deadlines advance by exactly one period from the previous deadline, so the
/// average rate does not drift with the time spent in each cycle. Deadlines
/// that have already passed are skipped rather than fired back to back.
#[derive(Debug, Clone)]
pub struct Interval {
    period: Duration,
    next: Instant,
}

impl Interval {
    /// Creates an interval whose first deadline is one `period` from now.
    pub fn new(period: Duration) -> Interval {
        Interval::starting_at(Instant::now() + period, period)
    }

    /// Creates an interval whose first deadline is `first`.
    pub fn starting_at(first: Instant, period: Duration) -> Interval {
        trace!("Creating interval with period {:?}", period);
        Interval {
            period,
            next: first,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// The next deadline.
    pub fn deadline(&self) -> Instant {
        self.next
    }

    /// Sleeps until the next deadline and re-arms the interval.
    pub fn wait(&mut self) {
        let now = Instant::now();
        if self.next > now {
            thread::sleep(self.next - now);
        }
        self.advance(Instant::now());
    }

    /// Moves the deadline to the first period boundary after `now`.
    pub fn advance(&mut self, now: Instant) {
        if self.period.is_zero() {
            self.next = now;
            return;
        }

        self.next += self.period;
        if self.next <= now {
            let period = self.period.as_nanos();
            let behind = (now - self.next).as_nanos();
            trace!(
                "Interval fell behind, skipping {} deadlines",
                behind / period + 1
            );
            // remainder < period, so it always fits in u64
            let into_period = Duration::from_nanos((behind % period) as u64);
            self.next = now + (self.period - into_period);
        }
    }
}

/// Cooperative cancellation flag for the polling loop.
///
/// Clones share the same flag, so a handle can be moved to another thread or
/// captured by a sample sink to end the loop after the current cycle.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> StopHandle {
        StopHandle::default()
    }

    /// Requests the loop to stop. The cycle in progress runs to completion.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}
