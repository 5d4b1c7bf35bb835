//! Resettable recurring timer.
//!
//! A [`RecurringTimer`] owns the period; any number of [`Ticker`]s observe it.
//! Resetting the period replaces the pending deadline of every ticker with
//! `now + new period`, including deadlines already pending.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, Instant};

/// Period used for a timer that should never fire in practice.
pub const DISARMED_PERIOD: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 100);

/// Fallback when `now + period` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

#[derive(Debug)]
pub struct RecurringTimer {
    period: watch::Sender<Duration>,
}

impl RecurringTimer {
    pub fn new(period: Duration) -> Self {
        let (period, _) = watch::channel(period);
        Self { period }
    }

    /// A timer armed with [`DISARMED_PERIOD`].
    pub fn disarmed() -> Self {
        Self::new(DISARMED_PERIOD)
    }

    pub fn period(&self) -> Duration {
        *self.period.borrow()
    }

    pub fn is_armed(&self) -> bool {
        self.period() < DISARMED_PERIOD
    }

    /// Change the period; pending deadlines restart from now.
    pub fn reset(&self, period: Duration) {
        self.period.send_replace(period);
    }

    /// Put the timer back to [`DISARMED_PERIOD`].
    pub fn disarm(&self) {
        self.reset(DISARMED_PERIOD);
    }

    /// A tick stream whose first deadline is one period from now.
    pub fn ticker(&self) -> Ticker {
        Ticker::new(self.period.subscribe())
    }
}

/// Waits for the ticks of one [`RecurringTimer`].
#[derive(Debug)]
pub struct Ticker {
    period: watch::Receiver<Duration>,
    deadline: Instant,
}

impl Ticker {
    fn new(mut period: watch::Receiver<Duration>) -> Self {
        let current = *period.borrow_and_update();
        Self {
            period,
            deadline: deadline_after(current),
        }
    }

    /// Wait for the next tick. Returns `None` once the timer is dropped.
    pub async fn tick(&mut self) -> Option<Instant> {
        loop {
            tokio::select! {
                _ = time::sleep_until(self.deadline) => {
                    let fired = Instant::now();
                    self.deadline = deadline_after(*self.period.borrow());
                    return Some(fired);
                }
                changed = self.period.changed() => {
                    changed.ok()?;
                    let period = *self.period.borrow_and_update();
                    self.deadline = deadline_after(period);
                }
            }
        }
    }
}

fn deadline_after(period: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(period).unwrap_or(now + FAR_FUTURE)
}
