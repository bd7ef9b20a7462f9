//! Injectable polling schedulers.
//!
//! Every message source asks its scheduler for a [`Ticker`] when a
//! subscription starts and waits on it before each fetch. Production code
//! uses [`TokioScheduler`]; tests either run it on tokio's paused clock or
//! swap in [`ManualScheduler`] and fire ticks by hand.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;

// Periods are capped so the first deadline stays representable
const LONGEST_TICK: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A stream of polling ticks for one subscription
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick
    async fn tick(&mut self);
}

/// Produces tickers for message sources
pub trait PollScheduler: Send + Sync {
    fn ticker(&self, interval: Duration) -> Box<dyn Ticker>;
}

// ============================================================================
// Tokio Scheduler
// ============================================================================

/// Fixed-rate scheduler on the tokio clock
///
/// The first tick fires one full interval after the ticker is created. A
/// tick missed because the consumer was slow is delayed rather than burst.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl PollScheduler for TokioScheduler {
    fn ticker(&self, interval: Duration) -> Box<dyn Ticker> {
        let interval = interval.min(LONGEST_TICK);
        let start = Instant::now()
            .checked_add(interval)
            .unwrap_or_else(Instant::now);
        let mut interval = tokio::time::interval_at(start, interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Box::new(IntervalTicker { interval })
    }
}

struct IntervalTicker {
    interval: Interval,
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

// ============================================================================
// Manual Scheduler
// ============================================================================

/// Scheduler whose ticks are fired explicitly with [`ManualScheduler::tick`]
///
/// Each tick is delivered once to every ticker created from this scheduler.
/// Ticks fired before a ticker waits are queued, not lost.
#[derive(Clone)]
pub struct ManualScheduler {
    ticks: Arc<watch::Sender<u64>>,
    intervals: Arc<Mutex<Vec<Duration>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(0);
        Self {
            ticks: Arc::new(sender),
            intervals: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fire one tick on every ticker
    pub fn tick(&self) {
        self.ticks.send_modify(|count| *count += 1);
    }

    /// Number of ticks fired so far
    pub fn tick_count(&self) -> u64 {
        *self.ticks.borrow()
    }

    /// Intervals requested by tickers, in creation order
    pub fn requested_intervals(&self) -> Vec<Duration> {
        self.intervals
            .lock()
            .map(|intervals| intervals.clone())
            .unwrap_or_default()
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PollScheduler for ManualScheduler {
    fn ticker(&self, interval: Duration) -> Box<dyn Ticker> {
        if let Ok(mut intervals) = self.intervals.lock() {
            intervals.push(interval);
        }

        let receiver = self.ticks.subscribe();
        let seen = *receiver.borrow();
        Box::new(ManualTicker { receiver, seen })
    }
}

struct ManualTicker {
    receiver: watch::Receiver<u64>,
    seen: u64,
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) {
        loop {
            let fired = *self.receiver.borrow_and_update();
            if fired > self.seen {
                self.seen += 1;
                return;
            }
            if self.receiver.changed().await.is_err() {
                // Scheduler dropped; no further ticks will ever arrive
                std::future::pending::<()>().await;
            }
        }
    }
}
