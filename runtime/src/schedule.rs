//! Periodic trigger for the crawl dispatcher.
//!
//! The first run starts immediately, then one run per interval. A run that
//! overruns the interval delays the next tick instead of bunching up missed
//! ones. A run in progress is never cancelled: shutdown is observed between
//! runs.

use crate::dispatcher::CrawlDispatcher;
use seatwatch_core::crawling::TrackedPerformance;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Dispatch runs once an hour unless configured otherwise
pub const DEFAULT_DISPATCH_INTERVAL: Duration = Duration::from_secs(3600);

/// Runs a [`CrawlDispatcher`] over a fixed worklist at a fixed interval.
pub struct DispatchSchedule {
    dispatcher: Arc<CrawlDispatcher>,
    worklist: Vec<TrackedPerformance>,
    interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl DispatchSchedule {
    /// Create a schedule running every [`DEFAULT_DISPATCH_INTERVAL`].
    #[must_use]
    pub fn new(
        dispatcher: Arc<CrawlDispatcher>,
        worklist: Vec<TrackedPerformance>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            dispatcher,
            worklist,
            interval: DEFAULT_DISPATCH_INTERVAL,
            shutdown,
        }
    }

    /// Set the interval between runs (at least one millisecond).
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Spawn the schedule; the handle resolves to the number of runs started.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<u64> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(&mut self) -> u64 {
        info!(
            performances = self.worklist.len(),
            interval = ?self.interval,
            "Dispatch schedule started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut runs = 0_u64;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.recv() => {
                    info!("Dispatch schedule received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    runs += 1;
                    debug!(run = runs, "Dispatch triggered");
                    self.dispatcher.run(&self.worklist).await;
                }
            }
        }

        info!(runs, "Dispatch schedule stopped");
        runs
    }
}
