//! Crawl dispatcher: turns the tracked-performance worklist into
//! `AssignCrawling` events.
//!
//! # Flow
//!
//! ```text
//! for each TrackedPerformance (sequentially):
//!     session      = crawler.acquire_session()
//!     sub_periods  = crawler.list_sub_periods(session, code, qualifier)
//!     publish one AssignCrawling per sub-period   (concurrently, all settle)
//! ```
//!
//! Enumeration needs a live session, so every sub-period of a performance is
//! known before any of its jobs is published.
//!
//! # Failure semantics
//!
//! The first error (session, enumeration, serialization or any publish)
//! aborts the run: remaining performances wait for the next trigger. The
//! error is logged and counted, never returned. Jobs already published stay
//! published; re-dispatching them on the next run is the accepted outcome
//! because the crawler and the reconciler both tolerate duplicates.

use crate::metrics::DispatcherMetrics;
use crate::task_group::TaskGroup;
use seatwatch_core::crawling::{CrawlingError, CrawlingGateway, TrackedPerformance};
use seatwatch_core::event::{EventError, SerializedEvent};
use seatwatch_core::event_bus::{EventBus, EventBusError};
use seatwatch_core::performance::PerformanceCode;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

/// Topic `AssignCrawling` events go to unless configured otherwise.
pub const DEFAULT_ASSIGN_CRAWLING_TOPIC: &str = "assign-crawling";

/// Why dispatching one tracked performance stopped.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Session acquisition or sub-period enumeration failed
    #[error(transparent)]
    Crawling(#[from] CrawlingError),

    /// An `AssignCrawling` event could not be serialized
    #[error(transparent)]
    Event(#[from] EventError),

    /// Some publishes of the fan-out failed
    #[error("{failed} of {attempted} AssignCrawling publishes failed for performance '{performance_code}'")]
    PartialFanOut {
        /// The performance being dispatched
        performance_code: PerformanceCode,
        /// Publishes that failed
        failed: usize,
        /// Publishes attempted
        attempted: usize,
    },
}

/// What one dispatch run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Performances whose every job was published
    pub performances_completed: usize,
    /// `AssignCrawling` events accepted by the bus
    pub events_published: usize,
    /// `AssignCrawling` publishes that failed
    pub events_failed: usize,
    /// Performance the run stopped at, if it was aborted
    pub aborted_at: Option<PerformanceCode>,
}

impl DispatchReport {
    /// Whether the run stopped early
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        self.aborted_at.is_some()
    }
}

/// Fans tracked performances out to the crawler through the event bus.
pub struct CrawlDispatcher {
    crawler: Arc<dyn CrawlingGateway>,
    event_bus: Arc<dyn EventBus>,
    topic: String,
}

impl CrawlDispatcher {
    /// Create a dispatcher publishing to [`DEFAULT_ASSIGN_CRAWLING_TOPIC`].
    #[must_use]
    pub fn new(crawler: Arc<dyn CrawlingGateway>, event_bus: Arc<dyn EventBus>) -> Self {
        Self {
            crawler,
            event_bus,
            topic: DEFAULT_ASSIGN_CRAWLING_TOPIC.to_string(),
        }
    }

    /// Publish to `topic` instead of the default.
    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Topic `AssignCrawling` events are published to
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Dispatch crawl jobs for every entry of `worklist`.
    ///
    /// Never fails: errors abort the run, are logged, and show up in the
    /// returned report.
    #[tracing::instrument(skip(self, worklist), fields(performances = worklist.len(), topic = %self.topic))]
    pub async fn run(&self, worklist: &[TrackedPerformance]) -> DispatchReport {
        let mut report = DispatchReport::default();

        for tracked in worklist {
            match self.dispatch_performance(tracked, &mut report).await {
                Ok(()) => report.performances_completed += 1,
                Err(e) => {
                    error!(
                        performance_code = %tracked.performance_code,
                        period_qualifier = %tracked.period_qualifier,
                        error = %e,
                        "Crawl dispatch aborted"
                    );
                    DispatcherMetrics::record_aborted();
                    report.aborted_at = Some(tracked.performance_code.clone());
                    break;
                }
            }
        }

        info!(
            completed = report.performances_completed,
            published = report.events_published,
            failed = report.events_failed,
            aborted = report.is_aborted(),
            "Crawl dispatch finished"
        );
        report
    }

    async fn dispatch_performance(
        &self,
        tracked: &TrackedPerformance,
        report: &mut DispatchReport,
    ) -> Result<(), DispatchError> {
        let session = self.crawler.acquire_session().await?;
        let sub_periods = self
            .crawler
            .list_sub_periods(&session, &tracked.performance_code, &tracked.period_qualifier)
            .await?;
        let jobs = tracked.jobs(sub_periods);

        debug!(
            performance_code = %tracked.performance_code,
            jobs = jobs.len(),
            "Enumerated sub-periods"
        );

        let metadata = serde_json::json!({
            "source": "seatwatch.crawl-dispatcher",
            "dispatched_at": chrono::Utc::now().to_rfc3339(),
        });

        // Serialize everything up front so an encoding error publishes nothing
        let events = jobs
            .iter()
            .map(|job| {
                SerializedEvent::from_event(&job.to_event(), Some(metadata.clone()))
                    .map(|event| (job.sub_period.to_string(), event))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut fan_out: TaskGroup<'_, (), EventBusError> = TaskGroup::new("assign-crawling");
        for (sub_period, event) in events {
            fan_out.add(sub_period, async move {
                self.event_bus.publish(&self.topic, &event).await
            });
        }

        let attempted = fan_out.len();
        let outcome = fan_out.join().await;

        report.events_published += outcome.succeeded_count();
        report.events_failed += outcome.failed_count();
        DispatcherMetrics::record_published(outcome.succeeded_count());
        DispatcherMetrics::record_publish_errors(outcome.failed_count());

        if outcome.is_clean() {
            Ok(())
        } else {
            Err(DispatchError::PartialFanOut {
                performance_code: tracked.performance_code.clone(),
                failed: outcome.failed_count(),
                attempted,
            })
        }
    }
}
