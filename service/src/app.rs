//! Process wiring: builds both pipelines from configuration and runs their
//! drivers until shutdown.
//!
//! ```text
//!                 ┌──────────────────┐      ┌─────────────────┐
//!  interval ─────►│ DispatchSchedule │─────►│ CrawlDispatcher │──► EventBus
//!                 └──────────────────┘      └─────────────────┘
//!                 ┌──────────────────────┐  ┌───────────────────┐
//!  change stream ►│ ChangeStreamConsumer │─►│ VacancyReconciler │──► SeatRepository
//!                 └──────────────────────┘  └───────────────────┘
//!                          ▲
//!  shutdown (broadcast) ───┴── both drivers
//! ```

use crate::config::Config;
use seatwatch_core::change_stream::ChangeStreamSource;
use seatwatch_core::crawling::CrawlingGateway;
use seatwatch_core::event_bus::EventBus;
use seatwatch_core::repository::{CrawlingResultRepository, SeatRepository};
use seatwatch_runtime::{ChangeStreamConsumer, CrawlDispatcher, DispatchSchedule, VacancyReconciler};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Errors from running the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// A driver task panicked or was cancelled
    #[error("Driver task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The drivers did not stop within the shutdown timeout
    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// The external systems the pipelines talk to.
#[derive(Clone)]
pub struct Collaborators {
    /// Box-office crawler gateway
    pub crawler: Arc<dyn CrawlingGateway>,
    /// Bus `AssignCrawling` events are published on
    pub event_bus: Arc<dyn EventBus>,
    /// Store the crawler writes results to
    pub crawling_results: Arc<dyn CrawlingResultRepository>,
    /// Store of detected vacant seats
    pub seats: Arc<dyn SeatRepository>,
    /// Change stream of the crawl-result store
    pub change_stream: Arc<dyn ChangeStreamSource>,
}

/// Both pipelines, configured and ready to start.
pub struct SeatwatchApp {
    config: Config,
    dispatcher: Arc<CrawlDispatcher>,
    reconciler: Arc<VacancyReconciler>,
    change_stream: Arc<dyn ChangeStreamSource>,
}

impl SeatwatchApp {
    /// Build both pipelines over `collaborators`.
    #[must_use]
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let dispatcher = CrawlDispatcher::new(collaborators.crawler, collaborators.event_bus)
            .with_topic(config.dispatch.assign_crawling_topic.clone());
        let reconciler =
            VacancyReconciler::new(collaborators.crawling_results, collaborators.seats);

        Self {
            config,
            dispatcher: Arc::new(dispatcher),
            reconciler: Arc::new(reconciler),
            change_stream: collaborators.change_stream,
        }
    }

    /// The loaded configuration
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The dispatch pipeline, for one-off runs
    #[must_use]
    pub fn dispatcher(&self) -> &CrawlDispatcher {
        &self.dispatcher
    }

    /// The reconciliation pipeline, for one-off batches
    #[must_use]
    pub fn reconciler(&self) -> &VacancyReconciler {
        &self.reconciler
    }

    /// Spawn the dispatch schedule and the change-stream consumer.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(&self) -> RunningApp {
        let (shutdown, _) = broadcast::channel(1);

        let schedule = DispatchSchedule::new(
            Arc::clone(&self.dispatcher),
            self.config.dispatch.tracked_performances.clone(),
            shutdown.subscribe(),
        )
        .with_interval(self.config.dispatch_interval())
        .spawn();

        let consumer = ChangeStreamConsumer::new(
            self.config.consumer.name.clone(),
            Arc::clone(&self.change_stream),
            Arc::clone(&self.reconciler),
            shutdown.subscribe(),
        )
        .with_retry_delay(self.config.consumer_retry_delay())
        .spawn();

        info!(
            performances = self.config.dispatch.tracked_performances.len(),
            topic = %self.config.dispatch.assign_crawling_topic,
            "Seatwatch drivers started"
        );

        RunningApp {
            shutdown,
            schedule,
            consumer,
            timeout: self.config.shutdown_timeout(),
        }
    }
}

/// What the drivers did before they stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownSummary {
    /// Dispatch runs started
    pub dispatch_runs: u64,
    /// Change-stream batches reconciled
    pub batches_reconciled: u64,
}

/// Handle on the running drivers.
pub struct RunningApp {
    shutdown: broadcast::Sender<()>,
    schedule: JoinHandle<u64>,
    consumer: JoinHandle<u64>,
    timeout: Duration,
}

impl RunningApp {
    /// Signal both drivers and wait for them to stop.
    ///
    /// In-flight dispatch runs and batches are finished first.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ShutdownTimeout`] if the drivers are still busy
    /// after the configured timeout, or [`AppError::Join`] if one panicked.
    pub async fn shutdown(self) -> Result<ShutdownSummary, AppError> {
        if self.shutdown.send(()).is_err() {
            warn!("Drivers already stopped before shutdown signal");
        }

        let timeout = self.timeout;
        let joined = tokio::time::timeout(timeout, async {
            let dispatch_runs = self.schedule.await?;
            let batches_reconciled = self.consumer.await?;
            Ok::<_, AppError>(ShutdownSummary {
                dispatch_runs,
                batches_reconciled,
            })
        })
        .await
        .map_err(|_| AppError::ShutdownTimeout(timeout))??;

        info!(
            dispatch_runs = joined.dispatch_runs,
            batches = joined.batches_reconciled,
            "Seatwatch drivers stopped"
        );
        Ok(joined)
    }
}
