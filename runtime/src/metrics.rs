//! Prometheus metrics for the dispatch and reconciliation pipelines.
//!
//! Swallowed errors never reach a caller, so these counters (next to the log
//! lines) are how an operator notices a failing collaborator:
//! - Crawl dispatch: events published, publish errors, aborted runs
//! - Reconciliation: records processed or failed, seats persisted, skipped
//!   as already known, or failed to save
//!
//! Recording goes through the `metrics` facade and is a no-op until a
//! recorder is installed, so the pipelines record unconditionally.
//!
//! # Example
//!
//! ```rust,no_run
//! use seatwatch_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Serve metrics on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::counter;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the global recorder and start serving `/metrics`.
    ///
    /// Must be called from within a tokio runtime: the HTTP exporter runs as
    /// a background task.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] if the exporter cannot be built (for
    /// example when the address cannot be bound).
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), this logs a
    /// warning and leaves the existing recorder in place.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;
        let handle = recorder.handle();

        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }

        tokio::spawn(async move {
            if exporter.await.is_err() {
                tracing::error!("Metrics exporter stopped");
            }
        });

        // Descriptions only reach a recorder that is already installed
        register_metrics();
        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Dispatcher Metrics
    describe_counter!(
        "dispatcher_events_published_total",
        "Total number of AssignCrawling events published"
    );
    describe_counter!(
        "dispatcher_publish_errors_total",
        "Total number of AssignCrawling publishes that failed"
    );
    describe_counter!(
        "dispatcher_runs_aborted_total",
        "Total number of dispatch runs aborted by an error"
    );

    // Reconciler Metrics
    describe_counter!(
        "reconciler_records_processed_total",
        "Total number of change-stream records reconciled"
    );
    describe_counter!(
        "reconciler_records_failed_total",
        "Total number of change-stream records abandoned on error"
    );
    describe_counter!(
        "reconciler_seats_persisted_total",
        "Total number of newly vacant seats persisted"
    );
    describe_counter!(
        "reconciler_seats_skipped_total",
        "Total number of reported seats skipped as already known"
    );
    describe_counter!(
        "reconciler_seat_save_errors_total",
        "Total number of seat saves that failed"
    );
}

/// Crawl dispatcher metrics recorder.
pub struct DispatcherMetrics;

impl DispatcherMetrics {
    /// Record published events.
    pub fn record_published(count: usize) {
        counter!("dispatcher_events_published_total").increment(count as u64);
    }

    /// Record failed publishes.
    pub fn record_publish_errors(count: usize) {
        counter!("dispatcher_publish_errors_total").increment(count as u64);
    }

    /// Record an aborted run.
    pub fn record_aborted() {
        counter!("dispatcher_runs_aborted_total").increment(1);
    }
}

/// Vacancy reconciler metrics recorder.
pub struct ReconcilerMetrics;

impl ReconcilerMetrics {
    /// Record a reconciled record and what it did to the seat store.
    pub fn record_reconciled(persisted: usize, skipped: usize, save_errors: usize) {
        counter!("reconciler_records_processed_total").increment(1);
        counter!("reconciler_seats_persisted_total").increment(persisted as u64);
        counter!("reconciler_seats_skipped_total").increment(skipped as u64);
        counter!("reconciler_seat_save_errors_total").increment(save_errors as u64);
    }

    /// Record an abandoned record.
    pub fn record_failed() {
        counter!("reconciler_records_failed_total").increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[tokio::test]
    async fn test_pipeline_metrics_render() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        server.start().unwrap();

        DispatcherMetrics::record_published(2);
        DispatcherMetrics::record_aborted();
        ReconcilerMetrics::record_reconciled(2, 1, 0);
        ReconcilerMetrics::record_failed();

        // handle is None if another test installed the recorder first
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("dispatcher_events_published_total"));
            assert!(rendered.contains("reconciler_seats_persisted_total"));
            assert!(rendered.contains("reconciler_records_failed_total"));
        }
    }
}
