//! Seatwatch demo
//!
//! Runs both pipelines against in-memory collaborators seeded with one
//! performance, so the whole flow is visible in the logs without any
//! infrastructure:
//!
//! 1. The schedule dispatches `AssignCrawling` events for the configured
//!    worklist
//! 2. A scripted change-stream batch announces a crawl result
//! 3. The reconciler persists the seats that were not known yet
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=debug cargo run --bin demo
//! ```

use seatwatch_runtime::metrics::MetricsServer;
use seatwatch_service::{Collaborators, Config, SeatwatchApp};
use seatwatch_testing::fixtures::{crawling_result, insert_record, known_seat, seat_info, session_key};
use seatwatch_testing::{
    InMemoryChangeStream, InMemoryCrawlingResultRepository, InMemoryEventBus,
    InMemorySeatRepository, StubCrawlingGateway,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,seatwatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Seatwatch demo...");

    let config = Config::from_env()?;
    tracing::info!(
        performances = config.dispatch.tracked_performances.len(),
        topic = %config.dispatch.assign_crawling_topic,
        interval_secs = config.dispatch.interval_secs,
        "Configuration loaded"
    );

    let mut metrics = MetricsServer::new(config.metrics_addr().parse()?);
    if config.server.metrics_enabled {
        metrics.start()?;
    }

    // Seed the in-memory world: one session with three vacant seats, one
    // of which is already known
    let key = session_key("1011", "2024-05-01", "matinee");
    let mut crawler = StubCrawlingGateway::new();
    for tracked in &config.dispatch.tracked_performances {
        crawler = crawler.with_sub_periods(
            tracked.performance_code.as_str(),
            tracked.period_qualifier.as_str(),
            &["2024-05", "2024-06"],
        );
    }
    let event_bus = InMemoryEventBus::new();
    let crawling_results = InMemoryCrawlingResultRepository::new();
    crawling_results.insert(crawling_result(
        &key,
        &[("S", "A", "1"), ("S", "A", "2"), ("S", "B", "3")],
    ));
    let seats = InMemorySeatRepository::new();
    seats.insert(known_seat(&key, seat_info("S", "A", "1"), 1_714_500_000));
    let change_stream =
        InMemoryChangeStream::new().then_deliver(vec![vec![insert_record(&key, 1_714_550_400)]]);

    let app = SeatwatchApp::new(
        config,
        Collaborators {
            crawler: Arc::new(crawler),
            event_bus: Arc::new(event_bus.clone()),
            crawling_results: Arc::new(crawling_results),
            seats: Arc::new(seats.clone()),
            change_stream: Arc::new(change_stream),
        },
    );
    let running = app.start();

    tracing::info!("Seatwatch demo is running! Press Ctrl+C to shutdown");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down gracefully...");
    let summary = running.shutdown().await?;

    tracing::info!(
        dispatch_runs = summary.dispatch_runs,
        batches = summary.batches_reconciled,
        events_published = event_bus.len(),
        seats_known = seats.seats_for(&key).len(),
        "Demo finished"
    );
    for seat in seats.seats_for(&key) {
        tracing::info!(seat = %seat.seat_info, detected_at = %seat.detected_at, "Vacant seat");
    }
    if let Some(rendered) = metrics.render() {
        tracing::debug!(metrics = %rendered, "Final metrics");
    }
    Ok(())
}
