//! # Seatwatch Runtime
//!
//! The two pipelines and the drivers that keep them running.
//!
//! ## Core Components
//!
//! - **CrawlDispatcher**: fans the tracked-performance worklist out as
//!   `AssignCrawling` events, one per sub-period
//! - **VacancyReconciler**: turns change-stream records into newly persisted
//!   vacant seats
//! - **TaskGroup**: the concurrent, failure-isolating fan-out both pipelines
//!   use
//! - **DispatchSchedule** / **ChangeStreamConsumer**: long-running drivers
//!   with broadcast shutdown
//!
//! ## Example
//!
//! ```ignore
//! use seatwatch_runtime::{CrawlDispatcher, VacancyReconciler};
//!
//! let dispatcher = CrawlDispatcher::new(crawler, event_bus).with_topic("assign-crawling");
//! let report = dispatcher.run(&worklist).await;
//!
//! let reconciler = VacancyReconciler::new(crawling_results, seats);
//! let report = reconciler.reconcile(&batch.records).await;
//! ```

/// Change-stream consumer with reconnection
pub mod consumer;

/// Crawl dispatch pipeline
pub mod dispatcher;

/// Prometheus metrics for observability
pub mod metrics;

/// Vacancy reconciliation pipeline
pub mod reconciler;

/// Periodic dispatch trigger
pub mod schedule;

/// Concurrent fan-out with per-unit failure isolation
pub mod task_group;

pub use consumer::ChangeStreamConsumer;
pub use dispatcher::{CrawlDispatcher, DispatchError, DispatchReport};
pub use reconciler::{ReconcileError, ReconcileReport, VacancyReconciler};
pub use schedule::DispatchSchedule;
pub use task_group::{GroupOutcome, TaskGroup, UnitFailure};
