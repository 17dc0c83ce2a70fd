//! # Seatwatch Core
//!
//! Domain types and collaborator traits for seat vacancy tracking.
//!
//! Seatwatch follows seat availability for ticketed performances with two
//! pipelines that share the vocabulary defined here:
//!
//! ```text
//! Crawl Dispatcher ──AssignCrawling──► Event Bus ──► crawler
//!                                                      │
//!                                                      ▼
//!          Seat store ◄── Vacancy Reconciler ◄── change stream ◄── crawl-result store
//! ```
//!
//! ## Modules
//!
//! - [`performance`]: performance identity value objects and [`SessionKey`]
//! - [`seat`]: seat identity, detected seats and the deduplication predicate
//! - [`crawling`]: worklist entries, crawl jobs, crawl results, crawler gateway
//! - [`change_stream`]: raw stream records and their strict parse step
//! - [`event`], [`event_bus`]: event envelope and the bus that carries it
//! - [`repository`]: crawl-result and seat storage seams
//!
//! Every external system sits behind a `Send + Sync` trait returning boxed
//! futures, so pipelines hold them as `Arc<dyn Trait>` and tests swap in the
//! in-memory versions from `seatwatch-testing`.

pub mod change_stream;
pub mod crawling;
pub mod event;
pub mod event_bus;
pub mod performance;
pub mod repository;
pub mod seat;

// Re-export commonly used types
pub use change_stream::{ChangeKind, ChangeStreamRecord, CrawlResultChanged, RecordParseError};
pub use crawling::{
    AssignCrawling, CrawlJobDescriptor, CrawlingGateway, CrawlingResult, Session,
    TrackedPerformance,
};
pub use performance::{
    PerformanceCode, PerformanceDate, PerformanceId, PerformanceName, PerformanceStartTime,
    PeriodQualifier, SessionKey, SessionSlot, SubPeriod, ValueError,
};
pub use seat::{DetectionDatetime, Seat, VacantSeatInfo, VacantSeatInfoList};
