//! # Seatwatch Testing
//!
//! Testing utilities for the Seatwatch pipelines.
//!
//! This crate provides:
//! - In-memory implementations of every collaborator trait
//!   ([`mocks`], [`repository_mocks`])
//! - Fixtures for the domain values tests keep building ([`fixtures`])
//! - A tracing subscriber that writes through the test harness
//!
//! ## Example
//!
//! ```ignore
//! use seatwatch_testing::fixtures::{crawling_result, insert_record, session_key};
//! use seatwatch_testing::{InMemoryCrawlingResultRepository, InMemorySeatRepository};
//!
//! #[tokio::test]
//! async fn persists_new_vacancies() {
//!     let key = session_key("1011", "2024-05-01", "matinee");
//!     let results = InMemoryCrawlingResultRepository::new();
//!     results.insert(crawling_result(&key, &[("S", "A", "1")]));
//!     let seats = InMemorySeatRepository::new();
//!
//!     let reconciler = VacancyReconciler::new(Arc::new(results), Arc::new(seats.clone()));
//!     reconciler.reconcile(&[insert_record(&key, 1_714_550_400)]).await;
//!
//!     assert_eq!(seats.len(), 1);
//! }
//! ```

/// In-memory crawler, event bus and change stream
pub mod mocks;

/// In-memory crawl-result and seat stores
pub mod repository_mocks;

/// Builders for domain values.
///
/// Every builder panics on invalid input; they are meant for literals in
/// tests.
#[allow(clippy::unwrap_used)]
#[allow(clippy::missing_panics_doc)]
pub mod fixtures {
    use seatwatch_core::change_stream::{ChangeKind, ChangeStreamRecord};
    use seatwatch_core::crawling::{CrawlingResult, TrackedPerformance};
    use seatwatch_core::performance::{
        PerformanceCode, PerformanceDate, PerformanceId, PerformanceName, PerformanceStartTime,
        PeriodQualifier, SessionKey, SessionSlot,
    };
    use seatwatch_core::seat::{DetectionDatetime, Seat, VacantSeatInfo, VacantSeatInfoList};

    /// `code`/`date`/`slot` as a session key
    #[must_use]
    pub fn session_key(code: &str, date: &str, slot: &str) -> SessionKey {
        SessionKey::new(
            PerformanceCode::create(code).unwrap(),
            PerformanceDate::create(date).unwrap(),
            slot.parse::<SessionSlot>().unwrap(),
        )
    }

    /// A seat identity
    #[must_use]
    pub fn seat_info(section: &str, row: &str, number: &str) -> VacantSeatInfo {
        VacantSeatInfo::create(section, row, number).unwrap()
    }

    /// A tracked performance
    #[must_use]
    pub fn tracked(code: &str, qualifier: &str) -> TrackedPerformance {
        TrackedPerformance::new(
            PerformanceCode::create(code).unwrap(),
            PeriodQualifier::create(qualifier).unwrap(),
        )
    }

    /// A crawl result for `key` reporting `vacant` as `(section, row, number)`
    #[must_use]
    pub fn crawling_result(key: &SessionKey, vacant: &[(&str, &str, &str)]) -> CrawlingResult {
        CrawlingResult {
            performance_id: PerformanceId::create(format!("P-{}", key.performance_code)).unwrap(),
            performance_code: key.performance_code.clone(),
            performance_name: PerformanceName::create("Les Misérables").unwrap(),
            performance_date: key.performance_date,
            session_slot: key.session_slot,
            performance_start_time: PerformanceStartTime::create(match key.session_slot {
                SessionSlot::Matinee => "14:00",
                SessionSlot::Soiree => "19:30",
            })
            .unwrap(),
            vacant_seats: vacant
                .iter()
                .map(|(section, row, number)| seat_info(section, row, number))
                .collect::<VacantSeatInfoList>(),
        }
    }

    /// A seat already known vacant for `key`
    #[must_use]
    pub fn known_seat(key: &SessionKey, info: VacantSeatInfo, detected_at: i64) -> Seat {
        Seat::detected_in(
            &crawling_result(key, &[]),
            info,
            DetectionDatetime::from_unix_time(detected_at).unwrap(),
        )
    }

    /// A well-formed `INSERT` record for `key` committed at `committed_at`
    #[must_use]
    pub fn insert_record(key: &SessionKey, committed_at: i64) -> ChangeStreamRecord {
        ChangeStreamRecord::for_key(ChangeKind::Insert, key, committed_at)
    }

    /// A `REMOVE` record for `key`
    #[must_use]
    pub fn remove_record(key: &SessionKey, committed_at: i64) -> ChangeStreamRecord {
        ChangeStreamRecord::for_key(ChangeKind::Remove, key, committed_at)
    }
}

/// Install a `tracing` subscriber writing through the test harness.
///
/// Safe to call from every test; only the first call installs. Honours
/// `RUST_LOG`, defaulting to `debug`.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

pub use mocks::{InMemoryChangeStream, InMemoryEventBus, ScriptedSubscription, StubCrawlingGateway};
pub use repository_mocks::{InMemoryCrawlingResultRepository, InMemorySeatRepository};
