//! In-memory crawl-result and seat stores
//!
//! Both count their reads and writes so tests can assert on repository
//! traffic (a `REMOVE` record must cause none).

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only follows a panicking test

use seatwatch_core::crawling::CrawlingResult;
use seatwatch_core::performance::SessionKey;
use seatwatch_core::repository::{
    CrawlingResultRepository, RepositoryError, Result, SeatRepository,
};
use seatwatch_core::seat::{Seat, VacantSeatInfo};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// HashMap-backed crawl-result store.
///
/// # Example
///
/// ```
/// use seatwatch_testing::InMemoryCrawlingResultRepository;
///
/// let store = InMemoryCrawlingResultRepository::new();
/// assert_eq!(store.reads(), 0);
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryCrawlingResultRepository {
    results: Arc<RwLock<HashMap<SessionKey, CrawlingResult>>>,
    failing_keys: Arc<RwLock<HashSet<SessionKey>>>,
    reads: Arc<AtomicUsize>,
}

impl InMemoryCrawlingResultRepository {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `result` under its session key, replacing any previous one
    pub fn insert(&self, result: CrawlingResult) {
        self.results
            .write()
            .unwrap()
            .insert(result.session_key(), result);
    }

    /// Make reads of `key` fail
    pub fn fail_reads_for(&self, key: &SessionKey) {
        self.failing_keys.write().unwrap().insert(key.clone());
    }

    /// Number of `find_by_key` calls
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl CrawlingResultRepository for InMemoryCrawlingResultRepository {
    fn find_by_key<'a>(
        &'a self,
        key: &'a SessionKey,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CrawlingResult>>> + Send + 'a>> {
        Box::pin(async move {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.failing_keys.read().unwrap().contains(key) {
                return Err(RepositoryError::ReadFailed {
                    key: key.clone(),
                    reason: "crawl-result store unavailable".to_string(),
                });
            }
            Ok(self.results.read().unwrap().get(key).cloned())
        })
    }
}

/// HashMap-backed seat store, partitioned by session key.
///
/// Saves against a seat registered with
/// [`fail_saves_for`](Self::fail_saves_for) are rejected.
#[derive(Clone, Debug, Default)]
pub struct InMemorySeatRepository {
    seats: Arc<RwLock<HashMap<SessionKey, Vec<Seat>>>>,
    failing_seats: Arc<RwLock<HashSet<VacantSeatInfo>>>,
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
}

impl InMemorySeatRepository {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload `seat` without counting it as a write
    pub fn insert(&self, seat: Seat) {
        self.seats
            .write()
            .unwrap()
            .entry(seat.session_key())
            .or_default()
            .push(seat);
    }

    /// Reject every save of `seat_info`
    pub fn fail_saves_for(&self, seat_info: VacantSeatInfo) {
        self.failing_seats.write().unwrap().insert(seat_info);
    }

    /// Seats stored for `key`, in save order
    #[must_use]
    pub fn seats_for(&self, key: &SessionKey) -> Vec<Seat> {
        self.seats
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of stored seats
    #[must_use]
    pub fn len(&self) -> usize {
        self.seats.read().unwrap().values().map(Vec::len).sum()
    }

    /// Whether no seat is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `find_by_key` calls
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `save` calls, accepted or not
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl SeatRepository for InMemorySeatRepository {
    fn find_by_key<'a>(
        &'a self,
        key: &'a SessionKey,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Seat>>> + Send + 'a>> {
        Box::pin(async move {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.seats_for(key))
        })
    }

    fn save<'a>(
        &'a self,
        seat: &'a Seat,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.writes.fetch_add(1, Ordering::SeqCst);
            // Let sibling saves interleave
            tokio::task::yield_now().await;

            if self.failing_seats.read().unwrap().contains(&seat.seat_info) {
                return Err(RepositoryError::WriteFailed {
                    key: seat.session_key(),
                    reason: format!("seat {} rejected", seat.seat_info),
                });
            }
            self.insert(seat.clone());
            Ok(())
        })
    }
}
