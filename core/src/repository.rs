//! Storage seams for crawl results and seats.
//!
//! Both stores are partitioned by [`SessionKey`]. The crawl-result store is
//! written by the crawler and only read here; the seat store is append-only
//! from this workspace's point of view (no update, no delete).

use crate::crawling::CrawlingResult;
use crate::performance::SessionKey;
use crate::seat::Seat;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from the storage backends.
#[derive(Error, Debug, Clone)]
pub enum RepositoryError {
    /// A query failed
    #[error("Read failed for {key}: {reason}")]
    ReadFailed {
        /// The session key being read
        key: SessionKey,
        /// The reason for failure
        reason: String,
    },

    /// A write failed
    #[error("Write failed for {key}: {reason}")]
    WriteFailed {
        /// The session key being written
        key: SessionKey,
        /// The reason for failure
        reason: String,
    },

    /// A stored item could not be decoded into the domain model
    #[error("Corrupt item for {key}: {reason}")]
    Corrupt {
        /// The session key of the item
        key: SessionKey,
        /// What failed to decode
        reason: String,
    },
}

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Read access to the crawl results stored by the crawler.
pub trait CrawlingResultRepository: Send + Sync {
    /// The latest crawl result for `key`, if the crawler stored one.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::ReadFailed`] if the store cannot be queried.
    fn find_by_key<'a>(
        &'a self,
        key: &'a SessionKey,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CrawlingResult>>> + Send + 'a>>;
}

/// The store of detected vacant seats.
pub trait SeatRepository: Send + Sync {
    /// Every seat already recorded for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::ReadFailed`] if the store cannot be queried.
    fn find_by_key<'a>(
        &'a self,
        key: &'a SessionKey,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Seat>>> + Send + 'a>>;

    /// Persist one newly detected seat.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::WriteFailed`] if the write is rejected.
    fn save<'a>(&'a self, seat: &'a Seat)
    -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}
