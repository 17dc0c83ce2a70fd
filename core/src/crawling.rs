//! Crawling vocabulary and the crawler gateway.
//!
//! The crawler itself (the box-office scraper) lives outside this workspace.
//! This module owns what flows to and from it:
//!
//! - [`TrackedPerformance`]: one worklist entry, supplied by configuration
//! - [`CrawlJobDescriptor`]: one unit of crawl work, one per sub-period
//! - [`AssignCrawling`]: the event that hands a job to the crawler
//! - [`CrawlingResult`]: what a finished crawl stored for one session
//! - [`CrawlingGateway`]: session acquisition and sub-period enumeration

use crate::event::Event;
use crate::performance::{
    PerformanceCode, PerformanceDate, PerformanceId, PerformanceName, PerformanceStartTime,
    PeriodQualifier, SessionKey, SessionSlot, SubPeriod,
};
use crate::seat::VacantSeatInfoList;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from the crawler gateway.
#[derive(Error, Debug, Clone)]
pub enum CrawlingError {
    /// The box-office site did not hand out a session
    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),

    /// Sub-period listing failed for a performance
    #[error("Failed to list sub-periods for performance '{performance_code}': {reason}")]
    ListingFailed {
        /// The performance being enumerated
        performance_code: PerformanceCode,
        /// The reason for failure
        reason: String,
    },

    /// Network or transport error
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Handle on a box-office browsing session.
///
/// Opaque to this workspace: obtained from [`CrawlingGateway::acquire_session`]
/// and passed back to it unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    token: String,
}

impl Session {
    /// Wrap a gateway-issued session token
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// The gateway-issued token
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// A performance the dispatcher keeps crawling.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedPerformance {
    /// Performance to crawl
    pub performance_code: PerformanceCode,
    /// Booking period to crawl it under
    pub period_qualifier: PeriodQualifier,
}

impl TrackedPerformance {
    /// Create a worklist entry
    #[must_use]
    pub const fn new(performance_code: PerformanceCode, period_qualifier: PeriodQualifier) -> Self {
        Self {
            performance_code,
            period_qualifier,
        }
    }

    /// One job per sub-period of this performance
    #[must_use]
    pub fn jobs(&self, sub_periods: Vec<SubPeriod>) -> Vec<CrawlJobDescriptor> {
        sub_periods
            .into_iter()
            .map(|sub_period| CrawlJobDescriptor {
                performance_code: self.performance_code.clone(),
                period_qualifier: self.period_qualifier.clone(),
                sub_period,
            })
            .collect()
    }
}

/// One unit of crawl work. Lives for a single dispatch cycle.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CrawlJobDescriptor {
    /// Performance to crawl
    pub performance_code: PerformanceCode,
    /// Booking period
    pub period_qualifier: PeriodQualifier,
    /// Calendar slice to crawl
    pub sub_period: SubPeriod,
}

impl CrawlJobDescriptor {
    /// The event announcing this job to the crawler
    #[must_use]
    pub fn to_event(&self) -> AssignCrawling {
        AssignCrawling {
            performance_code: self.performance_code.clone(),
            sub_period: self.sub_period.clone(),
            period_qualifier: self.period_qualifier.clone(),
        }
    }
}

/// Event payload asking the crawler to crawl one sub-period.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignCrawling {
    /// Performance to crawl
    pub performance_code: PerformanceCode,
    /// Calendar slice to crawl (e.g. `"2024-05"`)
    pub sub_period: SubPeriod,
    /// Booking period
    pub period_qualifier: PeriodQualifier,
}

impl AssignCrawling {
    /// Wire name of this event type
    pub const EVENT_TYPE: &'static str = "AssignCrawling.v1";
}

impl Event for AssignCrawling {
    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }
}

/// What one crawl run stored for one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlingResult {
    /// Box-office internal id
    pub performance_id: PerformanceId,
    /// Performance code
    pub performance_code: PerformanceCode,
    /// Performance title
    pub performance_name: PerformanceName,
    /// Session date
    pub performance_date: PerformanceDate,
    /// Matinee or soiree
    pub session_slot: SessionSlot,
    /// Curtain-up time
    pub performance_start_time: PerformanceStartTime,
    /// Seats the crawl found vacant, in crawler order
    pub vacant_seats: VacantSeatInfoList,
}

impl CrawlingResult {
    /// Store key of the crawled session
    #[must_use]
    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(
            self.performance_code.clone(),
            self.performance_date,
            self.session_slot,
        )
    }
}

/// Gateway to the box-office crawler.
///
/// # Dyn Compatibility
///
/// Returns `Pin<Box<dyn Future>>` so pipelines can hold the gateway as
/// `Arc<dyn CrawlingGateway>`.
pub trait CrawlingGateway: Send + Sync {
    /// Obtain a session for subsequent queries.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlingError::SessionUnavailable`] or
    /// [`CrawlingError::Transport`] when no session can be obtained.
    fn acquire_session(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Session, CrawlingError>> + Send + '_>>;

    /// List every sub-period reachable for `performance_code` under
    /// `period_qualifier`, in site order.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlingError::ListingFailed`] or
    /// [`CrawlingError::Transport`] if the listing cannot be fetched.
    fn list_sub_periods<'a>(
        &'a self,
        session: &'a Session,
        performance_code: &'a PerformanceCode,
        period_qualifier: &'a PeriodQualifier,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SubPeriod>, CrawlingError>> + Send + 'a>>;
}
