//! Seat vacancy model.
//!
//! A [`VacantSeatInfo`] is the identity of a physical seat as the crawler
//! reports it. A [`Seat`] is the persisted fact "this seat was first seen
//! vacant at this time". Seats are created by the reconciler and never
//! mutated.
//!
//! # Deduplication
//!
//! Whether a reported vacancy is new is decided by [`is_already_vacant`]:
//! structural equality of the seat identity (section, row, number). The
//! detection time is not part of the comparison: a seat that stays vacant
//! across many crawls is stored once.

use crate::crawling::CrawlingResult;
use crate::performance::{
    PerformanceCode, PerformanceDate, PerformanceId, PerformanceName, PerformanceStartTime,
    SessionKey, SessionSlot, ValueError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one seat within a session's seating plan.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VacantSeatInfo {
    section: String,
    row: String,
    number: String,
}

impl VacantSeatInfo {
    /// Create a seat identity.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::EmptyField`] if any of the three parts is blank.
    pub fn create(
        section: impl Into<String>,
        row: impl Into<String>,
        number: impl Into<String>,
    ) -> Result<Self, ValueError> {
        let section = section.into();
        let row = row.into();
        let number = number.into();

        if section.trim().is_empty() {
            return Err(ValueError::EmptyField("seat section"));
        }
        if row.trim().is_empty() {
            return Err(ValueError::EmptyField("seat row"));
        }
        if number.trim().is_empty() {
            return Err(ValueError::EmptyField("seat number"));
        }

        Ok(Self {
            section,
            row,
            number,
        })
    }

    /// Seating section (e.g. `"S1"`)
    #[must_use]
    pub fn section(&self) -> &str {
        &self.section
    }

    /// Row label
    #[must_use]
    pub fn row(&self) -> &str {
        &self.row
    }

    /// Seat number within the row
    #[must_use]
    pub fn number(&self) -> &str {
        &self.number
    }

    /// Whether both values describe the same physical seat.
    #[must_use]
    pub fn is_same_seat(&self, other: &Self) -> bool {
        self == other
    }
}

impl fmt::Display for VacantSeatInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}-{}", self.section, self.row, self.number)
    }
}

/// Ordered list of vacant seats reported by one crawl.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VacantSeatInfoList(Vec<VacantSeatInfo>);

impl VacantSeatInfoList {
    /// Wrap a list of seat identities, keeping crawler order
    #[must_use]
    pub const fn new(list: Vec<VacantSeatInfo>) -> Self {
        Self(list)
    }

    /// The seats in crawler order
    #[must_use]
    pub fn list(&self) -> &[VacantSeatInfo] {
        &self.0
    }

    /// Number of reported seats
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the crawl found no vacancy
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the seats in crawler order
    pub fn iter(&self) -> std::slice::Iter<'_, VacantSeatInfo> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a VacantSeatInfoList {
    type Item = &'a VacantSeatInfo;
    type IntoIter = std::slice::Iter<'a, VacantSeatInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<VacantSeatInfo> for VacantSeatInfoList {
    fn from_iter<I: IntoIterator<Item = VacantSeatInfo>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// When a vacancy was detected.
///
/// Derived from the commit time of the change-stream record that announced
/// the crawl result, not from the clock of the process handling it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DetectionDatetime(DateTime<Utc>);

impl DetectionDatetime {
    /// Build from seconds since the Unix epoch.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::TimestampOutOfRange`] if chrono cannot represent
    /// the instant.
    pub fn from_unix_time(seconds: i64) -> Result<Self, ValueError> {
        DateTime::from_timestamp(seconds, 0)
            .map(Self)
            .ok_or(ValueError::TimestampOutOfRange(seconds))
    }

    /// The detection instant
    #[must_use]
    pub const fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Seconds since the Unix epoch
    #[must_use]
    pub fn unix_time(&self) -> i64 {
        self.0.timestamp()
    }
}

impl fmt::Display for DetectionDatetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

/// A seat observed vacant, as persisted in the seat store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    /// Box-office internal id of the performance
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
    /// Which seat
    pub seat_info: VacantSeatInfo,
    /// First detection of this vacancy
    pub detected_at: DetectionDatetime,
}

impl Seat {
    /// Record `seat_info` from `result` as vacant since `detected_at`.
    ///
    /// Performance identity fields are copied from the crawl result.
    #[must_use]
    pub fn detected_in(
        result: &CrawlingResult,
        seat_info: VacantSeatInfo,
        detected_at: DetectionDatetime,
    ) -> Self {
        Self {
            performance_id: result.performance_id.clone(),
            performance_code: result.performance_code.clone(),
            performance_name: result.performance_name.clone(),
            performance_date: result.performance_date,
            session_slot: result.session_slot,
            performance_start_time: result.performance_start_time,
            seat_info,
            detected_at,
        }
    }

    /// Store key of the session this seat belongs to
    #[must_use]
    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(
            self.performance_code.clone(),
            self.performance_date,
            self.session_slot,
        )
    }
}

/// Whether `candidate` is already among the known vacant `snapshot`.
///
/// Compares seat identity only; detection times are ignored.
#[must_use]
pub fn is_already_vacant(candidate: &VacantSeatInfo, snapshot: &[Seat]) -> bool {
    snapshot
        .iter()
        .any(|known| candidate.is_same_seat(&known.seat_info))
}

/// Seats from `result` that are not yet in `snapshot`, stamped `detected_at`.
///
/// The snapshot is consulted as given: two equal entries inside `result`
/// itself are both returned.
#[must_use]
pub fn new_vacancies(
    result: &CrawlingResult,
    snapshot: &[Seat],
    detected_at: DetectionDatetime,
) -> Vec<Seat> {
    result
        .vacant_seats
        .iter()
        .filter(|info| !is_already_vacant(info, snapshot))
        .map(|info| Seat::detected_in(result, info.clone(), detected_at))
        .collect()
}
