//! Performance identity value objects.
//!
//! Every type here is validated once, on construction, and is immutable
//! afterwards. Equality is by value. Serde goes through the same validation
//! (`try_from`), so a deserialized value is as trustworthy as a created one.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Validation errors for domain value objects.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// Performance code is empty or contains non-alphanumeric characters
    #[error("Invalid performance code: '{0}'")]
    InvalidPerformanceCode(String),

    /// Performance date is not a `YYYY-MM-DD` calendar date
    #[error("Invalid performance date (expected YYYY-MM-DD): '{0}'")]
    InvalidPerformanceDate(String),

    /// Session slot is neither `matinee` nor `soiree`
    #[error("Invalid session slot (expected 'matinee' or 'soiree'): '{0}'")]
    InvalidSessionSlot(String),

    /// Start time is not an `HH:MM` time of day
    #[error("Invalid performance start time (expected HH:MM): '{0}'")]
    InvalidStartTime(String),

    /// Period qualifier is empty
    #[error("Period qualifier must not be empty")]
    EmptyPeriodQualifier,

    /// Sub-period token is empty
    #[error("Sub-period token must not be empty")]
    EmptySubPeriod,

    /// A required text field is blank
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    /// Unix timestamp cannot be represented as a UTC datetime
    #[error("Unix time out of range: {0}")]
    TimestampOutOfRange(i64),
}

/// Implements the string plumbing shared by the validated string newtypes:
/// accessors, `Display`, and the serde `try_from`/`into` conversions.
macro_rules! string_value {
    ($name:ident) => {
        impl $name {
            /// Borrow the underlying string
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValueError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::create(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

/// Box-office identifier of a performance (e.g. `"1011"`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PerformanceCode(String);

impl PerformanceCode {
    /// Create a performance code.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::InvalidPerformanceCode`] if the code is empty or
    /// contains anything other than ASCII letters and digits.
    pub fn create(code: impl Into<String>) -> Result<Self, ValueError> {
        let code = code.into();
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ValueError::InvalidPerformanceCode(code));
        }
        Ok(Self(code))
    }
}

string_value!(PerformanceCode);

/// Calendar date of one session of a performance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PerformanceDate(NaiveDate);

impl PerformanceDate {
    const FORMAT: &'static str = "%Y-%m-%d";

    /// Parse a `YYYY-MM-DD` date.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::InvalidPerformanceDate`] for anything that is not
    /// a zero-padded, existing calendar date.
    pub fn create(date: impl AsRef<str>) -> Result<Self, ValueError> {
        let raw = date.as_ref();
        // chrono accepts unpadded months and days; the store keys do not
        if raw.len() != 10 {
            return Err(ValueError::InvalidPerformanceDate(raw.to_string()));
        }
        NaiveDate::parse_from_str(raw, Self::FORMAT)
            .map(Self)
            .map_err(|_| ValueError::InvalidPerformanceDate(raw.to_string()))
    }

    /// Wrap an already-valid date
    #[must_use]
    pub const fn from_naive(date: NaiveDate) -> Self {
        Self(date)
    }

    /// The underlying calendar date
    #[must_use]
    pub const fn as_naive(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for PerformanceDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl TryFrom<String> for PerformanceDate {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::create(value)
    }
}

impl From<PerformanceDate> for String {
    fn from(value: PerformanceDate) -> Self {
        value.to_string()
    }
}

/// Which of the same-day performance instances a record pertains to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionSlot {
    /// Afternoon session
    Matinee,
    /// Evening session
    Soiree,
}

impl SessionSlot {
    /// Wire representation (`"matinee"` / `"soiree"`)
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Matinee => "matinee",
            Self::Soiree => "soiree",
        }
    }
}

impl FromStr for SessionSlot {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "matinee" => Ok(Self::Matinee),
            "soiree" => Ok(Self::Soiree),
            other => Err(ValueError::InvalidSessionSlot(other.to_string())),
        }
    }
}

impl fmt::Display for SessionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Box-office internal id of a performance, carried onto every seat.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PerformanceId(String);

impl PerformanceId {
    /// Create a performance id.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::EmptyField`] for a blank id.
    pub fn create(id: impl Into<String>) -> Result<Self, ValueError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValueError::EmptyField("performance id"));
        }
        Ok(Self(id))
    }
}

string_value!(PerformanceId);

/// Human-readable performance title.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PerformanceName(String);

impl PerformanceName {
    /// Create a performance name.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::EmptyField`] for a blank name.
    pub fn create(name: impl Into<String>) -> Result<Self, ValueError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValueError::EmptyField("performance name"));
        }
        Ok(Self(name))
    }
}

string_value!(PerformanceName);

/// Curtain-up time of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PerformanceStartTime(NaiveTime);

impl PerformanceStartTime {
    const FORMAT: &'static str = "%H:%M";

    /// Parse an `HH:MM` time.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::InvalidStartTime`] if the value is not a valid
    /// time of day.
    pub fn create(time: impl AsRef<str>) -> Result<Self, ValueError> {
        let raw = time.as_ref();
        NaiveTime::parse_from_str(raw, Self::FORMAT)
            .map(Self)
            .map_err(|_| ValueError::InvalidStartTime(raw.to_string()))
    }

    /// The underlying time of day
    #[must_use]
    pub const fn as_naive(&self) -> NaiveTime {
        self.0
    }
}

impl fmt::Display for PerformanceStartTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl TryFrom<String> for PerformanceStartTime {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::create(value)
    }
}

impl From<PerformanceStartTime> for String {
    fn from(value: PerformanceStartTime) -> Self {
        value.to_string()
    }
}

/// Selects one booking period of a performance on the box-office site.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeriodQualifier(String);

impl PeriodQualifier {
    /// Create a period qualifier.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::EmptyPeriodQualifier`] for a blank value.
    pub fn create(qualifier: impl Into<String>) -> Result<Self, ValueError> {
        let qualifier = qualifier.into();
        if qualifier.trim().is_empty() {
            return Err(ValueError::EmptyPeriodQualifier);
        }
        Ok(Self(qualifier))
    }
}

string_value!(PeriodQualifier);

/// Crawlable slice of a performance's calendar, typically a year-month.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubPeriod(String);

impl SubPeriod {
    /// Create a sub-period token.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::EmptySubPeriod`] for a blank token.
    pub fn create(token: impl Into<String>) -> Result<Self, ValueError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(ValueError::EmptySubPeriod);
        }
        Ok(Self(token))
    }
}

string_value!(SubPeriod);

/// Identifies one session of a performance: the key both stores are
/// partitioned by.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    /// Performance code
    pub performance_code: PerformanceCode,
    /// Date of the session
    pub performance_date: PerformanceDate,
    /// Matinee or soiree
    pub session_slot: SessionSlot,
}

impl SessionKey {
    /// Build a key from its parts
    #[must_use]
    pub const fn new(
        performance_code: PerformanceCode,
        performance_date: PerformanceDate,
        session_slot: SessionSlot,
    ) -> Self {
        Self {
            performance_code,
            performance_date,
            session_slot,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.performance_code, self.performance_date, self.session_slot
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn performance_code_accepts_alphanumeric() {
        let code = PerformanceCode::create("1011").unwrap();
        assert_eq!(code.as_str(), "1011");
        assert_eq!(code.to_string(), "1011");
    }

    #[test]
    fn performance_code_rejects_blank_and_punctuation() {
        assert!(PerformanceCode::create("").is_err());
        assert!(PerformanceCode::create("10 11").is_err());
        assert_eq!(
            PerformanceCode::create("10/11"),
            Err(ValueError::InvalidPerformanceCode("10/11".to_string()))
        );
    }

    #[test]
    fn performance_date_requires_padded_iso_date() {
        let date = PerformanceDate::create("2024-05-01").unwrap();
        assert_eq!(date.to_string(), "2024-05-01");

        assert!(PerformanceDate::create("2024-5-1").is_err());
        assert!(PerformanceDate::create("2024-02-30").is_err());
        assert!(PerformanceDate::create("01/05/2024").is_err());
    }

    #[test]
    fn session_slot_parses_wire_names() {
        assert_eq!("matinee".parse::<SessionSlot>().unwrap(), SessionSlot::Matinee);
        assert_eq!("soiree".parse::<SessionSlot>().unwrap(), SessionSlot::Soiree);
        assert!("Matinee".parse::<SessionSlot>().is_err());
        assert_eq!(SessionSlot::Soiree.to_string(), "soiree");
    }

    #[test]
    fn start_time_parses_hours_and_minutes() {
        let time = PerformanceStartTime::create("13:30").unwrap();
        assert_eq!(time.to_string(), "13:30");
        assert!(PerformanceStartTime::create("25:00").is_err());
    }

    #[test]
    fn qualifier_and_sub_period_reject_blank() {
        assert_eq!(PeriodQualifier::create("  "), Err(ValueError::EmptyPeriodQualifier));
        assert_eq!(SubPeriod::create(""), Err(ValueError::EmptySubPeriod));
        assert_eq!(SubPeriod::create("2024-05").unwrap().as_str(), "2024-05");
    }

    #[test]
    fn serde_goes_through_validation() {
        let code: PerformanceCode = serde_json::from_str("\"1011\"").unwrap();
        assert_eq!(code.as_str(), "1011");
        assert!(serde_json::from_str::<PerformanceCode>("\"\"").is_err());

        let date: PerformanceDate = serde_json::from_str("\"2024-05-01\"").unwrap();
        assert_eq!(serde_json::to_string(&date).unwrap(), "\"2024-05-01\"");

        let slot: SessionSlot = serde_json::from_str("\"matinee\"").unwrap();
        assert_eq!(slot, SessionSlot::Matinee);
    }

    #[test]
    fn session_key_displays_as_path() {
        let key = SessionKey::new(
            PerformanceCode::create("1011").unwrap(),
            PerformanceDate::create("2024-05-01").unwrap(),
            SessionSlot::Matinee,
        );
        assert_eq!(key.to_string(), "1011/2024-05-01/matinee");
    }
}
