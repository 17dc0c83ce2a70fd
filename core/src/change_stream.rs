//! Change-stream records announcing written crawl results.
//!
//! Every write to the crawl-result store produces a record on the store's
//! change stream. Records arrive loosely typed (an attribute map in the
//! DynamoDB-stream JSON shape); [`ChangeStreamRecord::parse`] is the single
//! strict step that turns one into a [`CrawlResultChanged`] notification or a
//! named [`RecordParseError`]. Nothing downstream touches the raw attributes.
//!
//! ```json
//! {
//!   "eventName": "INSERT",
//!   "dynamodb": {
//!     "ApproximateCreationDateTime": 1714521600,
//!     "NewImage": {
//!       "performanceCode": { "S": "1011" },
//!       "performanceDate": { "S": "2024-05-01" },
//!       "matineeOrSoiree": { "S": "matinee" }
//!     }
//!   }
//! }
//! ```

use crate::performance::{PerformanceCode, PerformanceDate, SessionKey, SessionSlot, ValueError};
use crate::seat::DetectionDatetime;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Why a change-stream record could not become a notification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordParseError {
    /// `performanceCode` attribute absent
    #[error("Performance code not given")]
    PerformanceCodeMissing,

    /// `performanceDate` attribute absent
    #[error("Performance date not given")]
    PerformanceDateMissing,

    /// `matineeOrSoiree` attribute absent
    #[error("Session slot (matinee or soiree) not given")]
    SessionSlotMissing,

    /// Commit time absent or not an integer
    #[error("Invalid or missing commit timestamp")]
    InvalidTimestamp,

    /// An attribute is present but not a valid value
    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Kind of write a record describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// New item
    Insert,
    /// Overwritten item
    Modify,
    /// Deleted item
    Remove,
    /// Anything the stream may add later
    Unknown,
}

impl ChangeKind {
    /// Wire name used in `eventName`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Modify => "MODIFY",
            Self::Remove => "REMOVE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// One typed attribute of a stream image. Only string and number attributes
/// are read; other attribute types deserialize as empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    /// String attribute
    #[serde(rename = "S", default, skip_serializing_if = "Option::is_none")]
    pub s: Option<String>,

    /// Number attribute, as its decimal string
    #[serde(rename = "N", default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
}

impl AttributeValue {
    /// A string attribute
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            s: Some(value.into()),
            n: None,
        }
    }
}

/// The `dynamodb` body of a stream record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamRecordBody {
    /// Commit time of the write, seconds since the epoch
    #[serde(
        rename = "ApproximateCreationDateTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub approximate_creation_date_time: Option<serde_json::Number>,

    /// Item image after the write
    #[serde(rename = "NewImage", default, skip_serializing_if = "Option::is_none")]
    pub new_image: Option<HashMap<String, AttributeValue>>,
}

/// A raw change-stream record, as delivered.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeStreamRecord {
    /// `INSERT`, `MODIFY` or `REMOVE`
    #[serde(rename = "eventName", default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,

    /// Record body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamodb: Option<StreamRecordBody>,
}

impl ChangeStreamRecord {
    /// Image attribute holding the performance code
    pub const PERFORMANCE_CODE: &'static str = "performanceCode";
    /// Image attribute holding the performance date
    pub const PERFORMANCE_DATE: &'static str = "performanceDate";
    /// Image attribute holding the session slot
    pub const SESSION_SLOT: &'static str = "matineeOrSoiree";

    /// Build a record from string attributes and an optional commit time.
    #[must_use]
    pub fn new<'a>(
        kind: ChangeKind,
        attributes: impl IntoIterator<Item = (&'a str, &'a str)>,
        committed_at: Option<i64>,
    ) -> Self {
        let new_image = attributes
            .into_iter()
            .map(|(name, value)| (name.to_string(), AttributeValue::string(value)))
            .collect();

        Self {
            event_name: Some(kind.as_str().to_string()),
            dynamodb: Some(StreamRecordBody {
                approximate_creation_date_time: committed_at.map(serde_json::Number::from),
                new_image: Some(new_image),
            }),
        }
    }

    /// Build a well-formed record announcing a write to `key`.
    #[must_use]
    pub fn for_key(kind: ChangeKind, key: &SessionKey, committed_at: i64) -> Self {
        let code = key.performance_code.to_string();
        let date = key.performance_date.to_string();
        Self::new(
            kind,
            [
                (Self::PERFORMANCE_CODE, code.as_str()),
                (Self::PERFORMANCE_DATE, date.as_str()),
                (Self::SESSION_SLOT, key.session_slot.as_str()),
            ],
            Some(committed_at),
        )
    }

    /// Kind of write, from `eventName`
    #[must_use]
    pub fn kind(&self) -> ChangeKind {
        match self.event_name.as_deref() {
            Some("INSERT") => ChangeKind::Insert,
            Some("MODIFY") => ChangeKind::Modify,
            Some("REMOVE") => ChangeKind::Remove,
            _ => ChangeKind::Unknown,
        }
    }

    /// Whether the record describes a deletion
    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.kind() == ChangeKind::Remove
    }

    fn string_attribute(&self, name: &str) -> Option<&str> {
        self.dynamodb
            .as_ref()?
            .new_image
            .as_ref()?
            .get(name)?
            .s
            .as_deref()
    }

    /// Strictly parse this record into a notification.
    ///
    /// Presence is checked first, in the order code, date, slot, commit
    /// time; values are validated afterwards.
    ///
    /// # Errors
    ///
    /// Returns the `*Missing` variant for the first absent attribute,
    /// [`RecordParseError::InvalidTimestamp`] for an absent or non-integer
    /// commit time, and [`RecordParseError::Value`] for an attribute that is
    /// present but invalid.
    pub fn parse(&self) -> Result<CrawlResultChanged, RecordParseError> {
        let code = self
            .string_attribute(Self::PERFORMANCE_CODE)
            .ok_or(RecordParseError::PerformanceCodeMissing)?;
        let date = self
            .string_attribute(Self::PERFORMANCE_DATE)
            .ok_or(RecordParseError::PerformanceDateMissing)?;
        let slot = self
            .string_attribute(Self::SESSION_SLOT)
            .ok_or(RecordParseError::SessionSlotMissing)?;
        let unix_time = self
            .dynamodb
            .as_ref()
            .and_then(|body| body.approximate_creation_date_time.as_ref())
            .and_then(serde_json::Number::as_i64)
            .ok_or(RecordParseError::InvalidTimestamp)?;

        let key = SessionKey::new(
            PerformanceCode::create(code)?,
            PerformanceDate::create(date)?,
            slot.parse::<SessionSlot>()?,
        );

        Ok(CrawlResultChanged {
            key,
            committed_at: DetectionDatetime::from_unix_time(unix_time)?,
        })
    }
}

/// A batch of records as delivered by one trigger (`{"Records": [...]}`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeStreamBatch {
    /// Records in delivery order
    #[serde(rename = "Records", default)]
    pub records: Vec<ChangeStreamRecord>,
}

/// A validated "crawl result written" notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrawlResultChanged {
    /// Session whose crawl result was written
    pub key: SessionKey,
    /// Commit time of the write; becomes the detection time of new seats
    pub committed_at: DetectionDatetime,
}

/// Errors from a change-stream source.
#[derive(Error, Debug, Clone)]
pub enum ChangeStreamError {
    /// Failed to attach to the stream
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    /// A delivered batch could not be decoded
    #[error("Malformed batch: {0}")]
    MalformedBatch(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Stream of record batches from a subscription.
pub type ChangeBatchStream =
    Pin<Box<dyn Stream<Item = Result<Vec<ChangeStreamRecord>, ChangeStreamError>> + Send>>;

/// A source of change-stream batches (the stream transport).
pub trait ChangeStreamSource: Send + Sync {
    /// Attach to the stream.
    ///
    /// Delivery is at-least-once: a batch may be redelivered after a
    /// reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeStreamError::SubscriptionFailed`] if the stream cannot
    /// be attached.
    fn subscribe(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<ChangeBatchStream, ChangeStreamError>> + Send + '_>>;
}
