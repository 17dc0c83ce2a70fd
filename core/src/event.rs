//! Event trait and wire envelope.
//!
//! Events leaving this workspace (today only [`AssignCrawling`]) are
//! serialized with `bincode` and wrapped in a [`SerializedEvent`] that
//! carries the versioned type name next to the bytes, so a consumer can
//! route on the type before decoding.
//!
//! # Example
//!
//! ```
//! use seatwatch_core::event::{Event, SerializedEvent};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! struct CrawlRequested {
//!     performance_code: String,
//! }
//!
//! impl Event for CrawlRequested {
//!     fn event_type(&self) -> &'static str {
//!         "CrawlRequested.v1"
//!     }
//! }
//!
//! let event = CrawlRequested { performance_code: "1011".to_string() };
//! let serialized = SerializedEvent::from_event(&event, None).unwrap();
//! assert_eq!(serialized.event_type, "CrawlRequested.v1");
//! ```
//!
//! [`AssignCrawling`]: crate::crawling::AssignCrawling

use serde::{Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

/// Error types for event operations.
#[derive(Error, Debug, Clone)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),
}

/// An event published to the event bus.
///
/// `event_type()` returns a stable, versioned identifier such as
/// `"AssignCrawling.v1"`. Bump the suffix when the payload changes shape.
pub trait Event: Send + Sync + 'static {
    /// Versioned type identifier of this event.
    fn event_type(&self) -> &'static str;

    /// Serialize this event to bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        bincode::serialize(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Deserialize an event from bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the bytes are corrupted,
    /// belong to another event type, or fail value validation.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        bincode::deserialize(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// A serialized event ready for the bus.
#[derive(Clone, Debug)]
pub struct SerializedEvent {
    /// The event type identifier (e.g., "AssignCrawling.v1").
    pub event_type: String,

    /// The bincode-serialized event data.
    pub data: Vec<u8>,

    /// Optional JSON metadata.
    ///
    /// The dispatcher sets `source` and `dispatched_at`.
    pub metadata: Option<serde_json::Value>,
}

impl SerializedEvent {
    /// Create a new serialized event.
    #[must_use]
    pub const fn new(
        event_type: String,
        data: Vec<u8>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_type,
            data,
            metadata,
        }
    }

    /// Serialize `event` and wrap it with its type name.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    pub fn from_event<E: Event + Serialize>(
        event: &E,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            data: event.to_bytes()?,
            metadata,
        })
    }

    /// Decode the payload as `E`.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the payload does not
    /// decode as `E`.
    pub fn decode<E: Event + DeserializeOwned>(&self) -> Result<E, EventError> {
        E::from_bytes(&self.data)
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SerializedEvent {{ type: {}, size: {} bytes }}",
            self.event_type,
            self.data.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawling::AssignCrawling;
    use crate::performance::{PerformanceCode, PeriodQualifier, SubPeriod};

    #[allow(clippy::unwrap_used)]
    fn assign(sub_period: &str) -> AssignCrawling {
        AssignCrawling {
            performance_code: PerformanceCode::create("1013").unwrap(),
            sub_period: SubPeriod::create(sub_period).unwrap(),
            period_qualifier: PeriodQualifier::create("14").unwrap(),
        }
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if serialization fails
    fn serialized_event_carries_type_and_metadata() {
        let metadata = serde_json::json!({ "source": "crawl-dispatcher" });

        let serialized = SerializedEvent::from_event(&assign("2024-07"), Some(metadata.clone()))
            .expect("serialization should succeed");

        assert_eq!(serialized.event_type, "AssignCrawling.v1");
        assert!(!serialized.data.is_empty());
        assert_eq!(serialized.metadata, Some(metadata));

        let decoded: AssignCrawling = serialized.decode().expect("payload should decode");
        assert_eq!(decoded, assign("2024-07"));
    }

    #[test]
    fn garbage_payload_fails_to_decode() {
        let serialized = SerializedEvent::new("AssignCrawling.v1".to_string(), vec![0xff], None);
        assert!(matches!(
            serialized.decode::<AssignCrawling>(),
            Err(EventError::DeserializationError(_))
        ));
    }

    #[test]
    fn serialized_event_display() {
        let serialized =
            SerializedEvent::new("AssignCrawling.v1".to_string(), vec![1, 2, 3, 4, 5], None);

        let display = format!("{serialized}");
        assert!(display.contains("AssignCrawling.v1"));
        assert!(display.contains("5 bytes"));
    }
}
