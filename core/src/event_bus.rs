//! Event bus abstraction for handing crawl jobs to the crawler.
//!
//! The dispatcher publishes one `AssignCrawling` event per sub-period to a
//! topic; the crawler fleet consumes that topic. Transport (Kafka-compatible
//! broker, cloud event router) is an implementation detail behind
//! [`EventBus`].
//!
//! ```text
//! ┌──────────────────┐   AssignCrawling   ┌───────────┐
//! │ Crawl Dispatcher │ ─────────────────► │ Event Bus │ ──► crawler
//! └──────────────────┘   (per sub-period) └───────────┘
//! ```
//!
//! # Key Principles
//!
//! - **At-least-once delivery**: a failed dispatch run is simply retried on
//!   the next trigger, so the crawler may see the same job twice
//! - **Idempotency**: the crawler overwrites its result for a session, and
//!   the reconciler deduplicates seats, so duplicates are harmless
//!
//! # Implementations
//!
//! - `InMemoryEventBus` in `seatwatch-testing`: records every publish

use crate::event::SerializedEvent;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Topic not found or invalid
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Trait for event bus implementations.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: the dispatcher publishes all jobs
/// of a performance concurrently through one shared instance.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn` so the
/// bus can be held as `Arc<dyn EventBus>`.
pub trait EventBus: Send + Sync {
    /// Publish an event to a topic.
    ///
    /// Once the returned future resolves `Ok`, the bus owns delivery.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the publish operation fails.
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;
}
