//! Change-stream consumer with automatic reconnection.
//!
//! Subscribes to a [`ChangeStreamSource`] and hands every delivered batch to
//! the [`VacancyReconciler`]:
//!
//! ```text
//! loop {
//!     subscribe:
//!         loop {
//!             next batch ─► reconcile (errors logged, never fatal)
//!             stream error ─► log, keep reading
//!             stream end ─► break
//!         }
//!     wait retry_delay, resubscribe
//! }
//! ```
//!
//! Shutdown is checked while subscribing, between batches and during the
//! retry wait. A batch being reconciled is always finished.

use crate::reconciler::VacancyReconciler;
use futures::StreamExt;
use seatwatch_core::change_stream::{ChangeBatchStream, ChangeStreamSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Wait between a lost subscription and the next attempt unless configured
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Feeds change-stream batches to a [`VacancyReconciler`].
pub struct ChangeStreamConsumer {
    /// Consumer name (for logging)
    name: String,

    source: Arc<dyn ChangeStreamSource>,

    reconciler: Arc<VacancyReconciler>,

    shutdown: broadcast::Receiver<()>,

    retry_delay: Duration,
}

/// Why the batch loop returned.
enum StreamEnd {
    Exhausted,
    Shutdown,
}

impl ChangeStreamConsumer {
    /// Create a consumer with [`DEFAULT_RETRY_DELAY`].
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn ChangeStreamSource>,
        reconciler: Arc<VacancyReconciler>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            reconciler,
            shutdown,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Set custom retry delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Spawn the consumer; the handle resolves to the number of batches
    /// reconciled once shutdown is signalled.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<u64> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(&mut self) -> u64 {
        info!(consumer = %self.name, "Change-stream consumer started");
        let mut batches = 0_u64;

        loop {
            let subscribed = tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Change-stream consumer received shutdown signal");
                    break;
                }
                subscribed = self.source.subscribe() => subscribed,
            };

            match subscribed {
                Ok(mut stream) => {
                    info!(consumer = %self.name, "Subscribed to change stream");
                    if let StreamEnd::Shutdown = self.process_stream(&mut stream, &mut batches).await {
                        break;
                    }
                    warn!(
                        consumer = %self.name,
                        "Change stream ended, reconnecting in {:?}",
                        self.retry_delay
                    );
                }
                Err(e) => {
                    error!(
                        consumer = %self.name,
                        error = %e,
                        "Failed to subscribe to change stream, retrying in {:?}",
                        self.retry_delay
                    );
                }
            }

            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Change-stream consumer received shutdown signal");
                    break;
                }
                () = tokio::time::sleep(self.retry_delay) => {}
            }
        }

        info!(consumer = %self.name, batches, "Change-stream consumer stopped");
        batches
    }

    async fn process_stream(&mut self, stream: &mut ChangeBatchStream, batches: &mut u64) -> StreamEnd {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Change-stream consumer received shutdown signal during processing");
                    return StreamEnd::Shutdown;
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(records)) => {
                            self.reconciler.reconcile(&records).await;
                            *batches += 1;
                        }
                        Some(Err(e)) => {
                            error!(
                                consumer = %self.name,
                                error = %e,
                                "Error receiving batch from change stream"
                            );
                        }
                        None => return StreamEnd::Exhausted,
                    }
                }
            }
        }
    }
}
