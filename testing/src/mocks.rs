//! In-memory doubles for the crawler, the event bus and the change stream.
//!
//! Every double is `Clone` and shares its state across clones, so a test
//! keeps one handle for assertions and hands another (as `Arc<dyn Trait>`) to
//! the pipeline under test.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only follows a panicking test

use seatwatch_core::change_stream::{
    ChangeBatchStream, ChangeStreamError, ChangeStreamRecord, ChangeStreamSource,
};
use seatwatch_core::crawling::{AssignCrawling, CrawlingError, CrawlingGateway, Session};
use seatwatch_core::event::SerializedEvent;
use seatwatch_core::event_bus::{EventBus, EventBusError};
use seatwatch_core::performance::{PerformanceCode, PeriodQualifier, SubPeriod};
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Event bus that records every accepted publish.
///
/// Publishes can be made to fail per topic or, for `AssignCrawling` events,
/// per sub-period.
///
/// # Example
///
/// ```
/// use seatwatch_testing::mocks::InMemoryEventBus;
///
/// let bus = InMemoryEventBus::new();
/// bus.fail_sub_period("2024-06");
/// assert!(bus.is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventBus {
    published: Arc<RwLock<Vec<(String, SerializedEvent)>>>,
    attempts: Arc<AtomicUsize>,
    failing_topics: Arc<RwLock<HashSet<String>>>,
    failing_sub_periods: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryEventBus {
    /// Create a bus that accepts everything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every publish to `topic`
    pub fn fail_topic(&self, topic: &str) {
        self.failing_topics.write().unwrap().insert(topic.to_string());
    }

    /// Reject `AssignCrawling` events for `sub_period`
    pub fn fail_sub_period(&self, sub_period: &str) {
        self.failing_sub_periods
            .write()
            .unwrap()
            .insert(sub_period.to_string());
    }

    /// Every accepted publish as `(topic, event)`, in acceptance order
    #[must_use]
    pub fn published(&self) -> Vec<(String, SerializedEvent)> {
        self.published.read().unwrap().clone()
    }

    /// Accepted `AssignCrawling` payloads, decoded
    #[must_use]
    pub fn assign_crawling_events(&self) -> Vec<AssignCrawling> {
        self.published
            .read()
            .unwrap()
            .iter()
            .filter_map(|(_, event)| decode_assign_crawling(event))
            .collect()
    }

    /// Number of publish calls, accepted or not
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Number of accepted publishes
    #[must_use]
    pub fn len(&self) -> usize {
        self.published.read().unwrap().len()
    }

    /// Whether nothing was accepted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.published.read().unwrap().is_empty()
    }

    fn rejection(&self, topic: &str, event: &SerializedEvent) -> Option<EventBusError> {
        if self.failing_topics.read().unwrap().contains(topic) {
            return Some(EventBusError::PublishFailed {
                topic: topic.to_string(),
                reason: "topic rejected".to_string(),
            });
        }
        let sub_period = decode_assign_crawling(event)?.sub_period;
        self.failing_sub_periods
            .read()
            .unwrap()
            .contains(sub_period.as_str())
            .then(|| EventBusError::PublishFailed {
                topic: topic.to_string(),
                reason: format!("sub-period {sub_period} rejected"),
            })
    }
}

fn decode_assign_crawling(event: &SerializedEvent) -> Option<AssignCrawling> {
    if event.event_type != AssignCrawling::EVENT_TYPE {
        return None;
    }
    event.decode().ok()
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            // Let sibling publishes interleave
            tokio::task::yield_now().await;

            if let Some(error) = self.rejection(&topic, &event) {
                return Err(error);
            }
            self.published.write().unwrap().push((topic, event));
            Ok(())
        })
    }
}

/// Crawler gateway answering from a fixed sub-period table.
///
/// Pairs without an entry list no sub-periods.
#[derive(Clone, Debug, Default)]
pub struct StubCrawlingGateway {
    sub_periods: Arc<RwLock<HashMap<(PerformanceCode, PeriodQualifier), Vec<SubPeriod>>>>,
    session_failure: Arc<RwLock<Option<CrawlingError>>>,
    failing_listings: Arc<RwLock<HashSet<PerformanceCode>>>,
    sessions_acquired: Arc<AtomicUsize>,
    listings: Arc<RwLock<Vec<(PerformanceCode, PeriodQualifier)>>>,
}

impl StubCrawlingGateway {
    /// Create a gateway with an empty sub-period table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `code`/`qualifier` with `sub_periods`, in that order.
    ///
    /// # Panics
    ///
    /// Panics if any argument is not a valid value.
    #[must_use]
    pub fn with_sub_periods(self, code: &str, qualifier: &str, sub_periods: &[&str]) -> Self {
        let sub_periods = sub_periods
            .iter()
            .map(|token| SubPeriod::create(*token).unwrap())
            .collect();
        self.sub_periods.write().unwrap().insert(
            (
                PerformanceCode::create(code).unwrap(),
                PeriodQualifier::create(qualifier).unwrap(),
            ),
            sub_periods,
        );
        self
    }

    /// Make every session acquisition fail from now on
    pub fn fail_sessions(&self) {
        *self.session_failure.write().unwrap() = Some(CrawlingError::SessionUnavailable(
            "box office refused a session".to_string(),
        ));
    }

    /// Make sub-period listing fail for `code`
    pub fn fail_listing(&self, code: &str) {
        self.failing_listings
            .write()
            .unwrap()
            .insert(PerformanceCode::create(code).unwrap());
    }

    /// Number of sessions handed out
    #[must_use]
    pub fn sessions_acquired(&self) -> usize {
        self.sessions_acquired.load(Ordering::SeqCst)
    }

    /// Every listing request, in call order
    #[must_use]
    pub fn listings(&self) -> Vec<(PerformanceCode, PeriodQualifier)> {
        self.listings.read().unwrap().clone()
    }
}

impl CrawlingGateway for StubCrawlingGateway {
    fn acquire_session(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Session, CrawlingError>> + Send + '_>> {
        Box::pin(async move {
            if let Some(error) = self.session_failure.read().unwrap().clone() {
                return Err(error);
            }
            let n = self.sessions_acquired.fetch_add(1, Ordering::SeqCst);
            Ok(Session::new(format!("stub-session-{n}")))
        })
    }

    fn list_sub_periods<'a>(
        &'a self,
        _session: &'a Session,
        performance_code: &'a PerformanceCode,
        period_qualifier: &'a PeriodQualifier,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SubPeriod>, CrawlingError>> + Send + 'a>> {
        Box::pin(async move {
            self.listings
                .write()
                .unwrap()
                .push((performance_code.clone(), period_qualifier.clone()));

            if self.failing_listings.read().unwrap().contains(performance_code) {
                return Err(CrawlingError::ListingFailed {
                    performance_code: performance_code.clone(),
                    reason: "calendar page unavailable".to_string(),
                });
            }

            Ok(self
                .sub_periods
                .read()
                .unwrap()
                .get(&(performance_code.clone(), period_qualifier.clone()))
                .cloned()
                .unwrap_or_default())
        })
    }
}

/// One scripted subscription of an [`InMemoryChangeStream`].
#[derive(Clone, Debug)]
pub enum ScriptedSubscription {
    /// `subscribe` fails with this error
    Refused(ChangeStreamError),
    /// `subscribe` succeeds; the stream yields these items, then ends
    Delivers(Vec<Result<Vec<ChangeStreamRecord>, ChangeStreamError>>),
}

/// Change-stream source replaying scripted subscriptions in order.
///
/// Once the script is exhausted, subscriptions succeed with a stream that
/// never yields, so a consumer idles until shutdown.
#[derive(Clone, Debug, Default)]
pub struct InMemoryChangeStream {
    script: Arc<Mutex<VecDeque<ScriptedSubscription>>>,
    subscriptions: Arc<AtomicUsize>,
}

impl InMemoryChangeStream {
    /// Create a source with an empty script
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a subscription delivering `batches`
    #[must_use]
    pub fn then_deliver(self, batches: Vec<Vec<ChangeStreamRecord>>) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(ScriptedSubscription::Delivers(
                batches.into_iter().map(Ok).collect(),
            ));
        self
    }

    /// Queue an arbitrary scripted subscription
    #[must_use]
    pub fn then(self, subscription: ScriptedSubscription) -> Self {
        self.script.lock().unwrap().push_back(subscription);
        self
    }

    /// Number of `subscribe` calls so far
    #[must_use]
    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

impl ChangeStreamSource for InMemoryChangeStream {
    fn subscribe(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<ChangeBatchStream, ChangeStreamError>> + Send + '_>>
    {
        Box::pin(async move {
            self.subscriptions.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();

            match next {
                Some(ScriptedSubscription::Refused(error)) => Err(error),
                Some(ScriptedSubscription::Delivers(items)) => {
                    let stream = async_stream::stream! {
                        for item in items {
                            yield item;
                        }
                    };
                    Ok(Box::pin(stream) as ChangeBatchStream)
                }
                None => Ok(Box::pin(futures::stream::pending::<
                    Result<Vec<ChangeStreamRecord>, ChangeStreamError>,
                >()) as ChangeBatchStream),
            }
        })
    }
}
