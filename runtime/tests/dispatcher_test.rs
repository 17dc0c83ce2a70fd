//! Crawl dispatcher integration tests.
//!
//! Run with: `cargo test --test dispatcher_test`

#![allow(clippy::unwrap_used)]

use seatwatch_core::crawling::AssignCrawling;
use seatwatch_runtime::CrawlDispatcher;
use seatwatch_testing::fixtures::tracked;
use seatwatch_testing::{InMemoryEventBus, StubCrawlingGateway, init_test_tracing};
use std::collections::HashSet;
use std::sync::Arc;

fn dispatcher(gateway: &StubCrawlingGateway, bus: &InMemoryEventBus) -> CrawlDispatcher {
    CrawlDispatcher::new(Arc::new(gateway.clone()), Arc::new(bus.clone()))
}

#[tokio::test]
async fn test_one_event_per_sub_period() {
    init_test_tracing();
    let gateway = StubCrawlingGateway::new().with_sub_periods("1011", "6", &["2024-05", "2024-06"]);
    let bus = InMemoryEventBus::new();

    let report = dispatcher(&gateway, &bus).run(&[tracked("1011", "6")]).await;

    assert_eq!(report.performances_completed, 1);
    assert_eq!(report.events_published, 2);
    assert!(!report.is_aborted());

    let mut events: Vec<(String, String, String)> = bus
        .assign_crawling_events()
        .into_iter()
        .map(|e: AssignCrawling| {
            (
                e.performance_code.to_string(),
                e.sub_period.to_string(),
                e.period_qualifier.to_string(),
            )
        })
        .collect();
    events.sort();
    assert_eq!(
        events,
        vec![
            ("1011".to_string(), "2024-05".to_string(), "6".to_string()),
            ("1011".to_string(), "2024-06".to_string(), "6".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_events_go_to_configured_topic_with_metadata() {
    let gateway = StubCrawlingGateway::new().with_sub_periods("1011", "6", &["2024-05"]);
    let bus = InMemoryEventBus::new();

    dispatcher(&gateway, &bus)
        .with_topic("crawl-jobs")
        .run(&[tracked("1011", "6")])
        .await;

    let published = bus.published();
    assert_eq!(published.len(), 1);
    let (topic, event) = &published[0];
    assert_eq!(topic, "crawl-jobs");
    assert_eq!(event.event_type, AssignCrawling::EVENT_TYPE);
    let metadata = event.metadata.as_ref().unwrap();
    assert_eq!(metadata["source"], "seatwatch.crawl-dispatcher");
    assert!(metadata["dispatched_at"].is_string());
}

#[tokio::test]
async fn test_fan_out_covers_many_sub_periods_with_distinct_tokens() {
    let tokens: Vec<String> = (1..=12).map(|m| format!("2024-{m:02}")).collect();
    let token_refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
    let gateway = StubCrawlingGateway::new().with_sub_periods("1011", "6", &token_refs);
    let bus = InMemoryEventBus::new();

    let report = dispatcher(&gateway, &bus).run(&[tracked("1011", "6")]).await;

    assert_eq!(report.events_published, 12);
    let events = bus.assign_crawling_events();
    let distinct: HashSet<String> = events.iter().map(|e| e.sub_period.to_string()).collect();
    assert_eq!(distinct.len(), 12);
    assert!(events.iter().all(|e| e.performance_code.as_str() == "1011"));
}

#[tokio::test]
async fn test_pairs_are_processed_in_order_with_one_session_each() {
    let gateway = StubCrawlingGateway::new()
        .with_sub_periods("1011", "6", &["2024-05"])
        .with_sub_periods("2022", "1", &["2024-07", "2024-08"]);
    let bus = InMemoryEventBus::new();

    let report = dispatcher(&gateway, &bus)
        .run(&[tracked("1011", "6"), tracked("2022", "1")])
        .await;

    assert_eq!(report.performances_completed, 2);
    assert_eq!(report.events_published, 3);
    assert_eq!(gateway.sessions_acquired(), 2);
    let listed: Vec<String> = gateway
        .listings()
        .iter()
        .map(|(code, _)| code.to_string())
        .collect();
    assert_eq!(listed, vec!["1011", "2022"]);
}

#[tokio::test]
async fn test_session_failure_aborts_without_publishing() {
    init_test_tracing();
    let gateway = StubCrawlingGateway::new()
        .with_sub_periods("1011", "6", &["2024-05"])
        .with_sub_periods("2022", "1", &["2024-07"]);
    gateway.fail_sessions();
    let bus = InMemoryEventBus::new();

    let report = dispatcher(&gateway, &bus)
        .run(&[tracked("1011", "6"), tracked("2022", "1")])
        .await;

    assert!(report.is_aborted());
    assert_eq!(report.aborted_at.unwrap().as_str(), "1011");
    assert_eq!(report.performances_completed, 0);
    assert_eq!(bus.attempts(), 0);
    assert!(gateway.listings().is_empty());
}

#[tokio::test]
async fn test_publish_failure_settles_siblings_then_aborts() {
    let gateway = StubCrawlingGateway::new()
        .with_sub_periods("1011", "6", &["2024-05", "2024-06", "2024-07"])
        .with_sub_periods("2022", "1", &["2024-08"]);
    let bus = InMemoryEventBus::new();
    bus.fail_sub_period("2024-06");

    let report = dispatcher(&gateway, &bus)
        .run(&[tracked("1011", "6"), tracked("2022", "1")])
        .await;

    // Siblings of the failed publish still went out
    assert_eq!(report.events_published, 2);
    assert_eq!(report.events_failed, 1);
    assert_eq!(bus.attempts(), 3);

    // The next pair was never started
    assert_eq!(report.aborted_at.unwrap().as_str(), "1011");
    assert_eq!(gateway.sessions_acquired(), 1);
}

#[tokio::test]
async fn test_listing_failure_aborts_after_completed_pairs() {
    let gateway = StubCrawlingGateway::new()
        .with_sub_periods("1011", "6", &["2024-05"])
        .with_sub_periods("2022", "1", &["2024-07"]);
    gateway.fail_listing("2022");
    let bus = InMemoryEventBus::new();

    let report = dispatcher(&gateway, &bus)
        .run(&[tracked("1011", "6"), tracked("2022", "1"), tracked("3033", "2")])
        .await;

    assert_eq!(report.performances_completed, 1);
    assert_eq!(report.events_published, 1);
    assert_eq!(report.aborted_at.unwrap().as_str(), "2022");
    assert_eq!(gateway.sessions_acquired(), 2);
}

#[tokio::test]
async fn test_empty_worklist_and_empty_listing() {
    let gateway = StubCrawlingGateway::new();
    let bus = InMemoryEventBus::new();
    let dispatcher = dispatcher(&gateway, &bus);

    let report = dispatcher.run(&[]).await;
    assert_eq!(report, seatwatch_runtime::DispatchReport::default());

    // A pair with no sub-periods completes without publishing
    let report = dispatcher.run(&[tracked("1011", "6")]).await;
    assert_eq!(report.performances_completed, 1);
    assert!(bus.is_empty());
}
