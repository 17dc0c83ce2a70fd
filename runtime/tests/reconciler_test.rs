//! Vacancy reconciler integration tests.
//!
//! Tests the record → crawl result → snapshot → save flow against the
//! in-memory stores, including the failure isolation between records and
//! between seat saves.
//!
//! Run with: `cargo test --test reconciler_test`

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use seatwatch_core::change_stream::{ChangeKind, ChangeStreamRecord};
use seatwatch_core::performance::SessionKey;
use seatwatch_core::seat::DetectionDatetime;
use seatwatch_runtime::{ReconcileReport, VacancyReconciler};
use seatwatch_testing::fixtures::{
    crawling_result, insert_record, known_seat, remove_record, seat_info, session_key,
};
use seatwatch_testing::{InMemoryCrawlingResultRepository, InMemorySeatRepository, init_test_tracing};
use std::sync::Arc;

const COMMITTED_AT: i64 = 1_714_550_400;

struct Harness {
    results: InMemoryCrawlingResultRepository,
    seats: InMemorySeatRepository,
    reconciler: VacancyReconciler,
}

impl Harness {
    fn new() -> Self {
        let results = InMemoryCrawlingResultRepository::new();
        let seats = InMemorySeatRepository::new();
        let reconciler =
            VacancyReconciler::new(Arc::new(results.clone()), Arc::new(seats.clone()));
        Self {
            results,
            seats,
            reconciler,
        }
    }

    fn seat_labels(&self, key: &SessionKey) -> Vec<String> {
        let mut labels: Vec<String> = self
            .seats
            .seats_for(key)
            .iter()
            .map(|seat| seat.seat_info.to_string())
            .collect();
        labels.sort();
        labels
    }
}

fn matinee() -> SessionKey {
    session_key("1011", "2024-05-01", "matinee")
}

#[tokio::test]
async fn test_persists_only_unknown_seats_stamped_with_commit_time() {
    init_test_tracing();
    let h = Harness::new();
    let key = matinee();
    h.results.insert(crawling_result(
        &key,
        &[("S", "A", "1"), ("S", "A", "2"), ("S", "B", "3")],
    ));
    h.seats
        .insert(known_seat(&key, seat_info("S", "A", "1"), 1_714_000_000));

    let report = h.reconciler.reconcile(&[insert_record(&key, COMMITTED_AT)]).await;

    assert_eq!(
        report,
        ReconcileReport {
            records_received: 1,
            records_reconciled: 1,
            seats_persisted: 2,
            seats_already_known: 1,
            ..ReconcileReport::default()
        }
    );
    assert_eq!(h.seat_labels(&key), vec!["S A-1", "S A-2", "S B-3"]);

    let committed = DetectionDatetime::from_unix_time(COMMITTED_AT).unwrap();
    let new_seats: Vec<_> = h
        .seats
        .seats_for(&key)
        .into_iter()
        .filter(|seat| seat.seat_info != seat_info("S", "A", "1"))
        .collect();
    assert!(new_seats.iter().all(|seat| seat.detected_at == committed));
    assert!(new_seats.iter().all(|seat| seat.performance_name.as_str() == "Les Misérables"));
}

#[tokio::test]
async fn test_reprocessing_a_record_saves_nothing_new() {
    let h = Harness::new();
    let key = matinee();
    h.results
        .insert(crawling_result(&key, &[("S", "A", "1"), ("S", "A", "2")]));
    let record = insert_record(&key, COMMITTED_AT);

    let first = h.reconciler.reconcile(std::slice::from_ref(&record)).await;
    let second = h.reconciler.reconcile(std::slice::from_ref(&record)).await;

    assert_eq!(first.seats_persisted, 2);
    assert_eq!(second.seats_persisted, 0);
    assert_eq!(second.seats_already_known, 2);
    assert_eq!(h.seats.seats_for(&key).len(), 2);
}

#[tokio::test]
async fn test_remove_records_touch_no_repository() {
    let h = Harness::new();
    let key = matinee();
    h.results.insert(crawling_result(&key, &[("S", "A", "1")]));

    let report = h.reconciler.reconcile(&[remove_record(&key, COMMITTED_AT)]).await;

    assert_eq!(report.removals_skipped, 1);
    assert_eq!(report.records_reconciled, 0);
    assert_eq!(h.results.reads(), 0);
    assert_eq!(h.seats.reads(), 0);
    assert_eq!(h.seats.writes(), 0);
}

#[tokio::test]
async fn test_remove_is_skipped_even_when_malformed() {
    let h = Harness::new();
    let record = ChangeStreamRecord::new(ChangeKind::Remove, Vec::<(&str, &str)>::new(), None);

    let report = h.reconciler.reconcile(&[record]).await;

    assert_eq!(report.removals_skipped, 1);
    assert_eq!(report.records_failed, 0);
}

#[tokio::test]
async fn test_malformed_record_does_not_stop_well_formed_sibling() {
    init_test_tracing();
    let h = Harness::new();
    let key = matinee();
    h.results.insert(crawling_result(&key, &[("S", "A", "1")]));

    let missing_date = ChangeStreamRecord::new(
        ChangeKind::Insert,
        [
            (ChangeStreamRecord::PERFORMANCE_CODE, "1011"),
            (ChangeStreamRecord::SESSION_SLOT, "matinee"),
        ],
        Some(COMMITTED_AT),
    );

    let report = h
        .reconciler
        .reconcile(&[missing_date, insert_record(&key, COMMITTED_AT)])
        .await;

    assert_eq!(report.records_failed, 1);
    assert_eq!(report.records_reconciled, 1);
    assert_eq!(report.seats_persisted, 1);
    assert_eq!(h.results.reads(), 1);
}

#[tokio::test]
async fn test_unknown_crawling_result_fails_only_that_record() {
    let h = Harness::new();
    let stored = matinee();
    let missing = session_key("1011", "2024-05-01", "soiree");
    h.results.insert(crawling_result(&stored, &[("S", "A", "1")]));

    let report = h
        .reconciler
        .reconcile(&[
            insert_record(&missing, COMMITTED_AT),
            insert_record(&stored, COMMITTED_AT),
        ])
        .await;

    assert_eq!(report.records_failed, 1);
    assert_eq!(report.seats_persisted, 1);
    // No snapshot is read for a result that does not exist
    assert_eq!(h.seats.reads(), 1);
    assert!(h.seats.seats_for(&missing).is_empty());
}

#[tokio::test]
async fn test_crawling_result_read_failure_is_isolated() {
    let h = Harness::new();
    let broken = matinee();
    let fine = session_key("2022", "2024-05-02", "soiree");
    h.results.insert(crawling_result(&broken, &[("S", "A", "1")]));
    h.results.insert(crawling_result(&fine, &[("S", "C", "9")]));
    h.results.fail_reads_for(&broken);

    let report = h
        .reconciler
        .reconcile(&[
            insert_record(&broken, COMMITTED_AT),
            insert_record(&fine, COMMITTED_AT),
        ])
        .await;

    assert_eq!(report.records_failed, 1);
    assert_eq!(h.seat_labels(&fine), vec!["S C-9"]);
}

#[tokio::test]
async fn test_failing_seat_save_does_not_stop_siblings() {
    init_test_tracing();
    let h = Harness::new();
    let key = matinee();
    h.results.insert(crawling_result(
        &key,
        &[("S", "A", "1"), ("S", "A", "2"), ("S", "B", "3")],
    ));
    h.seats.fail_saves_for(seat_info("S", "A", "2"));

    let report = h.reconciler.reconcile(&[insert_record(&key, COMMITTED_AT)]).await;

    assert_eq!(report.records_reconciled, 1);
    assert_eq!(report.records_failed, 0);
    assert_eq!(report.seats_persisted, 2);
    assert_eq!(report.seat_saves_failed, 1);
    assert_eq!(h.seats.writes(), 3);
    assert_eq!(h.seat_labels(&key), vec!["S A-1", "S B-3"]);
}

#[tokio::test]
async fn test_modify_records_are_reconciled() {
    let h = Harness::new();
    let key = matinee();
    h.results.insert(crawling_result(&key, &[("S", "A", "1")]));

    let modify = ChangeStreamRecord::for_key(ChangeKind::Modify, &key, COMMITTED_AT);
    let report = h.reconciler.reconcile(&[modify]).await;

    assert_eq!(report.seats_persisted, 1);
}

#[tokio::test]
async fn test_same_key_records_in_one_batch_persist_once() {
    init_test_tracing();
    let h = Harness::new();
    let key = matinee();
    h.results
        .insert(crawling_result(&key, &[("S", "A", "1"), ("S", "A", "2")]));

    let report = h
        .reconciler
        .reconcile(&[
            insert_record(&key, COMMITTED_AT),
            ChangeStreamRecord::for_key(ChangeKind::Modify, &key, COMMITTED_AT + 1),
        ])
        .await;

    assert_eq!(report.records_reconciled, 2);
    assert_eq!(report.seats_persisted, 2);
    assert_eq!(report.seats_already_known, 2);
    assert_eq!(h.seats.writes(), 2);
    assert_eq!(h.seat_labels(&key), vec!["S A-1", "S A-2"]);

    // First detection comes from the earlier commit
    let committed = DetectionDatetime::from_unix_time(COMMITTED_AT).unwrap();
    assert!(h.seats.seats_for(&key).iter().all(|seat| seat.detected_at == committed));
}

#[tokio::test]
async fn test_failed_record_does_not_stop_later_record_of_same_key() {
    let h = Harness::new();
    let key = matinee();
    let malformed = ChangeStreamRecord::new(
        ChangeKind::Insert,
        [(ChangeStreamRecord::PERFORMANCE_CODE, "1011")],
        Some(COMMITTED_AT),
    );

    // Not stored yet: the first record fails on lookup
    let first = h
        .reconciler
        .reconcile(&[malformed.clone(), insert_record(&key, COMMITTED_AT)])
        .await;
    assert_eq!(first.records_failed, 2);

    h.results.insert(crawling_result(&key, &[("S", "A", "1")]));
    let second = h
        .reconciler
        .reconcile(&[
            ChangeStreamRecord::for_key(ChangeKind::Modify, &key, COMMITTED_AT),
            malformed,
            insert_record(&key, COMMITTED_AT + 1),
        ])
        .await;

    assert_eq!(second.records_failed, 1);
    assert_eq!(second.records_reconciled, 2);
    assert_eq!(second.seats_persisted, 1);
    assert_eq!(second.seats_already_known, 1);
    assert_eq!(h.seats.seats_for(&key).len(), 1);
}

#[tokio::test]
async fn test_within_record_duplicates_are_both_saved() {
    // The snapshot is read once per record, so a duplicate inside one crawl
    // result is not filtered against its twin
    let h = Harness::new();
    let key = matinee();
    h.results
        .insert(crawling_result(&key, &[("S", "A", "1"), ("S", "A", "1")]));

    let report = h.reconciler.reconcile(&[insert_record(&key, COMMITTED_AT)]).await;

    assert_eq!(report.seats_persisted, 2);
}

#[tokio::test]
async fn test_empty_batch() {
    let h = Harness::new();
    let report = h.reconciler.reconcile(&[]).await;
    assert_eq!(report, ReconcileReport::default());
}

proptest! {
    #[test]
    fn prop_saves_exactly_the_unknown_seats(
        reported in proptest::collection::btree_set(0_u8..40, 0..20),
        known in proptest::collection::btree_set(0_u8..40, 0..20),
    ) {
        let h = Harness::new();
        let key = matinee();

        let labels: Vec<String> = reported.iter().map(u8::to_string).collect();
        let vacant: Vec<(&str, &str, &str)> =
            labels.iter().map(|n| ("S", "A", n.as_str())).collect();
        h.results.insert(crawling_result(&key, &vacant));
        for n in &known {
            h.seats.insert(known_seat(&key, seat_info("S", "A", &n.to_string()), 1_714_000_000));
        }

        let report = tokio_test::block_on(
            h.reconciler.reconcile(&[insert_record(&key, COMMITTED_AT)]),
        );

        let overlap = reported.intersection(&known).count();
        prop_assert_eq!(report.seats_persisted, reported.len() - overlap);
        prop_assert_eq!(report.seats_already_known, overlap);
        prop_assert_eq!(h.seats.writes(), reported.len() - overlap);
    }
}
