//! Vacancy reconciler: persists the seats a new crawl result reports vacant
//! that the seat store does not know yet.
//!
//! # Flow per record
//!
//! ```text
//! REMOVE ───────────────────────────────► skipped (no repository access)
//! INSERT / MODIFY
//!   └─► parse ─► CrawlResultChanged { key, committed_at }
//!         ├─► crawling_results.find_by_key(key)    (absent: CrawlingResultNotFound)
//!         ├─► seats.find_by_key(key)               (snapshot, read once)
//!         └─► save every reported seat not in the snapshot, concurrently
//! ```
//!
//! Records of a batch are grouped by session key. Keys are independent units;
//! the records of one key run one after another in delivery order, so a later
//! record reads a snapshot that already holds what an earlier one saved. The
//! seat saves of one record are independent units too. A failure is logged
//! against its unit and never reaches a sibling. Nothing is retried:
//! redelivery by the change stream plus the snapshot filter make
//! reprocessing a record harmless.

use crate::metrics::ReconcilerMetrics;
use crate::task_group::TaskGroup;
use seatwatch_core::change_stream::{ChangeStreamRecord, CrawlResultChanged, RecordParseError};
use seatwatch_core::performance::SessionKey;
use seatwatch_core::repository::{CrawlingResultRepository, RepositoryError, SeatRepository};
use seatwatch_core::seat::new_vacancies;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

/// Why one change-stream record was abandoned.
#[derive(Error, Debug, Clone)]
pub enum ReconcileError {
    /// The record did not carry a usable notification
    #[error("Malformed change record: {0}")]
    Parse(#[from] RecordParseError),

    /// The record points to a crawl result the store does not have
    #[error("Crawling result not found for {0}")]
    CrawlingResultNotFound(SessionKey),

    /// A repository read failed
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// What reconciling one record did to the seat store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RecordOutcome {
    persisted: usize,
    already_known: usize,
    save_failures: usize,
}

/// What reconciling the records of one session key did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct KeyOutcome {
    reconciled: Vec<RecordOutcome>,
    failed: usize,
}

/// What one batch did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Records in the batch
    pub records_received: usize,
    /// `REMOVE` records skipped untouched
    pub removals_skipped: usize,
    /// Records fully processed (individual seat saves may still have failed)
    pub records_reconciled: usize,
    /// Records abandoned on a parse, lookup or read error
    pub records_failed: usize,
    /// Newly vacant seats saved
    pub seats_persisted: usize,
    /// Reported seats skipped because the snapshot already had them
    pub seats_already_known: usize,
    /// Seat saves that failed
    pub seat_saves_failed: usize,
}

/// Reconciles crawl results against the seat store.
pub struct VacancyReconciler {
    crawling_results: Arc<dyn CrawlingResultRepository>,
    seats: Arc<dyn SeatRepository>,
}

impl VacancyReconciler {
    /// Create a reconciler over the two stores.
    #[must_use]
    pub fn new(
        crawling_results: Arc<dyn CrawlingResultRepository>,
        seats: Arc<dyn SeatRepository>,
    ) -> Self {
        Self {
            crawling_results,
            seats,
        }
    }

    /// Reconcile one delivered batch.
    ///
    /// Distinct session keys run concurrently; records sharing a key run in
    /// delivery order. The call never fails; per-record and per-seat failures
    /// are logged and tallied in the report.
    #[tracing::instrument(skip(self, records), fields(records = records.len()))]
    pub async fn reconcile(&self, records: &[ChangeStreamRecord]) -> ReconcileReport {
        let mut report = ReconcileReport {
            records_received: records.len(),
            ..ReconcileReport::default()
        };

        let mut group: TaskGroup<'_, KeyOutcome, ReconcileError> =
            TaskGroup::new("reconcile-record");
        // Records carried by each unit, so a panicking unit fails all of them
        let mut unit_sizes: HashMap<String, usize> = HashMap::new();
        let mut by_key: Vec<(SessionKey, Vec<CrawlResultChanged>)> = Vec::new();
        let mut key_slots: HashMap<SessionKey, usize> = HashMap::new();

        for (index, record) in records.iter().enumerate() {
            if record.is_removal() {
                debug!(index, "Skipping REMOVE record");
                report.removals_skipped += 1;
                continue;
            }
            match record.parse() {
                Ok(change) => {
                    let slot = *key_slots.entry(change.key.clone()).or_insert_with(|| {
                        by_key.push((change.key.clone(), Vec::new()));
                        by_key.len() - 1
                    });
                    by_key[slot].1.push(change);
                }
                Err(e) => {
                    let label = format!("#{index} {}", record.kind().as_str());
                    unit_sizes.insert(label.clone(), 1);
                    group.add(label, async move { Err(ReconcileError::Parse(e)) });
                }
            }
        }

        for (key, changes) in by_key {
            let label = key.to_string();
            unit_sizes.insert(label.clone(), changes.len());
            group.add(label, async move { Ok(self.reconcile_key(key, changes).await) });
        }

        let outcome = group.join().await;

        for (_, key) in &outcome.succeeded {
            for record in &key.reconciled {
                report.records_reconciled += 1;
                report.seats_persisted += record.persisted;
                report.seats_already_known += record.already_known;
                report.seat_saves_failed += record.save_failures;
            }
            report.records_failed += key.failed;
        }
        for (label, _) in &outcome.failed {
            report.records_failed += unit_sizes.get(label).copied().unwrap_or(1);
        }
        for _ in 0..report.records_failed {
            ReconcilerMetrics::record_failed();
        }

        info!(
            reconciled = report.records_reconciled,
            failed = report.records_failed,
            removals = report.removals_skipped,
            persisted = report.seats_persisted,
            "Change batch reconciled"
        );
        report
    }

    async fn reconcile_key(
        &self,
        key: SessionKey,
        changes: Vec<CrawlResultChanged>,
    ) -> KeyOutcome {
        let mut outcome = KeyOutcome::default();
        for change in changes {
            let committed_at = change.committed_at;
            match self.reconcile_record(change).await {
                Ok(record) => outcome.reconciled.push(record),
                Err(e) => {
                    error!(key = %key, detected_at = %committed_at, error = %e, "Record failed");
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }

    async fn reconcile_record(
        &self,
        change: CrawlResultChanged,
    ) -> Result<RecordOutcome, ReconcileError> {
        let CrawlResultChanged { key, committed_at } = change;

        let result = self
            .crawling_results
            .find_by_key(&key)
            .await?
            .ok_or_else(|| ReconcileError::CrawlingResultNotFound(key.clone()))?;
        let snapshot = self.seats.find_by_key(&key).await?;

        let fresh = new_vacancies(&result, &snapshot, committed_at);
        let already_known = result.vacant_seats.len() - fresh.len();

        let mut saves: TaskGroup<'_, (), RepositoryError> = TaskGroup::new("persist-seat");
        for seat in &fresh {
            saves.add(seat.seat_info.to_string(), self.seats.save(seat));
        }
        let saved = saves.join().await;

        let outcome = RecordOutcome {
            persisted: saved.succeeded_count(),
            already_known,
            save_failures: saved.failed_count(),
        };
        ReconcilerMetrics::record_reconciled(
            outcome.persisted,
            outcome.already_known,
            outcome.save_failures,
        );

        debug!(
            key = %key,
            reported = result.vacant_seats.len(),
            known = snapshot.len(),
            persisted = outcome.persisted,
            save_failures = outcome.save_failures,
            detected_at = %committed_at,
            "Record reconciled"
        );
        Ok(outcome)
    }
}
