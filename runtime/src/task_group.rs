//! Bulkhead fan-out for independent units of work.
//!
//! A [`TaskGroup`] runs every unit it holds concurrently on the current task
//! and waits for all of them to settle. Each unit's outcome is captured and
//! failures (errors and panics alike) are logged with the unit's label. The
//! group itself never fails: one broken unit cannot sink its siblings.
//!
//! ```text
//! TaskGroup "persist-seat"
//!   ├── "S1 A-1"  ──► Ok
//!   ├── "S1 A-2"  ──► Err(WriteFailed)   (logged)
//!   └── "S1 B-3"  ──► Ok
//!                      │
//!                      ▼
//!   GroupOutcome { succeeded: 2, failed: 1 }
//! ```
//!
//! Units are plain futures, not spawned tasks, so they may borrow from the
//! caller (a shared snapshot, `&self`). They still overlap at every await
//! point.

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::error;

/// How a unit of work failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitFailure<E> {
    /// The unit returned an error
    Error(E),
    /// The unit panicked; carries the panic message when it was a string
    Panicked(String),
}

impl<E: fmt::Display> fmt::Display for UnitFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(e) => write!(f, "{e}"),
            Self::Panicked(message) => write!(f, "panicked: {message}"),
        }
    }
}

/// Settled outcomes of a [`TaskGroup`], in the order units were added.
#[derive(Debug)]
pub struct GroupOutcome<T, E> {
    /// Label and value of every unit that succeeded
    pub succeeded: Vec<(String, T)>,
    /// Label and failure of every unit that failed
    pub failed: Vec<(String, UnitFailure<E>)>,
}

impl<T, E> GroupOutcome<T, E> {
    /// Number of successful units
    #[must_use]
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    /// Number of failed units
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Whether every unit succeeded
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A named set of independent units of work.
pub struct TaskGroup<'a, T, E> {
    name: &'static str,
    units: Vec<(String, BoxFuture<'a, Result<T, E>>)>,
}

impl<'a, T, E> TaskGroup<'a, T, E>
where
    T: Send + 'a,
    E: fmt::Display + Send + 'a,
{
    /// Create an empty group. `name` tags every failure log line.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            units: Vec::new(),
        }
    }

    /// Add a unit of work; it starts running on [`join`](Self::join).
    pub fn add(
        &mut self,
        label: impl Into<String>,
        unit: impl Future<Output = Result<T, E>> + Send + 'a,
    ) {
        self.units.push((label.into(), unit.boxed()));
    }

    /// Number of units added so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether no unit was added
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Run all units concurrently and wait for every one of them to settle.
    pub async fn join(self) -> GroupOutcome<T, E> {
        let name = self.name;
        let settled = join_all(self.units.into_iter().map(|(label, unit)| async move {
            let result = AssertUnwindSafe(unit).catch_unwind().await;
            (label, result)
        }))
        .await;

        let mut outcome = GroupOutcome {
            succeeded: Vec::new(),
            failed: Vec::new(),
        };

        for (label, result) in settled {
            match result {
                Ok(Ok(value)) => outcome.succeeded.push((label, value)),
                Ok(Err(e)) => {
                    error!(group = name, unit = %label, error = %e, "Unit of work failed");
                    outcome.failed.push((label, UnitFailure::Error(e)));
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(group = name, unit = %label, panic = %message, "Unit of work panicked");
                    outcome.failed.push((label, UnitFailure::Panicked(message)));
                }
            }
        }

        outcome
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Barrier;

    #[tokio::test]
    async fn captures_every_outcome_in_order() {
        let mut group: TaskGroup<'_, u32, String> = TaskGroup::new("test");
        group.add("one", async { Ok(1) });
        group.add("two", async { Err("boom".to_string()) });
        group.add("three", async { Ok(3) });
        assert_eq!(group.len(), 3);

        let outcome = group.join().await;

        assert_eq!(
            outcome.succeeded,
            vec![("one".to_string(), 1), ("three".to_string(), 3)]
        );
        assert_eq!(
            outcome.failed,
            vec![("two".to_string(), UnitFailure::Error("boom".to_string()))]
        );
        assert!(!outcome.is_clean());
    }

    #[tokio::test]
    async fn panicking_unit_does_not_sink_siblings() {
        let mut group: TaskGroup<'_, (), String> = TaskGroup::new("test");
        group.add("fine", async { Ok(()) });
        group.add("broken", async {
            let store_exploded = true;
            if store_exploded {
                panic!("seat store exploded");
            }
            Ok(())
        });

        let outcome = group.join().await;

        assert_eq!(outcome.succeeded_count(), 1);
        assert_eq!(
            outcome.failed,
            vec![(
                "broken".to_string(),
                UnitFailure::Panicked("seat store exploded".to_string())
            )]
        );
    }

    #[tokio::test]
    async fn units_run_concurrently() {
        // Each unit waits for all others; sequential execution would deadlock
        let barrier = Arc::new(Barrier::new(3));
        let finished = AtomicUsize::new(0);

        let mut group: TaskGroup<'_, (), String> = TaskGroup::new("test");
        for i in 0..3 {
            let barrier = Arc::clone(&barrier);
            let finished = &finished;
            group.add(format!("unit-{i}"), async move {
                barrier.wait().await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        let outcome = tokio::time::timeout(std::time::Duration::from_secs(5), group.join())
            .await
            .unwrap_or_else(|_| panic!("units did not overlap"));

        assert!(outcome.is_clean());
        assert_eq!(finished.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_group_settles_immediately() {
        let group: TaskGroup<'_, (), String> = TaskGroup::new("test");
        assert!(group.is_empty());
        let outcome = group.join().await;
        assert_eq!(outcome.succeeded_count() + outcome.failed_count(), 0);
    }
}
