use futures::stream::{self, StreamExt};
use tracing::{debug, info};

use crate::{
    lending::engine::{LifecycleEngine, ReturnReceipt},
    storage::LoanId,
};

/// Applies the return transition to many loans at once.
///
/// Every id becomes its own unit of work with its own transaction. Up to
/// `concurrency` units are in flight at a time and they complete in any
/// order; their transactions still take turns on the shared connection.
pub struct BulkReturnProcessor {
    engine: LifecycleEngine,
    concurrency: usize,
}

impl BulkReturnProcessor {
    pub fn new(engine: LifecycleEngine, concurrency: usize) -> Self {
        Self {
            engine,
            concurrency: concurrency.max(1),
        }
    }

    /// Return every loan in `ids` that can be returned.
    ///
    /// Ids that are missing, already returned, or fail for any other reason
    /// are left out of the result. This never fails as a whole; use
    /// [`LifecycleEngine::return_loan`] when the caller needs the error.
    pub async fn return_many(&self, ids: &[LoanId]) -> Vec<ReturnReceipt> {
        info!(
            "Returning {} loans with up to {} concurrent units",
            ids.len(),
            self.concurrency
        );

        let receipts: Vec<ReturnReceipt> = stream::iter(ids.iter().copied())
            .map(|id| {
                let engine = self.engine.clone();
                async move { (id, engine.return_loan(id).await) }
            })
            .buffer_unordered(self.concurrency)
            .filter_map(|(id, outcome)| async move {
                match outcome {
                    Ok(receipt) => Some(receipt),
                    Err(e) => {
                        debug!("Loan {} left out of bulk return: {}", id, e);
                        None
                    }
                }
            })
            .collect()
            .await;

        info!(
            "Bulk return complete: {} of {} loans returned",
            receipts.len(),
            ids.len()
        );
        receipts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::CirculationConfig,
        lending::clock::FixedClock,
        storage::{Database, LoanStatus},
    };
    use chrono::{Duration, NaiveDate};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 9, 1).unwrap()
    }

    async fn engine_with_loans(count: usize) -> (LifecycleEngine, Vec<LoanId>) {
        let db = Database::open_in_memory().unwrap();
        let engine = LifecycleEngine::new(
            db.clone(),
            Arc::new(FixedClock(today())),
            CirculationConfig::default(),
        );
        let (borrower, items) = db
            .atomically(|store| {
                let account = store.insert_account("Octavia", &BTreeSet::new())?;
                let mut items = Vec::new();
                for n in 0..count {
                    items.push(store.insert_item(&format!("volume {}", n))?.id);
                }
                Ok((account.id, items))
            })
            .unwrap();

        let mut loans = Vec::new();
        for item in items {
            loans.push(engine.create(borrower, item).await.unwrap().id);
        }
        (engine, loans)
    }

    #[tokio::test]
    async fn missing_ids_are_silently_omitted() {
        let (engine, loans) = engine_with_loans(2).await;
        let processor = BulkReturnProcessor::new(engine, 4);

        let receipts = processor.return_many(&[loans[0], loans[1], 9_999]).await;

        let mut returned: Vec<LoanId> = receipts.iter().map(|r| r.loan.id).collect();
        returned.sort_unstable();
        assert_eq!(returned, vec![loans[0], loans[1]]);
        assert!(receipts
            .iter()
            .all(|r| r.loan.status == LoanStatus::ReturnedTimely));
    }

    #[tokio::test]
    async fn already_returned_loans_do_not_stop_the_batch() {
        let (engine, loans) = engine_with_loans(3).await;
        engine.return_loan(loans[1]).await.unwrap();
        let processor = BulkReturnProcessor::new(engine, 2);

        let receipts = processor.return_many(&loans).await;

        assert_eq!(receipts.len(), 2);
        assert!(receipts.iter().all(|r| r.loan.id != loans[1]));
    }

    #[tokio::test]
    async fn duplicate_ids_return_once() {
        let (engine, loans) = engine_with_loans(1).await;
        let processor = BulkReturnProcessor::new(engine, 8);

        let receipts = processor.return_many(&[loans[0], loans[0], loans[0]]).await;
        assert_eq!(receipts.len(), 1);
    }

    #[tokio::test]
    async fn late_bulk_returns_apply_the_same_suspension_rule() {
        let (engine, loans) = engine_with_loans(3).await;
        let late = LifecycleEngine::new(
            engine.database().clone(),
            Arc::new(FixedClock(today() + Duration::days(60))),
            CirculationConfig::default(),
        );
        let processor = BulkReturnProcessor::new(late, 3);

        let receipts = processor.return_many(&loans).await;

        assert_eq!(receipts.len(), 3);
        assert!(receipts
            .iter()
            .all(|r| r.loan.status == LoanStatus::ReturnedOverdue));
        // The threshold is crossed exactly once, by whichever unit lands second.
        assert_eq!(receipts.iter().filter(|r| r.account_suspended).count(), 1);
    }

    #[tokio::test]
    async fn empty_input_yields_empty_output() {
        let (engine, _) = engine_with_loans(0).await;
        let processor = BulkReturnProcessor::new(engine, 0);
        assert!(processor.return_many(&[]).await.is_empty());
    }
}
