use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    config::CirculationConfig,
    error::{CirculationError, Result},
    lending::{clock::Clock, eligibility::EligibilityPolicy},
    storage::{BorrowerId, Database, ItemId, Loan, LoanId, LoanStatus, NewLoan, Store},
};

/// Outcome of a successful return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReturnReceipt {
    pub loan: Loan,
    /// The return pushed the borrower over the suspension threshold.
    pub account_suspended: bool,
}

/// Totals reported by one overdue sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub scanned: usize,
    pub promoted: usize,
    pub failed: usize,
    pub chunks: usize,
}

/// Drives loans through their lifecycle.
///
/// Each public operation is one unit of work: it runs on the blocking pool
/// inside a single database transaction, so the loan update and its item and
/// account side effects commit together.
#[derive(Clone)]
pub struct LifecycleEngine {
    db: Database,
    clock: Arc<dyn Clock>,
    policy: EligibilityPolicy,
    settings: CirculationConfig,
}

impl LifecycleEngine {
    pub fn new(db: Database, clock: Arc<dyn Clock>, settings: CirculationConfig) -> Self {
        Self {
            db,
            clock,
            policy: EligibilityPolicy::new(),
            settings,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Fails with `Overdue` while the borrower has an OVERDUE loan.
    pub async fn check_no_outstanding_overdue(&self, borrower: BorrowerId) -> Result<()> {
        let policy = self.policy;
        self.unit_of_work(move |store| policy.check_no_outstanding_overdue(store, borrower))
            .await
    }

    /// Open a loan of `item` for `borrower`.
    ///
    /// Checks the pair is not already on loan and the item is available, then
    /// writes the loan and marks the item unavailable. The outstanding-overdue
    /// check is left to the caller; [`LifecycleEngine::borrow`] runs it.
    pub async fn create(&self, borrower: BorrowerId, item: ItemId) -> Result<Loan> {
        let today = self.today();
        let policy = self.policy;
        let period = self.settings.loan_period_days;

        let loan = self
            .unit_of_work(move |store| open_loan(store, policy, borrower, item, today, period))
            .await?;

        info!(
            "Loan {} opened: item {} to borrower {}, due {}",
            loan.id, loan.item_id, loan.borrower_id, loan.due_date
        );
        Ok(loan)
    }

    /// Full borrow flow: the account must be active and free of overdue
    /// loans before [`LifecycleEngine::create`]'s checks run, all in one
    /// transaction.
    pub async fn borrow(&self, borrower: BorrowerId, item: ItemId) -> Result<Loan> {
        let today = self.today();
        let policy = self.policy;
        let period = self.settings.loan_period_days;

        let loan = self
            .unit_of_work(move |store| {
                let account = store
                    .get_account(borrower)?
                    .ok_or_else(|| CirculationError::not_found("account", borrower))?;
                policy.check_account_active(&account)?;
                policy.check_no_outstanding_overdue(store, borrower)?;
                open_loan(store, policy, borrower, item, today, period)
            })
            .await?;

        info!(
            "Loan {} opened: item {} to borrower {}, due {}",
            loan.id, loan.item_id, loan.borrower_id, loan.due_date
        );
        Ok(loan)
    }

    /// Return a loan.
    ///
    /// A loan already in a RETURNED_* state fails with `AlreadyReturned` and
    /// nothing is written. A late return that brings the borrower's count of
    /// RETURNED_OVERDUE loans to the suspension threshold deactivates the
    /// account in the same transaction.
    pub async fn return_loan(&self, loan_id: LoanId) -> Result<ReturnReceipt> {
        let today = self.today();
        let threshold = self.settings.suspension_threshold;

        let receipt = self
            .unit_of_work(move |store| {
                let mut loan = store
                    .get_loan(loan_id)?
                    .ok_or_else(|| CirculationError::not_found("loan", loan_id))?;

                let status = loan.close(today)?;
                store.save_loan(&loan)?;
                store.set_item_available(loan.item_id, true)?;

                let account_suspended = status == LoanStatus::ReturnedOverdue
                    && enforce_suspension(store, loan.borrower_id, threshold)?;

                Ok(ReturnReceipt {
                    loan,
                    account_suspended,
                })
            })
            .await?;

        info!(
            "Loan {} returned as {} on {} ({} days late)",
            receipt.loan.id,
            receipt.loan.status,
            today,
            receipt.loan.days_overdue(today)
        );
        if receipt.account_suspended {
            warn!(
                "Account {} suspended after {} overdue returns",
                receipt.loan.borrower_id, threshold
            );
        }
        Ok(receipt)
    }

    /// Clear the penalty of a RETURNED_OVERDUE loan.
    pub async fn excuse(&self, loan_id: LoanId) -> Result<Loan> {
        let loan = self
            .unit_of_work(move |store| {
                let mut loan = store
                    .get_loan(loan_id)?
                    .ok_or_else(|| CirculationError::not_found("loan", loan_id))?;
                loan.excuse()?;
                store.save_loan(&loan)?;
                Ok(loan)
            })
            .await?;

        info!("Loan {} excused", loan.id);
        Ok(loan)
    }

    /// Excuse every RETURNED_OVERDUE loan of `borrower` in one transaction.
    pub async fn pardon_on_reactivation(&self, borrower: BorrowerId) -> Result<Vec<Loan>> {
        let pardoned = self
            .unit_of_work(move |store| pardon_overdue_returns(store, borrower))
            .await?;

        info!("Pardoned {} loans of borrower {}", pardoned.len(), borrower);
        Ok(pardoned)
    }

    /// Administrative reactivation. Flipping a suspended account back to
    /// active pardons its overdue returns as part of the same transaction;
    /// an account that is already active is left alone.
    pub async fn reactivate_account(&self, borrower: BorrowerId) -> Result<Vec<Loan>> {
        let pardoned = self
            .unit_of_work(move |store| {
                if !store.is_deactivated(borrower)? {
                    debug!("Account {} is already active", borrower);
                    return Ok(Vec::new());
                }
                store.set_account_active(borrower, true)?;
                pardon_overdue_returns(store, borrower)
            })
            .await?;

        info!(
            "Account {} reactivated, {} loans pardoned",
            borrower,
            pardoned.len()
        );
        Ok(pardoned)
    }

    /// Administrative suspension. Refused with `HasActiveLoans` while the
    /// borrower still holds BORROWED or OVERDUE loans.
    pub async fn suspend_account(&self, borrower: BorrowerId) -> Result<()> {
        let policy = self.policy;
        self.unit_of_work(move |store| {
            policy.check_no_active_loans(store, borrower)?;
            store.set_account_active(borrower, false)
        })
        .await?;
        info!("Account {} suspended", borrower);
        Ok(())
    }

    /// Promote every BORROWED loan due before today to OVERDUE.
    ///
    /// Walks the candidates in id order, one transaction per chunk of
    /// `sweep_chunk_size` loans. A record that cannot be promoted is logged
    /// and counted, never fatal to the rest of the sweep.
    pub async fn sweep_overdue(&self) -> Result<SweepSummary> {
        self.sweep_overdue_as_of(self.today()).await
    }

    /// Sweep judged against `as_of`, which may lie in the past but never
    /// after today: promotions cannot be undone.
    pub async fn sweep_overdue_as_of(&self, as_of: NaiveDate) -> Result<SweepSummary> {
        let today = self.today();
        if as_of > today {
            return Err(CirculationError::SweepInFuture { as_of, today });
        }
        let chunk_size = self.settings.sweep_chunk_size;
        let mut summary = SweepSummary::default();
        let mut after_id: LoanId = 0;

        info!("Sweeping loans due before {}", as_of);

        loop {
            let chunk = self
                .unit_of_work(move |store| sweep_chunk(store, as_of, after_id, chunk_size))
                .await?;

            summary.chunks += 1;
            summary.scanned += chunk.scanned;
            summary.promoted += chunk.promoted;
            summary.failed += chunk.failed;

            match chunk.last_id {
                Some(last_id) if chunk.scanned == chunk_size => after_id = last_id,
                _ => break,
            }
        }

        info!(
            "Sweep complete: {} scanned, {} promoted to OVERDUE, {} failed",
            summary.scanned, summary.promoted, summary.failed
        );
        Ok(summary)
    }

    /// Run `work` as one transaction on the blocking pool.
    async fn unit_of_work<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Store<'_>) -> Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.atomically(work)).await?
    }
}

fn open_loan(
    store: &Store<'_>,
    policy: EligibilityPolicy,
    borrower: BorrowerId,
    item_id: ItemId,
    today: NaiveDate,
    loan_period_days: u32,
) -> Result<Loan> {
    let item = store
        .get_item(item_id)?
        .ok_or_else(|| CirculationError::not_found("item", item_id))?;
    if store.get_account(borrower)?.is_none() {
        return Err(CirculationError::not_found("account", borrower));
    }

    policy.check_not_already_active(store, borrower, item_id)?;
    policy.check_item_available(&item)?;

    let loan = store.create_loan(&NewLoan::starting(borrower, item_id, today, loan_period_days)?)?;
    store.set_item_available(item_id, false)?;
    Ok(loan)
}

/// Deactivates the borrower once their overdue strikes, including the return
/// just saved, reach `threshold`. Returns whether this call did it.
fn enforce_suspension(store: &Store<'_>, borrower: BorrowerId, threshold: usize) -> Result<bool> {
    let strikes = store.count_overdue_strikes(borrower)?;
    debug!(
        "Borrower {} has {} overdue strikes (threshold {})",
        borrower, strikes, threshold
    );

    if strikes < threshold || store.is_deactivated(borrower)? {
        return Ok(false);
    }

    store.set_account_active(borrower, false)?;
    Ok(true)
}

fn pardon_overdue_returns(store: &Store<'_>, borrower: BorrowerId) -> Result<Vec<Loan>> {
    let mut loans = store.find_loans_by_borrower_and_status(borrower, LoanStatus::ReturnedOverdue)?;
    for loan in &mut loans {
        loan.excuse()?;
    }

    // All or nothing: the first failed save rolls the whole pardon back.
    for (_, outcome) in store.save_loans(&loans) {
        outcome?;
    }
    store.clear_penalties(borrower)?;
    Ok(loans)
}

struct ChunkOutcome {
    scanned: usize,
    promoted: usize,
    failed: usize,
    last_id: Option<LoanId>,
}

fn sweep_chunk(
    store: &Store<'_>,
    today: NaiveDate,
    after_id: LoanId,
    chunk_size: usize,
) -> Result<ChunkOutcome> {
    let candidates = store.find_loans_past_due(LoanStatus::Borrowed, today, after_id, chunk_size)?;
    let last_id = candidates.last().map(|loan| loan.id);
    let scanned = candidates.len();

    let mut failed = 0;
    let mut promotable = Vec::with_capacity(scanned);
    for mut loan in candidates {
        match loan.mark_overdue() {
            Ok(()) => promotable.push(loan),
            Err(e) => {
                warn!("Skipping loan {} in sweep: {}", loan.id, e);
                failed += 1;
            }
        }
    }

    let mut promoted = 0;
    for (loan_id, outcome) in store.save_loans(&promotable) {
        match outcome {
            Ok(()) => {
                debug!("Loan {} is now OVERDUE", loan_id);
                promoted += 1;
            }
            Err(_) => failed += 1,
        }
    }

    Ok(ChunkOutcome {
        scanned,
        promoted,
        failed,
        last_id,
    })
}
