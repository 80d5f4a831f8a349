use tracing::debug;

use crate::{
    error::{CirculationError, Result},
    storage::{Account, BorrowerId, Item, ItemId, LoanStatus, Store},
};

/// Preconditions a new loan must satisfy.
///
/// Every check is a pure predicate over the store's current state. They run
/// inside the caller's unit of work so the answer cannot go stale before the
/// loan is written.
#[derive(Debug, Default, Clone, Copy)]
pub struct EligibilityPolicy;

impl EligibilityPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Blocks new borrowing while the borrower has an OVERDUE loan.
    pub fn check_no_outstanding_overdue(&self, store: &Store<'_>, borrower: BorrowerId) -> Result<()> {
        if store.exists_loan_with_status(borrower, LoanStatus::Overdue)? {
            debug!("Borrower {} has an outstanding overdue loan", borrower);
            return Err(CirculationError::Overdue(borrower));
        }
        Ok(())
    }

    /// A borrower may hold at most one BORROWED/OVERDUE loan of an item.
    pub fn check_not_already_active(
        &self,
        store: &Store<'_>,
        borrower: BorrowerId,
        item: ItemId,
    ) -> Result<()> {
        if store.exists_active_loan(borrower, item)? {
            debug!("Borrower {} already holds item {}", borrower, item);
            return Err(CirculationError::AlreadyBorrowed { borrower, item });
        }
        Ok(())
    }

    pub fn check_item_available(&self, item: &Item) -> Result<()> {
        if !item.available {
            debug!("Item {} is out on loan", item.id);
            return Err(CirculationError::NotAvailable(item.id));
        }
        Ok(())
    }

    pub fn check_account_active(&self, account: &Account) -> Result<()> {
        if !account.active {
            debug!("Account {} is suspended", account.id);
            return Err(CirculationError::AccountSuspended(account.id));
        }
        Ok(())
    }

    /// Guard for destructive account operations.
    pub fn check_no_active_loans(&self, store: &Store<'_>, borrower: BorrowerId) -> Result<()> {
        if store.count_loans_with_status(borrower, &LoanStatus::ACTIVE)? > 0 {
            return Err(CirculationError::HasActiveLoans(borrower));
        }
        Ok(())
    }

    /// Human-readable verdict for a prospective loan, checking in the same
    /// order the borrow flow does.
    pub fn eligibility_reason(
        &self,
        store: &Store<'_>,
        borrower: BorrowerId,
        item: ItemId,
    ) -> Result<String> {
        let Some(account) = store.get_account(borrower)? else {
            return Ok(format!("Borrower {} does not exist", borrower));
        };
        let Some(item) = store.get_item(item)? else {
            return Ok(format!("Item {} does not exist", item));
        };

        let verdict = self
            .check_account_active(&account)
            .and_then(|_| self.check_no_outstanding_overdue(store, borrower))
            .and_then(|_| self.check_not_already_active(store, borrower, item.id))
            .and_then(|_| self.check_item_available(&item));

        match verdict {
            Ok(()) => Ok(format!("{} may borrow \"{}\"", account.name, item.title)),
            Err(e) if e.is_validation() => Ok(e.to_string()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, NewLoan};
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    fn setup() -> (Database, BorrowerId, ItemId) {
        let db = Database::open_in_memory().unwrap();
        let ids = db
            .atomically(|store| {
                let account = store.insert_account("Lin", &BTreeSet::new())?;
                let item = store.insert_item("Solaris")?;
                Ok((account.id, item.id))
            })
            .unwrap();
        (db, ids.0, ids.1)
    }

    #[test]
    fn overdue_loan_blocks_new_borrowing() {
        let (db, borrower, item) = setup();
        let policy = EligibilityPolicy::new();

        let mut loan = db
            .atomically(|store| store.create_loan(&NewLoan::starting(borrower, item, today(), 14)?))
            .unwrap();
        db.read(|store| policy.check_no_outstanding_overdue(store, borrower))
            .unwrap();

        loan.mark_overdue().unwrap();
        db.atomically(|store| store.save_loan(&loan)).unwrap();

        let err = db
            .read(|store| policy.check_no_outstanding_overdue(store, borrower))
            .unwrap_err();
        assert!(matches!(err, CirculationError::Overdue(b) if b == borrower));
    }

    #[test]
    fn active_pair_is_rejected_until_returned() {
        let (db, borrower, item) = setup();
        let policy = EligibilityPolicy::new();

        db.read(|store| policy.check_not_already_active(store, borrower, item))
            .unwrap();
        let mut loan = db
            .atomically(|store| store.create_loan(&NewLoan::starting(borrower, item, today(), 14)?))
            .unwrap();

        assert!(matches!(
            db.read(|store| policy.check_not_already_active(store, borrower, item)),
            Err(CirculationError::AlreadyBorrowed { .. })
        ));
        assert!(matches!(
            db.read(|store| policy.check_no_active_loans(store, borrower)),
            Err(CirculationError::HasActiveLoans(_))
        ));

        loan.close(today()).unwrap();
        db.atomically(|store| store.save_loan(&loan)).unwrap();
        db.read(|store| policy.check_not_already_active(store, borrower, item))
            .unwrap();
        db.read(|store| policy.check_no_active_loans(store, borrower))
            .unwrap();
    }

    #[test]
    fn unavailable_item_and_suspended_account_are_rejected() {
        let policy = EligibilityPolicy::new();
        let item = Item {
            id: 3,
            title: "Ubik".to_string(),
            available: false,
        };
        assert!(matches!(
            policy.check_item_available(&item),
            Err(CirculationError::NotAvailable(3))
        ));

        let account = Account {
            id: 8,
            name: "Sam".to_string(),
            active: false,
            roles: BTreeSet::new(),
        };
        assert!(matches!(
            policy.check_account_active(&account),
            Err(CirculationError::AccountSuspended(8))
        ));
    }

    #[test]
    fn reason_explains_the_first_failing_check() {
        let (db, borrower, item) = setup();
        let policy = EligibilityPolicy::new();

        let ok = db
            .read(|store| policy.eligibility_reason(store, borrower, item))
            .unwrap();
        assert_eq!(ok, "Lin may borrow \"Solaris\"");

        db.atomically(|store| store.set_account_active(borrower, false))
            .unwrap();
        let suspended = db
            .read(|store| policy.eligibility_reason(store, borrower, item))
            .unwrap();
        assert!(suspended.contains("suspended"));

        let missing = db
            .read(|store| policy.eligibility_reason(store, borrower, 404))
            .unwrap();
        assert_eq!(missing, "Item 404 does not exist");
    }
}
