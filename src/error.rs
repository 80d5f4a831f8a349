use chrono::NaiveDate;
use thiserror::Error;

use crate::storage::models::{BorrowerId, ItemId, LoanId, LoanStatus};

#[derive(Error, Debug)]
pub enum CirculationError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Borrower {borrower} already has an active loan of item {item}")]
    AlreadyBorrowed { borrower: BorrowerId, item: ItemId },

    #[error("Item {0} is not available for lending")]
    NotAvailable(ItemId),

    #[error("Borrower {0} has an outstanding overdue loan")]
    Overdue(BorrowerId),

    #[error("Loan {0} has already been returned")]
    AlreadyReturned(LoanId),

    #[error("Loan {loan} cannot be excused from status {status}")]
    NotExcusable { loan: LoanId, status: LoanStatus },

    #[error("Borrower {0} still holds active loans")]
    HasActiveLoans(BorrowerId),

    #[error("Account {0} is suspended")]
    AccountSuspended(BorrowerId),

    #[error("Loan {loan} cannot move from {from} to {to}")]
    InvalidTransition {
        loan: LoanId,
        from: LoanStatus,
        to: LoanStatus,
    },

    #[error("Sweep date {as_of} is after today ({today})")]
    SweepInFuture { as_of: NaiveDate, today: NaiveDate },

    #[error("Administrative secret rejected")]
    Unauthorized,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CirculationError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Validation failures are reported verbatim to the caller and never retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::AlreadyBorrowed { .. }
                | Self::NotAvailable(_)
                | Self::Overdue(_)
                | Self::AlreadyReturned(_)
                | Self::NotExcusable { .. }
                | Self::HasActiveLoans(_)
                | Self::AccountSuspended(_)
                | Self::InvalidTransition { .. }
                | Self::SweepInFuture { .. }
                | Self::Unauthorized
        )
    }
}

pub type Result<T> = std::result::Result<T, CirculationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_are_validation_failures() {
        assert!(CirculationError::AlreadyReturned(3).is_validation());
        assert!(CirculationError::not_found("loan", 9).is_validation());
        assert!(!CirculationError::Config("bad".to_string()).is_validation());
    }

    #[test]
    fn messages_name_the_offending_record() {
        let err = CirculationError::NotExcusable {
            loan: 7,
            status: LoanStatus::ReturnedTimely,
        };
        assert_eq!(
            err.to_string(),
            "Loan 7 cannot be excused from status RETURNED_TIMELY"
        );
        assert_eq!(
            CirculationError::not_found("item", 4).to_string(),
            "item not found: 4"
        );
    }
}
