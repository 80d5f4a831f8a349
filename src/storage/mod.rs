pub mod db;
pub mod models;

pub use db::{Database, DatabaseStats, LoanFilter, StatusFilter, Store};
pub use models::{Account, BorrowerId, Item, ItemId, Loan, LoanId, LoanStatus, NewLoan, Role};
