use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::{CirculationError, Result};

pub type LoanId = i64;
pub type BorrowerId = i64;
pub type ItemId = i64;

/// Lifecycle state of a loan.
///
/// ```text
/// BORROWED ──sweep──> OVERDUE
///    │                   │
///    └──────return───────┴──> RETURNED_TIMELY | RETURNED_OVERDUE ──excuse──> RETURNED_EXCUSED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    Borrowed,
    Overdue,
    ReturnedTimely,
    ReturnedOverdue,
    ReturnedExcused,
}

impl LoanStatus {
    /// Statuses that hold the item and block a second loan of it.
    pub const ACTIVE: [LoanStatus; 2] = [LoanStatus::Borrowed, LoanStatus::Overdue];

    /// Statuses that count as a strike toward suspension.
    pub const OVERDUE_FAMILY: [LoanStatus; 2] = [LoanStatus::Overdue, LoanStatus::ReturnedOverdue];

    pub const RETURNED: [LoanStatus; 3] = [
        LoanStatus::ReturnedTimely,
        LoanStatus::ReturnedOverdue,
        LoanStatus::ReturnedExcused,
    ];

    pub const ALL: [LoanStatus; 5] = [
        LoanStatus::Borrowed,
        LoanStatus::Overdue,
        LoanStatus::ReturnedTimely,
        LoanStatus::ReturnedOverdue,
        LoanStatus::ReturnedExcused,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Borrowed => "BORROWED",
            LoanStatus::Overdue => "OVERDUE",
            LoanStatus::ReturnedTimely => "RETURNED_TIMELY",
            LoanStatus::ReturnedOverdue => "RETURNED_OVERDUE",
            LoanStatus::ReturnedExcused => "RETURNED_EXCUSED",
        }
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn is_returned(&self) -> bool {
        Self::RETURNED.contains(self)
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        LoanStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown loan status: {}", s))
    }
}

impl ToSql for LoanStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for LoanStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// A single lending of an item to a borrower. Loans are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub borrower_id: BorrowerId,
    pub item_id: ItemId,
    pub borrow_date: NaiveDate,
    pub due_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub status: LoanStatus,
}

impl Loan {
    /// Sweep transition: only a BORROWED loan can become OVERDUE.
    pub fn mark_overdue(&mut self) -> Result<()> {
        self.transition(LoanStatus::Borrowed, LoanStatus::Overdue)
    }

    /// Closes the loan as of `today`, choosing the timely or overdue outcome.
    pub fn close(&mut self, today: NaiveDate) -> Result<LoanStatus> {
        if self.status.is_returned() {
            return Err(CirculationError::AlreadyReturned(self.id));
        }

        self.status = if today <= self.due_date {
            LoanStatus::ReturnedTimely
        } else {
            LoanStatus::ReturnedOverdue
        };
        self.return_date = Some(today);

        Ok(self.status)
    }

    pub fn excuse(&mut self) -> Result<()> {
        if self.status != LoanStatus::ReturnedOverdue {
            return Err(CirculationError::NotExcusable {
                loan: self.id,
                status: self.status,
            });
        }
        self.status = LoanStatus::ReturnedExcused;
        Ok(())
    }

    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        let end = self.return_date.unwrap_or(today);
        (end - self.due_date).num_days().max(0)
    }

    fn transition(&mut self, from: LoanStatus, to: LoanStatus) -> Result<()> {
        if self.status != from {
            return Err(CirculationError::InvalidTransition {
                loan: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

/// A loan that has passed eligibility but has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoan {
    pub borrower_id: BorrowerId,
    pub item_id: ItemId,
    pub borrow_date: NaiveDate,
    pub due_date: NaiveDate,
}

impl NewLoan {
    pub fn starting(
        borrower_id: BorrowerId,
        item_id: ItemId,
        today: NaiveDate,
        loan_period_days: u32,
    ) -> Result<Self> {
        if loan_period_days == 0 {
            return Err(CirculationError::Config(
                "loan period must be at least one day".to_string(),
            ));
        }

        Ok(Self {
            borrower_id,
            item_id,
            borrow_date: today,
            due_date: today + Duration::days(i64::from(loan_period_days)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    pub available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Librarian,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Librarian => "librarian",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "member" => Ok(Role::Member),
            "librarian" => Ok(Role::Librarian),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: BorrowerId,
    pub name: String,
    pub active: bool,
    pub roles: BTreeSet<Role>,
}

impl Account {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}
