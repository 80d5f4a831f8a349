use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    error::{CirculationError, Result},
    storage::models::{
        Account, BorrowerId, Item, ItemId, Loan, LoanId, LoanStatus, NewLoan, Role,
    },
};

const LOAN_COLUMNS: &str =
    "id, borrower_id, item_id, borrow_date, due_date, return_date, status";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS accounts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        active INTEGER NOT NULL DEFAULT 1
    );

    CREATE TABLE IF NOT EXISTS account_roles (
        account_id INTEGER NOT NULL REFERENCES accounts(id),
        role TEXT NOT NULL,
        PRIMARY KEY (account_id, role)
    );

    CREATE TABLE IF NOT EXISTS items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        available INTEGER NOT NULL DEFAULT 1
    );

    CREATE TABLE IF NOT EXISTS loans (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        borrower_id INTEGER NOT NULL REFERENCES accounts(id),
        item_id INTEGER NOT NULL REFERENCES items(id),
        borrow_date TEXT NOT NULL,
        due_date TEXT NOT NULL,
        return_date TEXT,
        status TEXT NOT NULL,
        penalty_cleared INTEGER NOT NULL DEFAULT 0,
        CHECK (due_date > borrow_date),
        CHECK ((return_date IS NULL) = (status IN ('BORROWED', 'OVERDUE')))
    );

    -- At most one BORROWED/OVERDUE loan per (borrower, item).
    CREATE UNIQUE INDEX IF NOT EXISTS ux_loans_active_pair
        ON loans(borrower_id, item_id)
        WHERE status IN ('BORROWED', 'OVERDUE');

    CREATE INDEX IF NOT EXISTS idx_loans_status_due ON loans(status, due_date);
    CREATE INDEX IF NOT EXISTS idx_loans_borrower_status ON loans(borrower_id, status);
";

/// Shared handle to the circulation database.
///
/// All access goes through one connection, so concurrent units of work take
/// turns at it. [`Database::atomically`] wraps a unit of work in an immediate
/// transaction so the loan, item and account writes it performs land together
/// or not at all.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `work` inside a single transaction, committing only if it succeeds.
    pub fn atomically<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&Store<'_>) -> Result<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = work(&Store { conn: &tx })?;
        tx.commit()?;
        Ok(value)
    }

    /// Run read-only `work` against the current committed state.
    pub fn read<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&Store<'_>) -> Result<T>,
    {
        let conn = self.lock()?;
        work(&Store { conn: &conn })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CirculationError::Other(anyhow::anyhow!("database lock poisoned")))
    }
}

/// Which loan statuses a paginated query keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusFilter {
    In(Vec<LoanStatus>),
    NotIn(Vec<LoanStatus>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanFilter {
    pub borrower_id: Option<BorrowerId>,
    pub status: StatusFilter,
}

/// Record store operations available inside a unit of work.
pub struct Store<'c> {
    conn: &'c Connection,
}

impl<'c> Store<'c> {
    // ---- accounts ----

    pub fn insert_account(&self, name: &str, roles: &BTreeSet<Role>) -> Result<Account> {
        self.conn.execute(
            "INSERT INTO accounts (name, active) VALUES (?1, 1)",
            params![name],
        )?;
        let id = self.conn.last_insert_rowid();

        for role in roles {
            self.conn.execute(
                "INSERT INTO account_roles (account_id, role) VALUES (?1, ?2)",
                params![id, role],
            )?;
        }

        Ok(Account {
            id,
            name: name.to_string(),
            active: true,
            roles: roles.clone(),
        })
    }

    pub fn get_account(&self, id: BorrowerId) -> Result<Option<Account>> {
        let account = self
            .conn
            .query_row(
                "SELECT id, name, active FROM accounts WHERE id = ?1",
                [id],
                |row| {
                    Ok(Account {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        active: row.get(2)?,
                        roles: BTreeSet::new(),
                    })
                },
            )
            .optional()?;

        let Some(mut account) = account else {
            return Ok(None);
        };

        let mut stmt = self
            .conn
            .prepare("SELECT role FROM account_roles WHERE account_id = ?1")?;
        account.roles = stmt
            .query_map([id], |row| row.get::<_, Role>(0))?
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;

        Ok(Some(account))
    }

    pub fn set_account_active(&self, id: BorrowerId, active: bool) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE accounts SET active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        if changed == 0 {
            return Err(CirculationError::not_found("account", id));
        }
        Ok(())
    }

    pub fn is_deactivated(&self, id: BorrowerId) -> Result<bool> {
        let active: Option<bool> = self
            .conn
            .query_row("SELECT active FROM accounts WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        active
            .map(|active| !active)
            .ok_or_else(|| CirculationError::not_found("account", id))
    }

    // ---- items ----

    pub fn insert_item(&self, title: &str) -> Result<Item> {
        self.conn.execute(
            "INSERT INTO items (title, available) VALUES (?1, 1)",
            params![title],
        )?;
        Ok(Item {
            id: self.conn.last_insert_rowid(),
            title: title.to_string(),
            available: true,
        })
    }

    pub fn get_item(&self, id: ItemId) -> Result<Option<Item>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, title, available FROM items WHERE id = ?1",
                [id],
                |row| {
                    Ok(Item {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        available: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn set_item_available(&self, id: ItemId, available: bool) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE items SET available = ?1 WHERE id = ?2",
            params![available, id],
        )?;
        if changed == 0 {
            return Err(CirculationError::not_found("item", id));
        }
        Ok(())
    }

    // ---- loans ----

    /// Insert a BORROWED loan. A concurrent duplicate for the same pair is
    /// rejected by `ux_loans_active_pair` and reported as `AlreadyBorrowed`.
    pub fn create_loan(&self, loan: &NewLoan) -> Result<Loan> {
        let inserted = self.conn.execute(
            "INSERT INTO loans (borrower_id, item_id, borrow_date, due_date, return_date, status)
             VALUES (?1, ?2, ?3, ?4, NULL, ?5)",
            params![
                loan.borrower_id,
                loan.item_id,
                loan.borrow_date,
                loan.due_date,
                LoanStatus::Borrowed,
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(CirculationError::AlreadyBorrowed {
                    borrower: loan.borrower_id,
                    item: loan.item_id,
                });
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Loan {
            id: self.conn.last_insert_rowid(),
            borrower_id: loan.borrower_id,
            item_id: loan.item_id,
            borrow_date: loan.borrow_date,
            due_date: loan.due_date,
            return_date: None,
            status: LoanStatus::Borrowed,
        })
    }

    pub fn get_loan(&self, id: LoanId) -> Result<Option<Loan>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {} FROM loans WHERE id = ?1", LOAN_COLUMNS),
                [id],
                loan_from_row,
            )
            .optional()?)
    }

    /// Persist the mutable part of a loan (status and return date).
    pub fn save_loan(&self, loan: &Loan) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE loans SET status = ?1, return_date = ?2 WHERE id = ?3",
            params![loan.status, loan.return_date, loan.id],
        )?;
        if changed == 0 {
            return Err(CirculationError::not_found("loan", loan.id));
        }
        Ok(())
    }

    /// Persist several loans, reporting each outcome separately.
    pub fn save_loans(&self, loans: &[Loan]) -> Vec<(LoanId, Result<()>)> {
        loans
            .iter()
            .map(|loan| {
                let outcome = self.save_loan(loan);
                if let Err(e) = &outcome {
                    warn!("Failed to save loan {}: {}", loan.id, e);
                }
                (loan.id, outcome)
            })
            .collect()
    }

    pub fn exists_active_loan(&self, borrower: BorrowerId, item: ItemId) -> Result<bool> {
        Ok(self.conn.query_row(
            "SELECT EXISTS(
                 SELECT 1 FROM loans
                 WHERE borrower_id = ?1 AND item_id = ?2 AND status IN (?3, ?4)
             )",
            params![borrower, item, LoanStatus::Borrowed, LoanStatus::Overdue],
            |row| row.get(0),
        )?)
    }

    pub fn exists_loan_with_status(&self, borrower: BorrowerId, status: LoanStatus) -> Result<bool> {
        Ok(self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM loans WHERE borrower_id = ?1 AND status = ?2)",
            params![borrower, status],
            |row| row.get(0),
        )?)
    }

    pub fn count_loans_with_status(
        &self,
        borrower: BorrowerId,
        statuses: &[LoanStatus],
    ) -> Result<usize> {
        if statuses.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "SELECT COUNT(*) FROM loans WHERE borrower_id = ? AND status IN ({})",
            placeholders(statuses.len())
        );
        let mut values = vec![Value::Integer(borrower)];
        values.extend(statuses.iter().map(status_value));

        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Overdue strikes held against `borrower`: loans currently OVERDUE or
    /// RETURNED_OVERDUE, plus excused late returns not yet cleared by a
    /// reactivation.
    pub fn count_overdue_strikes(&self, borrower: BorrowerId) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM loans
             WHERE borrower_id = ?1
               AND (status IN (?2, ?3) OR (status = ?4 AND penalty_cleared = 0))",
            params![
                borrower,
                LoanStatus::OVERDUE_FAMILY[0],
                LoanStatus::OVERDUE_FAMILY[1],
                LoanStatus::ReturnedExcused
            ],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Marks every excused loan of `borrower` as no longer counting toward
    /// suspension. Returns the number of loans cleared.
    pub fn clear_penalties(&self, borrower: BorrowerId) -> Result<usize> {
        Ok(self.conn.execute(
            "UPDATE loans SET penalty_cleared = 1
             WHERE borrower_id = ?1 AND status = ?2 AND penalty_cleared = 0",
            params![borrower, LoanStatus::ReturnedExcused],
        )?)
    }

    /// Loans in `status` whose due date is strictly before `as_of`, keyed
    /// after `after_id` so callers can walk the set in bounded chunks.
    pub fn find_loans_past_due(
        &self,
        status: LoanStatus,
        as_of: NaiveDate,
        after_id: LoanId,
        limit: usize,
    ) -> Result<Vec<Loan>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM loans
             WHERE status = ?1 AND due_date < ?2 AND id > ?3
             ORDER BY id
             LIMIT ?4",
            LOAN_COLUMNS
        ))?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let loans = stmt
            .query_map(params![status, as_of, after_id, limit], loan_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(loans)
    }

    pub fn find_loans_by_borrower_and_status(
        &self,
        borrower: BorrowerId,
        status: LoanStatus,
    ) -> Result<Vec<Loan>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM loans WHERE borrower_id = ?1 AND status = ?2 ORDER BY id",
            LOAN_COLUMNS
        ))?;

        let loans = stmt
            .query_map(params![borrower, status], loan_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(loans)
    }

    /// One page of loans matching `filter`, plus the total number of matches.
    pub fn find_loans_page(
        &self,
        filter: &LoanFilter,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Loan>, usize)> {
        let (statuses, negate) = match &filter.status {
            StatusFilter::In(statuses) => (statuses, false),
            StatusFilter::NotIn(statuses) => (statuses, true),
        };

        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(borrower) = filter.borrower_id {
            clauses.push("borrower_id = ?".to_string());
            values.push(Value::Integer(borrower));
        }
        if !statuses.is_empty() {
            clauses.push(format!(
                "status {} IN ({})",
                if negate { "NOT" } else { "" },
                placeholders(statuses.len())
            ));
            values.extend(statuses.iter().map(status_value));
        } else if !negate {
            // IN () matches nothing
            return Ok((Vec::new(), 0));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM loans {}", where_clause),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let mut page_values = values;
        page_values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        page_values.push(Value::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM loans {} ORDER BY due_date, id LIMIT ? OFFSET ?",
            LOAN_COLUMNS, where_clause
        ))?;
        let loans = stmt
            .query_map(params_from_iter(page_values.iter()), loan_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!("Loan page: {} of {} rows (offset {})", loans.len(), total, offset);

        Ok((loans, usize::try_from(total).unwrap_or(0)))
    }

    // ---- statistics ----

    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM loans GROUP BY status")?;
        let loans_by_status = stmt
            .query_map([], |row| Ok((row.get::<_, LoanStatus>(0)?, row.get::<_, i64>(1)?)))?
            .map(|row| row.map(|(status, count)| (status, usize::try_from(count).unwrap_or(0))))
            .collect::<std::result::Result<BTreeMap<LoanStatus, usize>, _>>()?;

        let total_items: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        let items_on_loan: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM items WHERE available = 0",
            [],
            |row| row.get(0),
        )?;
        let total_accounts: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
        let suspended_accounts: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM accounts WHERE active = 0",
            [],
            |row| row.get(0),
        )?;

        Ok(DatabaseStats {
            total_loans: loans_by_status.values().sum(),
            loans_by_status,
            total_items: usize::try_from(total_items).unwrap_or(0),
            items_on_loan: usize::try_from(items_on_loan).unwrap_or(0),
            total_accounts: usize::try_from(total_accounts).unwrap_or(0),
            suspended_accounts: usize::try_from(suspended_accounts).unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub total_loans: usize,
    pub loans_by_status: BTreeMap<LoanStatus, usize>,
    pub total_items: usize,
    pub items_on_loan: usize,
    pub total_accounts: usize,
    pub suspended_accounts: usize,
}

fn loan_from_row(row: &Row<'_>) -> rusqlite::Result<Loan> {
    Ok(Loan {
        id: row.get(0)?,
        borrower_id: row.get(1)?,
        item_id: row.get(2)?,
        borrow_date: row.get(3)?,
        due_date: row.get(4)?,
        return_date: row.get(5)?,
        status: row.get(6)?,
    })
}

fn status_value(status: &LoanStatus) -> Value {
    Value::Text(status.as_str().to_string())
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seeded() -> (Database, Account, Item) {
        let db = Database::open_in_memory().unwrap();
        let (account, item) = db
            .atomically(|store| {
                let roles = BTreeSet::from([Role::Member]);
                Ok((store.insert_account("Ada", &roles)?, store.insert_item("Dune")?))
            })
            .unwrap();
        (db, account, item)
    }

    #[test]
    fn account_roles_are_a_set() {
        let db = Database::open_in_memory().unwrap();
        let roles = BTreeSet::from([Role::Admin, Role::Librarian]);
        let id = db
            .atomically(|store| Ok(store.insert_account("Grace", &roles)?.id))
            .unwrap();

        let account = db.read(|store| store.get_account(id)).unwrap().unwrap();
        assert!(account.has_role(Role::Admin));
        assert!(!account.has_role(Role::Member));
        assert_eq!(account.roles, roles);
    }

    #[test]
    fn unique_index_rejects_second_active_loan_for_pair() {
        let (db, account, item) = seeded();
        let today = date(2026, 5, 1);
        let new_loan = NewLoan::starting(account.id, item.id, today, 14).unwrap();

        db.atomically(|store| store.create_loan(&new_loan)).unwrap();
        let err = db.atomically(|store| store.create_loan(&new_loan)).unwrap_err();

        assert!(matches!(err, CirculationError::AlreadyBorrowed { .. }));
    }

    #[test]
    fn returned_loan_frees_the_pair_for_a_new_loan() {
        let (db, account, item) = seeded();
        let today = date(2026, 5, 1);
        let new_loan = NewLoan::starting(account.id, item.id, today, 14).unwrap();

        let mut loan = db.atomically(|store| store.create_loan(&new_loan)).unwrap();
        loan.close(today).unwrap();
        db.atomically(|store| store.save_loan(&loan)).unwrap();

        assert!(db.atomically(|store| store.create_loan(&new_loan)).is_ok());
    }

    #[test]
    fn failed_unit_of_work_rolls_back() {
        let (db, account, item) = seeded();

        let result: Result<()> = db.atomically(|store| {
            store.set_item_available(item.id, false)?;
            store.set_account_active(account.id, false)?;
            Err(CirculationError::Unauthorized)
        });

        assert!(result.is_err());
        let item = db.read(|store| store.get_item(item.id)).unwrap().unwrap();
        assert!(item.available);
        assert!(!db.read(|store| store.is_deactivated(account.id)).unwrap());
    }

    #[test]
    fn past_due_query_walks_in_chunks() {
        let db = Database::open_in_memory().unwrap();
        let today = date(2026, 5, 20);
        db.atomically(|store| {
            let account = store.insert_account("Ada", &BTreeSet::new())?;
            for days_ago in [30, 25, 20, 3] {
                let item = store.insert_item("copy")?;
                let loan = NewLoan::starting(
                    account.id,
                    item.id,
                    today - Duration::days(days_ago),
                    14,
                )?;
                store.create_loan(&loan)?;
            }
            Ok(())
        })
        .unwrap();

        let first = db
            .read(|store| store.find_loans_past_due(LoanStatus::Borrowed, today, 0, 2))
            .unwrap();
        assert_eq!(first.len(), 2);
        let last_id = first.last().unwrap().id;

        let rest = db
            .read(|store| store.find_loans_past_due(LoanStatus::Borrowed, today, last_id, 2))
            .unwrap();
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn page_filter_supports_status_not_in() {
        let (db, account, item) = seeded();
        let today = date(2026, 5, 1);
        let mut loan = db
            .atomically(|store| {
                store.create_loan(&NewLoan::starting(account.id, item.id, today, 7)?)
            })
            .unwrap();
        loan.close(today).unwrap();
        db.atomically(|store| store.save_loan(&loan)).unwrap();
        db.atomically(|store| {
            store.create_loan(&NewLoan::starting(account.id, item.id, today, 7)?)
        })
        .unwrap();

        let open = LoanFilter {
            borrower_id: Some(account.id),
            status: StatusFilter::NotIn(LoanStatus::RETURNED.to_vec()),
        };
        let (loans, total) = db.read(|store| store.find_loans_page(&open, 0, 10)).unwrap();
        assert_eq!(total, 1);
        assert_eq!(loans[0].status, LoanStatus::Borrowed);

        let nothing = LoanFilter {
            borrower_id: None,
            status: StatusFilter::In(Vec::new()),
        };
        assert_eq!(db.read(|store| store.find_loans_page(&nothing, 0, 10)).unwrap().1, 0);
    }

    #[test]
    fn strikes_cover_overdue_family_and_uncleared_excuses() {
        let db = Database::open_in_memory().unwrap();
        let today = date(2026, 5, 20);
        let borrower = db
            .atomically(|store| {
                let account = store.insert_account("Ada", &BTreeSet::new())?;
                for _ in 0..4 {
                    let item = store.insert_item("copy")?;
                    store.create_loan(&NewLoan::starting(account.id, item.id, today, 14)?)?;
                }
                Ok(account.id)
            })
            .unwrap();

        let mut loans: Vec<Loan> = db
            .read(|store| store.find_loans_by_borrower_and_status(borrower, LoanStatus::Borrowed))
            .unwrap();
        loans.sort_by_key(|loan| loan.id);
        let late = today + Duration::days(20);

        loans[0].mark_overdue().unwrap();
        loans[1].close(late).unwrap();
        loans[2].close(late).unwrap();
        loans[2].excuse().unwrap();
        loans[3].close(today).unwrap();
        db.atomically(|store| {
            for loan in &loans {
                store.save_loan(loan)?;
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(db.read(|store| store.count_overdue_strikes(borrower)).unwrap(), 3);

        let cleared = db.atomically(|store| store.clear_penalties(borrower)).unwrap();
        assert_eq!(cleared, 1);
        assert_eq!(db.read(|store| store.count_overdue_strikes(borrower)).unwrap(), 2);
    }

    #[test]
    fn missing_records_report_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.atomically(|store| store.set_item_available(99, true)),
            Err(CirculationError::NotFound { entity: "item", id: 99 })
        ));
        assert!(matches!(
            db.read(|store| store.is_deactivated(5)),
            Err(CirculationError::NotFound { entity: "account", .. })
        ));
    }
}
