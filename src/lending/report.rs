use serde::Serialize;

use crate::{
    config::ReportConfig,
    error::Result,
    storage::{BorrowerId, Database, DatabaseStats, Loan, LoanFilter, LoanStatus, StatusFilter},
};

/// 1-based page coordinates requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub page_size: Option<usize>,
}

impl PageRequest {
    pub fn first() -> Self {
        Self {
            page: 1,
            page_size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> usize {
        if self.page_size == 0 {
            0
        } else {
            self.total.div_ceil(self.page_size)
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }
}

/// Read-only projections over the loan records.
///
/// The overdue report only sees loans the sweep has already promoted; a
/// BORROWED loan past its due date does not appear until the next sweep.
pub struct Reporter {
    db: Database,
    settings: ReportConfig,
}

impl Reporter {
    pub fn new(db: Database, settings: ReportConfig) -> Self {
        Self { db, settings }
    }

    /// OVERDUE loans, optionally for a single borrower.
    pub fn overdue_report(
        &self,
        borrower: Option<BorrowerId>,
        request: PageRequest,
    ) -> Result<Page<Loan>> {
        self.page(
            LoanFilter {
                borrower_id: borrower,
                status: StatusFilter::In(vec![LoanStatus::Overdue]),
            },
            request,
        )
    }

    /// Loans that have not been returned yet.
    pub fn open_loans(
        &self,
        borrower: Option<BorrowerId>,
        request: PageRequest,
    ) -> Result<Page<Loan>> {
        self.page(
            LoanFilter {
                borrower_id: borrower,
                status: StatusFilter::NotIn(LoanStatus::RETURNED.to_vec()),
            },
            request,
        )
    }

    pub fn stats(&self) -> Result<DatabaseStats> {
        self.db.read(|store| store.get_stats())
    }

    fn page(&self, filter: LoanFilter, request: PageRequest) -> Result<Page<Loan>> {
        let page = request.page.max(1);
        let page_size = request
            .page_size
            .unwrap_or(self.settings.default_page_size)
            .clamp(1, self.settings.max_page_size.max(1));
        let offset = (page - 1).saturating_mul(page_size);

        let (items, total) = self
            .db
            .read(|store| store.find_loans_page(&filter, offset, page_size))?;

        Ok(Page {
            items,
            page,
            page_size,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NewLoan;
    use chrono::{Duration, NaiveDate};
    use std::collections::BTreeSet;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()
    }

    /// Two borrowers; `overdue` loans each for the first, one for the second,
    /// plus one BORROWED loan that is not overdue.
    fn seeded(overdue: usize) -> (Database, BorrowerId, BorrowerId) {
        let db = Database::open_in_memory().unwrap();
        let ids = db
            .atomically(|store| {
                let a = store.insert_account("A", &BTreeSet::new())?.id;
                let b = store.insert_account("B", &BTreeSet::new())?.id;

                let open = |borrower: BorrowerId, offset: i64, late: bool| -> Result<()> {
                    let item = store.insert_item("copy")?;
                    let mut loan = store.create_loan(&NewLoan::starting(
                        borrower,
                        item.id,
                        start() + Duration::days(offset),
                        14,
                    )?)?;
                    if late {
                        loan.mark_overdue()?;
                        store.save_loan(&loan)?;
                    }
                    Ok(())
                };

                for n in 0..overdue {
                    open(a, n as i64, true)?;
                }
                open(b, 0, true)?;
                open(a, 100, false)?;
                Ok((a, b))
            })
            .unwrap();
        (db, ids.0, ids.1)
    }

    fn reporter(db: Database) -> Reporter {
        Reporter::new(
            db,
            ReportConfig {
                default_page_size: 2,
                max_page_size: 3,
            },
        )
    }

    #[test]
    fn overdue_report_pages_through_all_overdue_loans() {
        let (db, _, _) = seeded(4);
        let reporter = reporter(db);

        let first = reporter.overdue_report(None, PageRequest::first()).unwrap();
        assert_eq!(first.total, 5);
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.total_pages(), 3);
        assert!(first.has_next());
        assert!(first.items.iter().all(|l| l.status == LoanStatus::Overdue));

        let last = reporter
            .overdue_report(None, PageRequest { page: 3, page_size: None })
            .unwrap();
        assert_eq!(last.items.len(), 1);
        assert!(!last.has_next());
    }

    #[test]
    fn overdue_report_scopes_to_borrower() {
        let (db, a, b) = seeded(2);
        let reporter = reporter(db);

        let for_a = reporter.overdue_report(Some(a), PageRequest::first()).unwrap();
        assert_eq!(for_a.total, 2);
        assert!(for_a.items.iter().all(|l| l.borrower_id == a));

        let for_b = reporter.overdue_report(Some(b), PageRequest::first()).unwrap();
        assert_eq!(for_b.total, 1);
    }

    #[test]
    fn page_size_is_clamped() {
        let (db, _, _) = seeded(4);
        let reporter = reporter(db);

        let page = reporter
            .overdue_report(None, PageRequest { page: 0, page_size: Some(50) })
            .unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 3);
        assert_eq!(page.items.len(), 3);
    }

    #[test]
    fn open_loans_include_borrowed_and_overdue() {
        let (db, a, _) = seeded(1);
        let reporter = reporter(db);

        let open = reporter
            .open_loans(Some(a), PageRequest { page: 1, page_size: Some(3) })
            .unwrap();
        assert_eq!(open.total, 2);

        let stats = reporter.stats().unwrap();
        assert_eq!(stats.total_loans, 3);
        assert_eq!(stats.loans_by_status.get(&LoanStatus::Overdue), Some(&2));
        assert_eq!(stats.items_on_loan, 0);
    }
}
