use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use circulation_engine::storage::Role;

#[derive(Parser)]
#[command(name = "circulation")]
#[command(about = "Loan lifecycle engine for a lending catalog")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (without extension)
    #[arg(short, long, global = true, default_value = "config/default")]
    pub config: String,

    /// Administrative secret, required by admin-only commands
    #[arg(long, global = true, env = "CIRCULATION_ADMIN_SECRET", hide_env_values = true)]
    pub secret: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Manage borrower accounts
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },

    /// Manage catalog items
    Item {
        #[command(subcommand)]
        action: ItemAction,
    },

    /// Lend an item to a borrower
    Borrow {
        borrower: i64,
        item: i64,
    },

    /// Explain whether a borrower may borrow an item
    Check {
        borrower: i64,
        item: i64,
    },

    /// Return a single loan
    Return {
        loan: i64,
    },

    /// Return several loans at once; loans that cannot be returned are skipped
    ReturnMany {
        #[arg(required = true, value_delimiter = ',')]
        loans: Vec<i64>,
    },

    /// Excuse a loan that was returned late (admin)
    Excuse {
        loan: i64,
    },

    /// Promote past-due loans to OVERDUE (admin)
    Sweep {
        /// Judge due dates against this earlier date instead of today
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// Run the overdue sweep periodically (admin)
    Auto {
        /// Sweep interval in seconds (defaults to service.sweep_interval_secs)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Paginated loan reports
    Report {
        #[command(subcommand)]
        kind: ReportKind,
    },

    /// Show statistics
    Stats {
        /// Output format: table or json
        #[arg(short, long, default_value = "table")]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum AccountAction {
    /// Register a borrower account
    Add {
        name: String,

        /// Roles held by the account (repeatable)
        #[arg(short, long = "role", default_value = "member")]
        roles: Vec<Role>,
    },

    /// Show an account and its roles
    Show {
        id: i64,
    },

    /// Suspend an account (admin)
    Suspend {
        id: i64,
    },

    /// Reactivate a suspended account and pardon its overdue returns (admin)
    Reactivate {
        id: i64,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum ItemAction {
    /// Add an item to the catalog
    Add {
        title: String,
    },
}

#[derive(Subcommand)]
pub enum ReportKind {
    /// Loans currently OVERDUE
    Overdue {
        #[command(flatten)]
        page: PageArgs,
    },

    /// Loans not yet returned
    Open {
        #[command(flatten)]
        page: PageArgs,
    },
}

#[derive(clap::Args)]
pub struct PageArgs {
    /// Only loans of this borrower
    #[arg(short, long)]
    pub borrower: Option<i64>,

    /// Page number, starting at 1
    #[arg(short, long, default_value = "1")]
    pub page: usize,

    /// Rows per page
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Output format: table or json
    #[arg(short, long, default_value = "table")]
    pub format: String,
}
