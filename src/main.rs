mod cli;

use std::collections::BTreeSet;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use tracing::{error, info, warn};

use circulation_engine::{
    config::Config,
    error::{self, CirculationError},
    lending::{
        BulkReturnProcessor, Clock, EligibilityPolicy, LifecycleEngine, Page,
        PageRequest, Reporter, SystemClock,
    },
    storage::{Database, Loan, Role},
    utils,
};
use cli::{AccountAction, Cli, Commands, ItemAction, PageArgs, ReportKind};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "circulation=debug,circulation_engine=debug,info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match Config::load_from(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = run(&config, cli).await;

    if let Err(e) = result {
        error!("{}", format!("Error: {}", e).red());
        std::process::exit(if e.is_validation() { 2 } else { 1 });
    }
}

async fn run(config: &Config, cli: Cli) -> error::Result<()> {
    let secret = cli.secret.as_deref();

    match cli.command {
        Commands::Init => initialize(config),

        Commands::Account { action } => match action {
            AccountAction::Add { name, roles } => add_account(config, &name, roles),
            AccountAction::Show { id } => show_account(config, id),
            AccountAction::Suspend { id } => {
                config.authorize_admin(secret)?;
                let engine = engine(config, Arc::new(SystemClock))?;
                engine.suspend_account(id).await?;
                println!("{}", format!("Account {} suspended", id).yellow());
                Ok(())
            }
            AccountAction::Reactivate { id, yes } => {
                config.authorize_admin(secret)?;
                reactivate_account(config, id, yes).await
            }
        },

        Commands::Item {
            action: ItemAction::Add { title },
        } => add_item(config, &title),

        Commands::Borrow { borrower, item } => {
            info!("Lending item {} to borrower {}", item, borrower);
            let engine = engine(config, Arc::new(SystemClock))?;
            let loan = engine.borrow(borrower, item).await?;
            println!("✓ Loan {} created, due {}", loan.id, utils::format_date(&loan.due_date));
            Ok(())
        }

        Commands::Check { borrower, item } => {
            let db = Database::new(&config.database.path)?;
            let policy = EligibilityPolicy::new();
            let reason = db.read(|store| policy.eligibility_reason(store, borrower, item))?;
            println!("Eligibility: {}", reason);
            Ok(())
        }

        Commands::Return { loan } => {
            let engine = engine(config, Arc::new(SystemClock))?;
            let receipt = engine.return_loan(loan).await?;
            println!(
                "✓ Loan {} returned: {}",
                receipt.loan.id,
                utils::format_status(receipt.loan.status)
            );
            if receipt.account_suspended {
                println!(
                    "{}",
                    format!("Account {} has been suspended", receipt.loan.borrower_id).red()
                );
            }
            Ok(())
        }

        Commands::ReturnMany { loans } => return_many(config, &loans).await,

        Commands::Excuse { loan } => {
            config.authorize_admin(secret)?;
            let engine = engine(config, Arc::new(SystemClock))?;
            let loan = engine.excuse(loan).await?;
            println!("✓ Loan {} is now {}", loan.id, utils::format_status(loan.status));
            Ok(())
        }

        Commands::Sweep { as_of } => {
            config.authorize_admin(secret)?;
            let engine = engine(config, Arc::new(SystemClock))?;
            let as_of = as_of.unwrap_or_else(|| engine.today());
            let summary = engine.sweep_overdue_as_of(as_of).await?;
            println!("\n{}", "=== Overdue Sweep ===".cyan().bold());
            println!("Scanned:   {}", summary.scanned);
            println!("Promoted:  {}", summary.promoted.to_string().red());
            println!("Failed:    {}", summary.failed);
            Ok(())
        }

        Commands::Auto { interval } => {
            config.authorize_admin(secret)?;
            let interval = interval.unwrap_or(config.service.sweep_interval_secs);
            info!("Starting overdue sweep service (interval: {}s)", interval);
            run_sweep_service(config, interval).await
        }

        Commands::Report { kind } => {
            let reporter = Reporter::new(Database::new(&config.database.path)?, config.report);
            match kind {
                ReportKind::Overdue { page } => {
                    let result = reporter.overdue_report(page.borrower, page_request(&page))?;
                    print_loans("Overdue Loans", &result, &page.format)
                }
                ReportKind::Open { page } => {
                    let result = reporter.open_loans(page.borrower, page_request(&page))?;
                    print_loans("Open Loans", &result, &page.format)
                }
            }
        }

        Commands::Stats { format } => show_stats(config, &format),
    }
}

fn engine(config: &Config, clock: Arc<dyn Clock>) -> error::Result<LifecycleEngine> {
    let db = Database::new(&config.database.path)?;
    Ok(LifecycleEngine::new(db, clock, config.circulation))
}

fn page_request(args: &PageArgs) -> PageRequest {
    PageRequest {
        page: args.page,
        page_size: args.page_size,
    }
}

fn initialize(config: &Config) -> error::Result<()> {
    println!("{}", "Initializing circulation database...".green());
    let _db = Database::new(&config.database.path)?;
    println!("{}", "✓ Database initialized".green());
    println!("{}", "✓ Configuration loaded".green());
    println!("\n{}", "Configuration:".cyan());
    println!("  Database:          {}", config.database.path);
    println!("  Loan period:       {} days", config.circulation.loan_period_days);
    println!("  Suspend after:     {} overdue returns", config.circulation.suspension_threshold);
    println!("  Sweep chunk size:  {}", config.circulation.sweep_chunk_size);
    println!("  Sweep interval:    {}s", config.service.sweep_interval_secs);
    println!(
        "  Admin secret:      {}",
        if config.admin.bootstrap_secret.is_some() { "configured" } else { "not set" }
    );
    Ok(())
}

fn add_account(config: &Config, name: &str, roles: Vec<Role>) -> error::Result<()> {
    let db = Database::new(&config.database.path)?;
    let roles: BTreeSet<_> = roles.into_iter().collect();
    let account = db.atomically(|store| store.insert_account(name, &roles))?;
    println!("✓ Account {} created for {}", account.id, account.name);
    Ok(())
}

fn show_account(config: &Config, id: i64) -> error::Result<()> {
    let db = Database::new(&config.database.path)?;
    let account = db
        .read(|store| store.get_account(id))?
        .ok_or_else(|| CirculationError::not_found("account", id))?;

    let roles: Vec<&str> = account.roles.iter().map(|r| r.as_str()).collect();
    println!("Account:  {}", account.id);
    println!("Name:     {}", account.name);
    println!(
        "Status:   {}",
        if account.active { "active".green() } else { "suspended".red() }
    );
    println!("Roles:    {}", roles.join(", "));
    Ok(())
}

fn add_item(config: &Config, title: &str) -> error::Result<()> {
    let db = Database::new(&config.database.path)?;
    let item = db.atomically(|store| store.insert_item(title))?;
    println!("✓ Item {} added: {}", item.id, item.title);
    Ok(())
}

async fn reactivate_account(config: &Config, id: i64, yes: bool) -> error::Result<()> {
    if !yes && !utils::confirm_action(&format!(
        "Reactivate account {} and pardon its overdue returns?",
        id
    )) {
        println!("Cancelled");
        return Ok(());
    }

    let engine = engine(config, Arc::new(SystemClock))?;
    let pardoned = engine.reactivate_account(id).await?;
    println!("✓ Account {} active", id);
    println!("Pardoned loans: {}", pardoned.len());
    Ok(())
}

async fn return_many(config: &Config, loans: &[i64]) -> error::Result<()> {
    let engine = engine(config, Arc::new(SystemClock))?;
    let processor = BulkReturnProcessor::new(engine, config.circulation.bulk_concurrency);
    let receipts = processor.return_many(loans).await;

    println!("\n{}", "=== Bulk Return ===".cyan().bold());
    println!("Requested:  {}", loans.len());
    println!("Returned:   {} ✓", receipts.len().to_string().green());

    for receipt in &receipts {
        println!(
            "  loan {:<8} {}",
            receipt.loan.id,
            utils::format_status(receipt.loan.status)
        );
        if receipt.account_suspended {
            warn!("Account {} suspended by bulk return", receipt.loan.borrower_id);
        }
    }
    Ok(())
}

async fn run_sweep_service(config: &Config, interval: u64) -> error::Result<()> {
    println!("{}", "Starting overdue sweep service...".green());
    println!("Interval: {} seconds", interval);

    let engine = engine(config, Arc::new(SystemClock))?;
    let mut ticker = tokio::time::interval(tokio::time::Duration::from_secs(interval.max(1)));

    loop {
        ticker.tick().await;
        info!("Running overdue sweep...");

        match engine.sweep_overdue().await {
            Ok(summary) if summary.failed > 0 => {
                warn!(
                    "Sweep promoted {} loans, {} could not be updated",
                    summary.promoted, summary.failed
                );
            }
            Ok(summary) => info!("Sweep promoted {} loans", summary.promoted),
            Err(e) => error!("Sweep failed: {}", e),
        }
    }
}

fn print_loans(title: &str, page: &Page<Loan>, format: &str) -> error::Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(page)?);
        return Ok(());
    }

    println!(
        "\n{} (page {} of {}, {} total)",
        title.yellow(),
        page.page,
        page.total_pages().max(1),
        page.total
    );
    let widths = [8, 10, 8, 12, 12, 12, 18];
    utils::print_table_border(92);
    utils::print_table_row(
        &["Loan", "Borrower", "Item", "Borrowed", "Due", "Returned", "Status"],
        &widths,
    );
    utils::print_table_border(92);

    for loan in &page.items {
        utils::print_table_row(
            &[
                &loan.id.to_string(),
                &loan.borrower_id.to_string(),
                &loan.item_id.to_string(),
                &utils::format_date(&loan.borrow_date),
                &utils::format_date(&loan.due_date),
                &utils::format_optional_date(loan.return_date.as_ref()),
                &utils::format_status(loan.status),
            ],
            &widths,
        );
    }
    utils::print_table_border(92);
    Ok(())
}

fn show_stats(config: &Config, format: &str) -> error::Result<()> {
    let reporter = Reporter::new(Database::new(&config.database.path)?, config.report);
    let stats = reporter.stats()?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{}", "=== Circulation Statistics ===".cyan().bold());
    println!("\nLoans:");
    println!("  Total:      {}", stats.total_loans);
    for (status, count) in &stats.loans_by_status {
        println!("  {:<18} {}", utils::format_status(*status), count);
    }

    println!("\nItems:");
    println!("  Total:      {}", stats.total_items);
    println!("  On loan:    {}", stats.items_on_loan.to_string().yellow());

    println!("\nAccounts:");
    println!("  Total:      {}", stats.total_accounts);
    println!("  Suspended:  {}", stats.suspended_accounts.to_string().red());
    Ok(())
}
