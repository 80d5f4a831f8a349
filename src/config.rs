use serde::Deserialize;

use crate::error::{CirculationError, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub circulation: CirculationConfig,
    pub service: ServiceConfig,
    pub report: ReportConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CirculationConfig {
    /// Days between borrow date and due date.
    pub loan_period_days: u32,
    /// Overdue returns that suspend the borrower's account.
    pub suspension_threshold: usize,
    pub sweep_chunk_size: usize,
    pub bulk_concurrency: usize,
}

impl Default for CirculationConfig {
    fn default() -> Self {
        Self {
            loan_period_days: 14,
            suspension_threshold: 2,
            sweep_chunk_size: 500,
            bulk_concurrency: 16,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ReportConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AdminConfig {
    /// Secret that authorizes administrative commands. Supplied at startup,
    /// typically through `CIRCULATION__ADMIN__BOOTSTRAP_SECRET`.
    pub bootstrap_secret: Option<String>,
}

impl Config {
    /// Layered load: built-in defaults, then the optional config file at
    /// `path`, then `CIRCULATION__*` environment variables.
    pub fn load_from(path: &str) -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let defaults = CirculationConfig::default();
        let report = ReportConfig::default();

        let config = config::Config::builder()
            .set_default("database.path", "circulation.db")?
            .set_default(
                "circulation.loan_period_days",
                i64::from(defaults.loan_period_days),
            )?
            .set_default(
                "circulation.suspension_threshold",
                defaults.suspension_threshold as i64,
            )?
            .set_default("circulation.sweep_chunk_size", defaults.sweep_chunk_size as i64)?
            .set_default("circulation.bulk_concurrency", defaults.bulk_concurrency as i64)?
            .set_default("service.sweep_interval_secs", 3600i64)?
            .set_default("report.default_page_size", report.default_page_size as i64)?
            .set_default("report.max_page_size", report.max_page_size as i64)?
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("CIRCULATION").separator("__"))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.circulation;
        if c.loan_period_days == 0 {
            return Err(CirculationError::Config(
                "circulation.loan_period_days must be positive".to_string(),
            ));
        }
        if c.suspension_threshold == 0 {
            return Err(CirculationError::Config(
                "circulation.suspension_threshold must be positive".to_string(),
            ));
        }
        if c.sweep_chunk_size == 0 || c.bulk_concurrency == 0 {
            return Err(CirculationError::Config(
                "sweep chunk size and bulk concurrency must be positive".to_string(),
            ));
        }
        if self.report.default_page_size == 0
            || self.report.default_page_size > self.report.max_page_size
        {
            return Err(CirculationError::Config(
                "report.default_page_size must be between 1 and report.max_page_size".to_string(),
            ));
        }
        Ok(())
    }

    /// Checks a caller-supplied secret against the configured one. With no
    /// configured secret every administrative command is refused.
    pub fn authorize_admin(&self, supplied: Option<&str>) -> Result<()> {
        match (self.admin.bootstrap_secret.as_deref(), supplied) {
            (Some(expected), Some(given)) if !expected.is_empty() && expected == given => Ok(()),
            _ => Err(CirculationError::Unauthorized),
        }
    }
}
