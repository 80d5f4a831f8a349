pub mod commands;

pub use commands::{AccountAction, Cli, Commands, ItemAction, PageArgs, ReportKind};
