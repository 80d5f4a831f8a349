use chrono::NaiveDate;
use colored::Colorize;

use crate::storage::LoanStatus;

/// Format a calendar date for tables
pub fn format_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn format_optional_date(date: Option<&NaiveDate>) -> String {
    date.map(format_date).unwrap_or_else(|| "-".to_string())
}

/// Status label colored by severity
pub fn format_status(status: LoanStatus) -> String {
    let label = status.as_str();
    match status {
        LoanStatus::Borrowed => label.cyan().to_string(),
        LoanStatus::Overdue => label.red().bold().to_string(),
        LoanStatus::ReturnedTimely => label.green().to_string(),
        LoanStatus::ReturnedOverdue => label.yellow().to_string(),
        LoanStatus::ReturnedExcused => label.blue().to_string(),
    }
}

/// Prompt user for yes/no confirmation
pub fn confirm_action(prompt: &str) -> bool {
    use std::io::{self, Write};

    print!("{} (y/N): ", prompt);
    if io::stdout().flush().is_err() {
        return false;
    }

    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }

    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Print a formatted table border
pub fn print_table_border(width: usize) {
    println!("{}", "=".repeat(width));
}

/// Print a table row with columns
pub fn print_table_row(columns: &[&str], widths: &[usize]) {
    println!("{}", table_row(columns, widths));
}

fn table_row(columns: &[&str], widths: &[usize]) -> String {
    let mut row = String::new();
    for (col, width) in columns.iter().zip(widths) {
        row.push_str(&format!("{:<width$}  ", col, width = width));
    }
    row.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_pad_to_column_widths() {
        assert_eq!(table_row(&["1", "BORROWED"], &[4, 10]), "1     BORROWED");
        assert_eq!(table_row(&["a", "b", "ignored"], &[2, 2]), "a   b");
    }

    #[test]
    fn missing_dates_render_as_dash() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 9).unwrap();
        assert_eq!(format_optional_date(Some(&date)), "2026-01-09");
        assert_eq!(format_optional_date(None), "-");
    }

    #[test]
    fn status_label_keeps_its_name() {
        colored::control::set_override(false);
        assert_eq!(format_status(LoanStatus::Overdue), "OVERDUE");
    }
}
