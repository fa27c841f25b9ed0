//! Table and JSON rendering plus coloured status lines

use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

/// `--format` value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {}. Use 'table' or 'json'", s)),
        }
    }
}

fn render_rows<T: Serialize + Tabled>(rows: &[T], format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Table if rows.is_empty() => "No items found.".to_string(),
        OutputFormat::Table => Table::new(rows).to_string(),
        OutputFormat::Json => serde_json::to_string_pretty(rows)?,
    })
}

/// Print rows
pub fn print_output<T: Serialize + Tabled>(rows: &[T], format: OutputFormat) -> anyhow::Result<()> {
    println!("{}", render_rows(rows, format)?);
    Ok(())
}

/// Print one record; JSON gets an object rather than an array
pub fn print_single<T: Serialize + Tabled>(row: &T, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(row)?),
        OutputFormat::Table => println!("{}", render_rows(std::slice::from_ref(row), format)?),
    }
    Ok(())
}

pub fn print_success(message: &str, quiet: bool) {
    if !quiet {
        println!("{}", message.green());
    }
}

pub fn print_info(message: &str, quiet: bool) {
    if !quiet {
        println!("{}", message);
    }
}

/// Non-fatal notice, always shown
pub fn print_warning(message: &str) {
    eprintln!("{}", message.yellow());
}

pub fn print_error(message: &str) {
    eprintln!("{}", message.red());
}

/// Shorten free text for table cells
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", head)
}
