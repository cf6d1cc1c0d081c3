//! Output formatting utilities

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print rows as a rounded table
pub fn print_table<T: Tabled>(rows: Vec<T>) {
    if rows.is_empty() {
        print_warning("No items found");
        return;
    }
    println!("{}", Table::new(rows).with(Style::rounded()));
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print an alert line
pub fn print_alert(message: &str) {
    println!("{} {}", "🚨".red().bold(), message.red().bold());
}

/// Format a 0..1 value as a percentage
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

/// Color a predicted label
pub fn color_label(label: &str) -> String {
    match label.to_lowercase().as_str() {
        "botnet" => label.red().bold().to_string(),
        "normal" => label.green().to_string(),
        _ => label.to_string(),
    }
}

/// Color a confidence value
pub fn color_confidence(confidence: f64) -> String {
    let formatted = format_percent(confidence);
    if confidence >= 0.8 {
        formatted.green().to_string()
    } else if confidence >= 0.5 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}

/// Ground truth column: label name or a dash when unlabelled
pub fn format_actual(label: Option<u8>) -> String {
    match label {
        Some(1) => "Botnet".to_string(),
        Some(_) => "Normal".to_string(),
        None => "-".to_string(),
    }
}

/// Tick, cross or dash for a correctness flag
pub fn format_correct(correct: Option<bool>) -> String {
    match correct {
        Some(true) => "✓".green().to_string(),
        Some(false) => "✗".red().to_string(),
        None => "-".to_string(),
    }
}
