//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use metrics_lib::Resource;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a canonical usage value with its unit
pub fn format_usage(resource: Resource, value: f64) -> String {
    match resource {
        Resource::Cpu => format!("{:.3} cores", value),
        Resource::Memory if value >= 1024.0 => format!("{:.2}Gi", value / 1024.0),
        Resource::Memory => format!("{:.0}Mi", value),
    }
}

/// Format a percentage
pub fn format_percent(percent: f64) -> String {
    format!("{:.1}%", percent)
}

/// Color a utilization percentage by how close it is to saturation
pub fn color_percent(percent: f64) -> String {
    let formatted = format_percent(percent);
    if percent >= 85.0 {
        formatted.red().to_string()
    } else if percent >= 60.0 {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}
