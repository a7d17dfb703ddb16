//! Output formatting for gputop

use anyhow::Result;
use clap::ValueEnum;
use colored::*;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Compact text format
    Text,
}

impl OutputFormat {
    pub fn is_structured(&self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::Yaml)
    }
}

/// Trait for rows that can be printed as a table or as key-value text
pub trait Formattable {
    fn table_headers() -> Vec<String>;
    fn table_row(&self) -> Vec<String>;

    /// Key-value pairs for the text format
    fn key_value_pairs(&self) -> Vec<(String, String)>;
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print a whole document in a structured format
    ///
    /// Table and text formats have their own layout per command and print
    /// nothing here.
    pub fn print_document<T: Serialize + ?Sized>(&self, document: &T) -> Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(document)?),
            OutputFormat::Yaml => print!("{}", serde_yaml::to_string(document)?),
            OutputFormat::Table | OutputFormat::Text => {}
        }
        Ok(())
    }

    /// Format and print a list of rows
    pub fn print_list<T>(&self, items: &[T]) -> Result<()>
    where
        T: Serialize + Formattable,
    {
        if items.is_empty() {
            match self.format {
                OutputFormat::Json | OutputFormat::Yaml => println!("[]"),
                OutputFormat::Table | OutputFormat::Text => {
                    println!("{}", "No items found".dimmed());
                }
            }
            return Ok(());
        }

        match self.format {
            OutputFormat::Json | OutputFormat::Yaml => self.print_document(items)?,
            OutputFormat::Table => self.print_table(items),
            OutputFormat::Text => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        println!();
                    }
                    for (key, value) in item.key_value_pairs() {
                        println!("{}: {}", key, value);
                    }
                }
            }
        }
        Ok(())
    }

    fn print_table<T: Formattable>(&self, items: &[T]) {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        let header_cells: Vec<Cell> = T::table_headers()
            .iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold).fg(Color::Cyan))
            .collect();
        table.set_header(header_cells);

        for item in items {
            table.add_row(item.table_row());
        }

        println!("{}", table);
    }

    /// Print summary lines under a table
    pub fn print_footer(&self, lines: &[String]) {
        if self.format.is_structured() {
            return;
        }
        println!();
        for line in lines {
            match self.format {
                OutputFormat::Table => println!("{}", line.bold()),
                _ => println!("{}", line),
            }
        }
    }

    pub fn print_warning(&self, message: &str) {
        if !self.format.is_structured() {
            eprintln!("{} {}", "⚠".yellow().bold(), message.yellow());
        }
    }

    /// Print a progress message (only for interactive formats)
    pub fn print_progress(&self, message: &str) {
        if !self.format.is_structured() {
            eprint!("{} {}...\r", "⏳".yellow(), message);
        }
    }

    pub fn clear_progress(&self) {
        if !self.format.is_structured() {
            eprint!("\r{}\r", " ".repeat(80));
        }
    }
}

/// Format a value already expressed in percent
pub fn format_percentage(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Format a memory figure with one decimal
pub fn format_gib(value: f64) -> String {
    format!("{:.1}", value)
}

/// Format a device count, dropping the decimal for whole numbers
pub fn format_devices(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as u64)
    } else {
        format!("{:.1}", value)
    }
}

/// Format a figure only telemetry provides, `-` when it is missing
pub fn format_optional(value: Option<f64>, format: fn(f64) -> String) -> String {
    value.map(format).unwrap_or_else(|| "-".to_string())
}

pub fn colorize_status(status: &str) -> ColoredString {
    match status.to_lowercase().as_str() {
        "ready" | "running" | "succeeded" => status.green(),
        "notready" | "failed" => status.red(),
        "pending" => status.yellow(),
        _ => status.normal(),
    }
}
