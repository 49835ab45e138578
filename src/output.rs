//! Output formatters for costsheet reports
//!
//! This module renders a [`ReportCollection`] either as terminal tables or as
//! JSON for downstream tooling (spreadsheet writers, dashboards).
//!
//! # Examples
//!
//! ```
//! use costsheet::output::get_formatter;
//! use costsheet_core::report::ReportCollection;
//!
//! let collection = ReportCollection::new();
//!
//! let table = get_formatter(false).format_collection(&collection);
//! assert!(table.contains("No reports"));
//!
//! let json = get_formatter(true).format_collection(&collection);
//! assert!(json.contains("\"entries\""));
//! ```

use colored::Colorize;
use costsheet_core::report::{CellValue, ReportCollection, ReportEntry};
use prettytable::{Cell, Row, Table, format};

/// Trait for rendering a finished report collection
///
/// # Example Implementation
///
/// ```
/// use costsheet::output::ReportFormatter;
/// use costsheet_core::report::ReportCollection;
///
/// struct CountFormatter;
///
/// impl ReportFormatter for CountFormatter {
///     fn format_collection(&self, collection: &ReportCollection) -> String {
///         format!("{} reports", collection.len())
///     }
/// }
///
/// assert_eq!(CountFormatter.format_collection(&ReportCollection::new()), "0 reports");
/// ```
pub trait ReportFormatter {
    /// Render every entry and warning of the collection
    fn format_collection(&self, collection: &ReportCollection) -> String;
}

/// Table formatter for human-readable output
///
/// Each entry becomes one table headed by its sheet name and render kind.
/// Amounts are shown with two decimals; warnings follow the tables.
pub struct TableFormatter;

impl TableFormatter {
    fn format_cell(value: &CellValue) -> Cell {
        match value {
            CellValue::Number(n) => Cell::new(&format!("{n:.2}")).style_spec("r"),
            CellValue::Text(s) => Cell::new(s),
        }
    }

    fn format_entry(entry: &ReportEntry) -> String {
        let mut output = format!("\n=== {} ({}) ===\n", entry.name, entry.kind);

        if entry.table.is_empty() {
            output.push_str("(no data)\n");
            return output;
        }

        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);

        let mut titles = vec![Cell::new("").style_spec("b")];
        titles.extend(
            entry
                .table
                .columns
                .iter()
                .map(|column| Cell::new(column).style_spec("b")),
        );
        table.set_titles(Row::new(titles));

        for row in &entry.table.rows {
            let mut cells = vec![Cell::new(&row.label)];
            cells.extend(row.cells.iter().map(Self::format_cell));
            table.add_row(Row::new(cells));
        }

        output.push_str(&table.to_string());
        output
    }
}

impl ReportFormatter for TableFormatter {
    fn format_collection(&self, collection: &ReportCollection) -> String {
        let mut output = String::new();

        if collection.is_empty() {
            output.push_str("No reports were produced\n");
        }
        for entry in collection {
            output.push_str(&Self::format_entry(entry));
        }

        if !collection.warnings().is_empty() {
            output.push_str(&format!("\n{}\n", "Warnings:".yellow().bold()));
            for warning in collection.warnings() {
                output.push_str(&format!("  {} {warning}\n", "!".yellow()));
            }
        }

        output
    }
}

/// JSON formatter for machine-readable output
pub struct JsonFormatter;

impl ReportFormatter for JsonFormatter {
    fn format_collection(&self, collection: &ReportCollection) -> String {
        serde_json::to_string_pretty(collection)
            .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize reports: {e}\"}}"))
    }
}

/// Get appropriate formatter based on JSON flag
pub fn get_formatter(json: bool) -> Box<dyn ReportFormatter> {
    if json {
        Box::new(JsonFormatter)
    } else {
        Box::new(TableFormatter)
    }
}
