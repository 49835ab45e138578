//! Report data types
//!
//! Pure data structures handed from the engine to whatever renders the
//! reports: shaped tables, named entries with a render hint, and the ordered
//! collection that accumulates them over one run.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a spreadsheet sheet name
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Characters spreadsheets refuse in sheet names
const FORBIDDEN_SHEET_CHARS: [char; 7] = [':', '\\', '/', '?', '*', '[', ']'];

/// One table cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Numeric value, if this is a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n:.2}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// One labelled table row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    /// Row label (group key, series name, or index)
    pub label: String,
    /// Cells aligned with the table's columns
    pub cells: Vec<CellValue>,
}

impl ReportRow {
    /// Numeric value in column `index`
    pub fn number(&self, index: usize) -> Option<f64> {
        self.cells.get(index).and_then(CellValue::as_f64)
    }
}

/// A fully shaped, row-major table
///
/// Every row has exactly one cell per column; there are no absent cells.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportTable {
    /// Column headers, e.g. bucket dates
    pub columns: Vec<String>,
    /// Rows in presentation order
    pub rows: Vec<ReportRow>,
}

impl ReportTable {
    /// An empty table
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Find a row by label
    pub fn row(&self, label: &str) -> Option<&ReportRow> {
        self.rows.iter().find(|row| row.label == label)
    }

    /// Row labels in presentation order
    pub fn labels(&self) -> Vec<&str> {
        self.rows.iter().map(|row| row.label.as_str()).collect()
    }

    /// Numeric values of the row labelled `label`
    pub fn series(&self, label: &str) -> Option<Vec<f64>> {
        self.row(label)
            .map(|row| row.cells.iter().map(|c| c.as_f64().unwrap_or(0.0)).collect())
    }

    /// Cell at (`label`, `column`)
    pub fn cell(&self, label: &str, column: &str) -> Option<&CellValue> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.row(label)?.cells.get(index)
    }
}

/// How a report should be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderKind {
    /// Time series; render with a stacked column chart
    Chart,
    /// Plain table only
    Table,
}

impl fmt::Display for RenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chart => write!(f, "chart"),
            Self::Table => write!(f, "table"),
        }
    }
}

/// A spreadsheet-safe sheet name
///
/// # Examples
/// ```
/// use costsheet_core::report::SheetName;
///
/// assert_eq!(SheetName::new("aws:createdBy").as_str(), "aws.createdBy");
/// assert_eq!(SheetName::new("x".repeat(40)).as_str().len(), 31);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SheetName(String);

impl SheetName {
    /// Sanitize `raw` into a valid sheet name
    pub fn new(raw: impl AsRef<str>) -> Self {
        let sanitized: String = raw
            .as_ref()
            .chars()
            .map(|c| if FORBIDDEN_SHEET_CHARS.contains(&c) { '.' } else { c })
            .take(MAX_SHEET_NAME_LEN)
            .collect();
        Self(sanitized)
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SheetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One named report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub name: SheetName,
    pub table: ReportTable,
    pub kind: RenderKind,
}

impl ReportEntry {
    /// Create a new entry
    pub fn new(name: impl AsRef<str>, table: ReportTable, kind: RenderKind) -> Self {
        Self {
            name: SheetName::new(name),
            table,
            kind,
        }
    }
}

/// A recoverable degradation noticed while building reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportWarning {
    /// The account listing failed; raw account ids are shown instead of labels
    AccountDirectoryUnavailable { reason: String },
    /// A tag key matched no values and was left out of the filter
    TagFilterDropped { tag_key: String, pattern: String },
    /// A period-over-period cell could not be computed and was set to zero
    ChangeCellDefaulted {
        report: String,
        date: NaiveDate,
        key: String,
        reason: String,
    },
    /// One account of a cross-account summary failed and was left out
    AccountSkipped {
        report: String,
        account_id: String,
        reason: String,
    },
}

impl fmt::Display for ReportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccountDirectoryUnavailable { reason } => {
                write!(f, "account names unavailable, showing ids: {reason}")
            }
            Self::TagFilterDropped { tag_key, pattern } => {
                write!(f, "tag '{tag_key}' matched no values for '{pattern}'; tag filter dropped")
            }
            Self::ChangeCellDefaulted {
                report,
                date,
                key,
                reason,
            } => write!(f, "{report}: change for '{key}' on {date} set to 0 ({reason})"),
            Self::AccountSkipped {
                report,
                account_id,
                reason,
            } => write!(f, "{report}: account {account_id} skipped ({reason})"),
        }
    }
}

/// Ordered reports of one run plus the warnings raised while building them
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportCollection {
    entries: Vec<ReportEntry>,
    warnings: Vec<ReportWarning>,
}

impl ReportCollection {
    /// An empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry; entries keep insertion order
    pub fn push(&mut self, entry: ReportEntry) {
        self.entries.push(entry);
    }

    /// Record degradations
    pub fn extend_warnings(&mut self, warnings: impl IntoIterator<Item = ReportWarning>) {
        self.warnings.extend(warnings);
    }

    /// Entries in the order they were added
    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    /// Warnings in the order they were raised
    pub fn warnings(&self) -> &[ReportWarning] {
        &self.warnings
    }

    /// Find an entry by sheet name
    pub fn get(&self, name: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.name.as_str() == name)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries were added
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries
    pub fn iter(&self) -> std::slice::Iter<'_, ReportEntry> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a ReportCollection {
    type Item = &'a ReportEntry;
    type IntoIter = std::slice::Iter<'a, ReportEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_name_sanitizes_and_truncates() {
        assert_eq!(SheetName::new("Change-aws:cost/center").as_str(), "Change-aws.cost.center");
        let long = SheetName::new("123456789012-user:CostCenterBusinessUnitTag");
        assert_eq!(long.as_str(), "123456789012-user.CostCenterBus");
        assert_eq!(long.as_str().chars().count(), MAX_SHEET_NAME_LEN);
    }

    #[test]
    fn test_sheet_name_truncates_on_char_boundary() {
        let name = SheetName::new("成本".repeat(20));
        assert_eq!(name.as_str().chars().count(), MAX_SHEET_NAME_LEN);
    }

    #[test]
    fn test_collection_keeps_insertion_order() {
        let mut collection = ReportCollection::new();
        for name in ["Total", "TotalChange", "Services"] {
            collection.push(ReportEntry::new(name, ReportTable::empty(), RenderKind::Chart));
        }
        let names: Vec<_> = collection.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Total", "TotalChange", "Services"]);
        assert!(collection.get("Services").is_some());
        assert!(collection.get("Regions").is_none());
    }

    #[test]
    fn test_table_lookup() {
        let table = ReportTable {
            columns: vec!["2024-01-01".into(), "2024-02-01".into()],
            rows: vec![ReportRow {
                label: "EC2".into(),
                cells: vec![CellValue::Number(1.0), CellValue::Number(2.5)],
            }],
        };
        assert_eq!(table.series("EC2"), Some(vec![1.0, 2.5]));
        assert_eq!(table.cell("EC2", "2024-02-01"), Some(&CellValue::Number(2.5)));
        assert_eq!(table.cell("EC2", "2024-03-01"), None);
        assert_eq!(table.labels(), vec!["EC2"]);
    }

    #[test]
    fn test_warning_serializes_with_kind_tag() {
        let warning = ReportWarning::AccountSkipped {
            report: "Summary".into(),
            account_id: "111122223333".into(),
            reason: "denied".into(),
        };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "account_skipped");
        assert_eq!(warning.to_string(), "Summary: account 111122223333 skipped (denied)");
    }
}
