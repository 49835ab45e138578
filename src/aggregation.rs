//! Aggregation of billing buckets into report tables
//!
//! Cost responses arrive as a list of time buckets, each holding the groups
//! that carried cost in that bucket. This module folds those buckets into a
//! dense date × key table and shapes it for presentation:
//!
//! - group keys are normalized (account ids resolved, tag prefixes and login
//!   domain suffixes stripped, empty keys mapped to `(No Tag)`)
//! - keys absent from a bucket are zero-filled, so every row has a value for
//!   every date
//! - the change style replaces each bucket by its difference from the
//!   preceding bucket, leaving the first bucket absolute
//! - rows are ordered by their value in the most recent bucket, largest first,
//!   keeping first-seen order among equal values
//!
//! # Examples
//!
//! ```
//! use costsheet::aggregation::TableAccumulator;
//! use costsheet_core::types::GroupKey;
//! use chrono::NaiveDate;
//!
//! let jan = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let feb = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
//!
//! let mut table = TableAccumulator::new();
//! table.add(jan, GroupKey::new("EC2"), 100.0);
//! table.add(jan, GroupKey::new("S3"), 20.0);
//! table.add(feb, GroupKey::new("EC2"), 150.0);
//!
//! let shaped = table.into_report_table();
//! assert_eq!(shaped.labels(), vec!["EC2", "S3"]);
//! // S3 was absent in February and is filled with zero
//! assert_eq!(shaped.series("S3"), Some(vec![20.0, 0.0]));
//! ```

use crate::accounts::AccountDirectory;
use costsheet_core::error::Result;
use costsheet_core::report::{CellValue, ReportRow, ReportTable, ReportWarning};
use costsheet_core::types::{GroupDefinition, GroupDefinitionType, GroupKey, ResultByTime};
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Tag prefix stripped from group keys regardless of the grouped tag
pub const OWNER_TAG_PREFIX: &str = "Owner$";

/// Turns raw group keys into display keys
#[derive(Debug, Clone)]
pub struct KeyNormalizer<'a> {
    directory: &'a AccountDirectory,
    resolve_accounts: bool,
    tag_prefixes: Vec<String>,
    domain_suffix: Option<&'a str>,
}

impl<'a> KeyNormalizer<'a> {
    /// Normalizer for a query grouped by `group_by`
    ///
    /// Account ids are only resolved when one of the group definitions is the
    /// linked-account dimension. Each grouped tag contributes its own
    /// `"<tag>$"` prefix to strip.
    pub fn new(
        directory: &'a AccountDirectory,
        group_by: &[GroupDefinition],
        domain_suffix: Option<&'a str>,
    ) -> Self {
        let mut tag_prefixes = vec![OWNER_TAG_PREFIX.to_string()];
        for definition in group_by {
            if definition.kind == GroupDefinitionType::Tag {
                let prefix = format!("{}$", definition.key);
                if !tag_prefixes.contains(&prefix) {
                    tag_prefixes.push(prefix);
                }
            }
        }

        Self {
            directory,
            resolve_accounts: group_by.iter().any(GroupDefinition::is_account_dimension),
            tag_prefixes,
            domain_suffix: domain_suffix.filter(|suffix| !suffix.is_empty()),
        }
    }

    /// Normalize one raw key
    pub fn normalize(&self, raw: &str) -> GroupKey {
        let mut key = if self.resolve_accounts {
            self.directory.resolve(raw)
        } else {
            raw
        };

        if let Some(stripped) = self
            .tag_prefixes
            .iter()
            .find_map(|prefix| key.strip_prefix(prefix.as_str()))
        {
            key = stripped;
        }
        if let Some(suffix) = self.domain_suffix {
            key = key.strip_suffix(suffix).unwrap_or(key);
        }

        if key.is_empty() {
            GroupKey::no_tag()
        } else {
            GroupKey::new(key)
        }
    }
}

/// How keys of one account's buckets are placed in a shared table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyScope {
    /// Keys used as normalized
    Plain,
    /// Keys namespaced by account: `"<key> <account>"`, and the ungrouped
    /// total as `"<login> <account>"`
    Account { account_id: String, login: String },
}

impl KeyScope {
    fn grouped(&self, key: GroupKey) -> GroupKey {
        match self {
            Self::Plain => key,
            Self::Account { account_id, .. } => GroupKey::new(format!("{key} {account_id}")),
        }
    }

    fn total(&self) -> GroupKey {
        match self {
            Self::Plain => GroupKey::total(),
            Self::Account { account_id, login } => GroupKey::new(format!("{login} {account_id}")),
        }
    }
}

/// Dense date × key table under construction
///
/// Dates and keys keep first-seen order until a merge, which sorts the dates.
/// Cells that were never set read as zero; setting a cell twice keeps the last
/// value.
#[derive(Debug, Clone, Default)]
pub struct TableAccumulator {
    dates: Vec<NaiveDate>,
    keys: Vec<GroupKey>,
    date_index: HashMap<NaiveDate, usize>,
    key_index: HashMap<GroupKey, usize>,
    cells: HashMap<(usize, usize), f64>,
}

impl TableAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a date column, even if no key ever carries cost in it
    pub fn add_date(&mut self, date: NaiveDate) -> usize {
        if let Some(&index) = self.date_index.get(&date) {
            return index;
        }
        self.dates.push(date);
        self.date_index.insert(date, self.dates.len() - 1);
        self.dates.len() - 1
    }

    fn add_key(&mut self, key: GroupKey) -> usize {
        if let Some(&index) = self.key_index.get(&key) {
            return index;
        }
        self.keys.push(key.clone());
        self.key_index.insert(key, self.keys.len() - 1);
        self.keys.len() - 1
    }

    /// Set the amount for (`date`, `key`)
    pub fn add(&mut self, date: NaiveDate, key: GroupKey, amount: f64) {
        let date = self.add_date(date);
        let key = self.add_key(key);
        self.cells.insert((date, key), amount);
    }

    /// Amount for (`date`, `key`); zero for known coordinates never set
    pub fn get(&self, date: NaiveDate, key: &GroupKey) -> Option<f64> {
        let date = *self.date_index.get(&date)?;
        let key = *self.key_index.get(key)?;
        Some(self.value(date, key))
    }

    fn value(&self, date: usize, key: usize) -> f64 {
        self.cells.get(&(date, key)).copied().unwrap_or(0.0)
    }

    /// Date columns in first-seen order
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Keys in first-seen order
    pub fn keys(&self) -> &[GroupKey] {
        &self.keys
    }

    /// Whether no key has been added
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Fold one cost response into the table
    ///
    /// A bucket without groups contributes its total under the scope's total
    /// key. For grouped queries an empty bucket may omit the total; its date
    /// is still registered so it shows up zero-filled.
    pub fn add_buckets(
        &mut self,
        buckets: &[ResultByTime],
        metric: &str,
        normalizer: &KeyNormalizer<'_>,
        scope: &KeyScope,
        grouped: bool,
    ) -> Result<()> {
        for bucket in buckets {
            let date = bucket.time_period.start;
            self.add_date(date);

            if bucket.groups.is_empty() {
                if grouped && !bucket.total.contains_key(metric) {
                    debug!("Bucket {} carries no groups", date);
                    continue;
                }
                self.add(date, scope.total(), bucket.total_amount(metric)?);
                continue;
            }

            for group in &bucket.groups {
                let key = scope.grouped(normalizer.normalize(group.primary_key()));
                self.add(date, key, group.amount(metric)?);
            }
        }
        Ok(())
    }

    /// Copy every cell of `other` into this table
    ///
    /// Cells already present are overwritten by `other`'s value. Afterwards
    /// the date columns are in chronological order, since tables merged from
    /// different accounts may each lack some dates.
    pub fn merge(&mut self, other: TableAccumulator) {
        let dates: Vec<usize> = other.dates.iter().map(|date| self.add_date(*date)).collect();
        let keys: Vec<usize> = other.keys.into_iter().map(|key| self.add_key(key)).collect();
        for ((d, k), amount) in other.cells {
            self.cells.insert((dates[d], keys[k]), amount);
        }
        self.sort_dates();
    }

    fn sort_dates(&mut self) {
        if self.dates.is_sorted() {
            return;
        }

        let mut order: Vec<usize> = (0..self.dates.len()).collect();
        order.sort_by_key(|&index| self.dates[index]);
        let mut remap = vec![0; order.len()];
        for (new, &old) in order.iter().enumerate() {
            remap[old] = new;
        }

        self.dates = order.iter().map(|&index| self.dates[index]).collect();
        self.date_index = self
            .dates
            .iter()
            .enumerate()
            .map(|(index, date)| (*date, index))
            .collect();
        self.cells = std::mem::take(&mut self.cells)
            .into_iter()
            .map(|((d, k), amount)| ((remap[d], k), amount))
            .collect();
    }

    /// Replace every bucket after the first by its change from the preceding one
    ///
    /// A change that is not a finite number is set to zero and reported.
    pub fn into_changes(mut self, report: &str) -> (Self, Vec<ReportWarning>) {
        let mut warnings = Vec::new();
        let mut changes = HashMap::new();

        for d in 1..self.dates.len() {
            for k in 0..self.keys.len() {
                let delta = self.value(d, k) - self.value(d - 1, k);
                let delta = if delta.is_finite() {
                    delta
                } else {
                    warn!(
                        "{}: change for '{}' on {} is not a number; using 0",
                        report, self.keys[k], self.dates[d]
                    );
                    warnings.push(ReportWarning::ChangeCellDefaulted {
                        report: report.to_string(),
                        date: self.dates[d],
                        key: self.keys[k].to_string(),
                        reason: format!("non-finite change {delta}"),
                    });
                    0.0
                };
                changes.insert((d, k), delta);
            }
        }

        self.cells.retain(|&(d, _), _| d == 0);
        self.cells.extend(changes);
        (self, warnings)
    }

    /// Shape into a row-per-key table ordered by the latest bucket
    pub fn into_report_table(self) -> ReportTable {
        let latest = self
            .dates
            .iter()
            .enumerate()
            .max_by_key(|(_, date)| **date)
            .map(|(index, _)| index);

        let mut rows: Vec<(f64, ReportRow)> = self
            .keys
            .iter()
            .enumerate()
            .map(|(k, key)| {
                let cells = (0..self.dates.len())
                    .map(|d| CellValue::Number(self.value(d, k)))
                    .collect();
                let sort_value = latest.map(|d| self.value(d, k)).unwrap_or(0.0);
                (
                    sort_value,
                    ReportRow {
                        label: key.to_string(),
                        cells,
                    },
                )
            })
            .collect();

        // `sort_by` is stable: equal latest values keep first-seen order
        rows.sort_by(|(a, _), (b, _)| b.total_cmp(a));

        ReportTable {
            columns: self
                .dates
                .iter()
                .map(|date| date.format("%Y-%m-%d").to_string())
                .collect(),
            rows: rows.into_iter().map(|(_, row)| row).collect(),
        }
    }
}
