//! Common test utilities and helpers for costsheet tests
//!
//! This module provides bucket builders, export helpers and environment
//! guards shared by the integration test binaries.

#![allow(dead_code)]

use chrono::NaiveDate;
use costsheet::replay::BillingExport;
use costsheet_core::types::{Group, MetricValue, ResultByTime, UNBLENDED_COST};
use costsheet_core::windows::TimeWindow;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::env;
use std::io::Write;
use tempfile::NamedTempFile;

// Global mutex to serialize environment variable modifications in tests
pub static ENV_MUTEX: Lazy<tokio::sync::Mutex<()>> = Lazy::new(|| tokio::sync::Mutex::new(()));

/// Every variable the command line reads from the environment
pub const CLI_ENV_VARS: &[&str] = &[
    "BILLING_EXPORT",
    "REPORT_DATE",
    "CURRENT_MONTH",
    "LAST_MONTH_ONLY",
    "INC_SUPPORT",
    "INC_TAX",
    "TAG_KEY",
    "TAG_VALUE_FILTER",
    "ACCOUNT_LABEL",
    "ACCOUNT_DOMAIN_SUFFIX",
    "COST_TAGS",
    "ACCOUNTS",
    "GROUP_ACCOUNTS",
    "RESERVATION_REPORTS",
    "RI_PAYMENT_OPTION",
    "RI_SERVICE",
];

/// RAII guard for environment variable manipulation in tests
///
/// Variables are restored to their original state on drop, even if the
/// test panics.
pub struct EnvVarGuard {
    vars: Vec<(String, Option<String>)>,
}

impl EnvVarGuard {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    /// Guard that starts from an environment with no costsheet variables set
    pub fn clean() -> Self {
        let mut guard = Self::new();
        for key in CLI_ENV_VARS {
            guard.remove(key);
        }
        guard
    }

    pub fn set(&mut self, key: &str, value: &str) {
        let original = env::var(key).ok();
        self.vars.push((key.to_string(), original));
        // env::set_var is unsafe since Rust 1.82; callers hold ENV_MUTEX
        unsafe {
            env::set_var(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) {
        let original = env::var(key).ok();
        self.vars.push((key.to_string(), original));
        unsafe {
            env::remove_var(key);
        }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        for (key, value) in self.vars.iter().rev() {
            unsafe {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }
}

impl Default for EnvVarGuard {
    fn default() -> Self {
        Self::new()
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Monthly window starting on the first of `month`
pub fn month(year: i32, month: u32) -> TimeWindow {
    let start = date(year, month, 1);
    let end = if month == 12 {
        date(year + 1, 1, 1)
    } else {
        date(year, month + 1, 1)
    };
    TimeWindow::new(start, end)
}

fn metrics(amount: &str) -> BTreeMap<String, MetricValue> {
    BTreeMap::from([(UNBLENDED_COST.to_string(), MetricValue::usd(amount))])
}

/// Ungrouped bucket carrying only a total
pub fn total_bucket(window: TimeWindow, amount: &str) -> ResultByTime {
    ResultByTime {
        time_period: window,
        total: metrics(amount),
        groups: Vec::new(),
        estimated: false,
    }
}

/// Grouped bucket without a total
pub fn grouped_bucket(window: TimeWindow, groups: &[(&str, &str)]) -> ResultByTime {
    ResultByTime {
        time_period: window,
        total: BTreeMap::new(),
        groups: groups
            .iter()
            .map(|(key, amount)| Group {
                keys: vec![key.to_string()],
                metrics: metrics(amount),
            })
            .collect(),
        estimated: false,
    }
}

/// Consecutive monthly total buckets starting at `year`-`first_month`
pub fn monthly_totals(year: i32, first_month: u32, amounts: &[&str]) -> Vec<ResultByTime> {
    amounts
        .iter()
        .enumerate()
        .map(|(offset, amount)| total_bucket(month(year, first_month + offset as u32), amount))
        .collect()
}

/// Write an export to a temporary JSON file
pub fn export_file(export: &BillingExport) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    let json = serde_json::to_string_pretty(export).unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// Assert two floats are within `tolerance` of each other
pub fn assert_approx_eq(a: f64, b: f64, tolerance: f64) {
    assert!(
        (a - b).abs() < tolerance,
        "Values not approximately equal: {a} vs {b} (tolerance: {tolerance})"
    );
}

/// Assert two series are element-wise approximately equal
pub fn assert_series_eq(actual: &[f64], expected: &[f64]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "series length differs: {actual:?} vs {expected:?}"
    );
    for (a, e) in actual.iter().zip(expected) {
        assert_approx_eq(*a, *e, 1e-9);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monthly_totals_are_consecutive() {
        let buckets = monthly_totals(2024, 1, &["1", "2", "3"]);
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[2].time_period.start, date(2024, 3, 1));
        assert_eq!(buckets[2].time_period.end, date(2024, 4, 1));
    }

    #[test]
    fn test_december_window_wraps_year() {
        assert_eq!(month(2023, 12).end, date(2024, 1, 1));
    }

    #[test]
    #[should_panic(expected = "not approximately equal")]
    fn test_approx_eq_fails() {
        assert_approx_eq(1.0, 1.1, 0.01);
    }
}
