//! Reporting windows
//!
//! Every query the engine issues covers a half-open date window. The windows
//! are derived once per run from a single "today" value so that a run is
//! reproducible and never consults the system clock on its own.

use crate::error::{CostsheetError, Result};
use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Months of history in the default cost reports
pub const REPORT_MONTHS: u32 = 6;

/// Months of history in the reservation coverage report
pub const RESERVATION_MONTHS: u32 = 11;

/// Months of history for which reservation savings figures are valid
pub const SAVINGS_MONTHS: u32 = 6;

/// Half-open date window `[start, end)`
///
/// Serializes as `{"Start": "2024-01-01", "End": "2024-07-01"}`, the shape
/// the billing API uses for its `TimePeriod` fields.
///
/// # Examples
/// ```
/// use costsheet_core::windows::TimeWindow;
/// use chrono::NaiveDate;
///
/// let window = TimeWindow::new(
///     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
///     NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
/// );
/// assert_eq!(window.to_string(), "2024-01-01..2024-07-01");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TimeWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeWindow {
    /// Create a new window
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Whether `date` lies inside the window
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start.format("%Y-%m-%d"), self.end.format("%Y-%m-%d"))
    }
}

/// First day of the month `months` calendar months before `date`
pub fn first_of_month_back(date: NaiveDate, months: u32) -> Result<NaiveDate> {
    let shifted = date
        .checked_sub_months(Months::new(months))
        .ok_or_else(|| CostsheetError::InvalidDate(format!("{date} minus {months} months")))?;
    shifted
        .with_day(1)
        .ok_or_else(|| CostsheetError::InvalidDate(format!("first day of {shifted}")))
}

/// The set of windows one run reports over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindows {
    /// Window for cost and usage reports
    pub reporting: TimeWindow,
    /// Window for reservation coverage
    pub reservation: TimeWindow,
    /// Shorter window for reservation utilization and savings
    pub savings: TimeWindow,
    /// Window used when enumerating tag values
    pub tags: TimeWindow,
}

impl ReportWindows {
    /// Derive all windows from `today`
    ///
    /// The reporting window ends on the first of the current month, or on
    /// `today` when the current (partial) month is requested. With
    /// `last_month_only` it starts one month back instead of six.
    pub fn derive(today: NaiveDate, current_month: bool, last_month_only: bool) -> Result<Self> {
        let month_start = first_of_month_back(today, 0)?;
        let report_months = if last_month_only { 1 } else { REPORT_MONTHS };
        let reporting_start = first_of_month_back(today, report_months)?;
        let reporting_end = if current_month { today } else { month_start };

        let windows = Self {
            reporting: TimeWindow::new(reporting_start, reporting_end),
            reservation: TimeWindow::new(first_of_month_back(today, RESERVATION_MONTHS)?, today),
            savings: TimeWindow::new(first_of_month_back(today, SAVINGS_MONTHS)?, today),
            tags: TimeWindow::new(reporting_start, today),
        };
        debug!(
            "Derived windows: reporting {}, reservation {}, savings {}",
            windows.reporting, windows.reservation, windows.savings
        );
        Ok(windows)
    }
}
