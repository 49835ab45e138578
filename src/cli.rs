//! CLI interface for costsheet
//!
//! Every option can also be given through the environment variable named in
//! its help text, so a scheduled job can be configured without flags.
//! Boolean options accept an explicit `true`/`false` value (from the command
//! line or the environment); a bare flag means `true`.
//!
//! # Example
//!
//! ```bash
//! # Default plan over a recorded export, tag reports for two tags
//! costsheet --input export.json --cost-tags Owner,aws:createdBy
//!
//! # Cross-account summary, taxes excluded, JSON to a file
//! ACCOUNTS=111122223333:ops,444455556666:data INC_TAX=false \
//!     costsheet --input export.json --json --output report.json
//! ```

use crate::accounts::AccountLabelField;
use crate::config::DEFAULT_DOMAIN_SUFFIX;
use crate::multi_account::AccountTarget;
use crate::reservation::DEFAULT_RECOMMENDATION_SERVICE;
use clap::{ArgAction, Parser};
use costsheet_core::error::{CostsheetError, Result};
use costsheet_core::types::PaymentOption;
use std::path::PathBuf;

/// Build cloud cost reports from a recorded billing export
#[derive(Parser, Debug, Clone)]
#[command(name = "costsheet")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Recorded billing export (JSON) to report on
    #[arg(long, short = 'i', env = "BILLING_EXPORT")]
    pub input: PathBuf,

    /// Date the reporting windows are derived from (YYYY-MM-DD, default today)
    #[arg(long, env = "REPORT_DATE")]
    pub today: Option<String>,

    /// Include the current, partial month
    #[arg(long, env = "CURRENT_MONTH", action = ArgAction::Set, num_args = 0..=1,
          default_value_t = false, default_missing_value = "true")]
    pub current_month: bool,

    /// Report only the last full month
    #[arg(long, env = "LAST_MONTH_ONLY", action = ArgAction::Set, num_args = 0..=1,
          default_value_t = false, default_missing_value = "true")]
    pub last_month_only: bool,

    /// Count support charges in every report
    #[arg(long, env = "INC_SUPPORT", action = ArgAction::Set, num_args = 0..=1,
          default_value_t = false, default_missing_value = "true")]
    pub include_support: bool,

    /// Count tax in every report
    #[arg(long, env = "INC_TAX", action = ArgAction::Set, num_args = 0..=1,
          default_value_t = true, default_missing_value = "true")]
    pub include_tax: bool,

    /// Narrow every report to the values of this cost allocation tag
    #[arg(long, env = "TAG_KEY")]
    pub tag_key: Option<String>,

    /// Search pattern for the tag values
    #[arg(long, env = "TAG_VALUE_FILTER", default_value = "*")]
    pub tag_value_filter: String,

    /// Account attribute used as label (Name, Email or any listed attribute)
    #[arg(long, env = "ACCOUNT_LABEL", default_value = "Name")]
    pub account_label: AccountLabelField,

    /// Login domain stripped from group keys (empty to disable)
    #[arg(long, env = "ACCOUNT_DOMAIN_SUFFIX", default_value = DEFAULT_DOMAIN_SUFFIX)]
    pub account_domain_suffix: String,

    /// Cost allocation tags to report on, comma separated
    #[arg(long, env = "COST_TAGS", value_delimiter = ',')]
    pub cost_tags: Vec<String>,

    /// Accounts for the cross-account summary, as <account-id>:<login>
    #[arg(long, env = "ACCOUNTS", value_delimiter = ',')]
    pub accounts: Vec<AccountTarget>,

    /// Accounts whose tag reports are built through an assumed role
    #[arg(long, env = "GROUP_ACCOUNTS", value_delimiter = ',')]
    pub group_accounts: Vec<String>,

    /// Add the reserved capacity reports
    #[arg(long, env = "RESERVATION_REPORTS", action = ArgAction::Set, num_args = 0..=1,
          default_value_t = false, default_missing_value = "true")]
    pub reservations: bool,

    /// Payment option for purchase recommendations
    #[arg(long, env = "RI_PAYMENT_OPTION", default_value = "PARTIAL_UPFRONT")]
    pub payment_option: PaymentOption,

    /// Service purchase recommendations are requested for
    #[arg(long, env = "RI_SERVICE", default_value = DEFAULT_RECOMMENDATION_SERVICE)]
    pub recommendation_service: String,

    /// Attempts per throttled call, including the first
    #[arg(long, default_value_t = 3)]
    pub max_attempts: u32,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Write the reports to this file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Show a progress spinner while visiting accounts
    #[arg(long)]
    pub progress: bool,

    /// Only log warnings and errors
    #[arg(long, short = 'q')]
    pub quiet: bool,
}

/// Parse a report date (YYYY-MM-DD)
///
/// # Examples
/// ```
/// use costsheet::cli::parse_report_date;
/// use chrono::Datelike;
///
/// let date = parse_report_date("2024-08-17").unwrap();
/// assert_eq!(date.month(), 8);
/// assert!(parse_report_date("2024-08").is_err());
/// ```
pub fn parse_report_date(date_str: &str) -> Result<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d").map_err(|_| {
        CostsheetError::InvalidDate(format!(
            "Invalid date format '{date_str}', expected YYYY-MM-DD"
        ))
    })
}
