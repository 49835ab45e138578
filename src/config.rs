//! Engine configuration
//!
//! Everything a run needs to know is collected into one [`EngineConfig`]
//! value before the engine starts. The engine never reads process state;
//! the binary converts its command line and environment with
//! [`EngineConfig::from_cli`].

use crate::accounts::AccountLabelField;
use crate::cli::Cli;
use crate::cost_report::RecordOptions;
use crate::multi_account::AccountTarget;
use crate::reservation::RecommendationOptions;
use costsheet_core::error::{CostsheetError, Result};
use costsheet_core::filters::{FilterBuilder, TagFilter};
use costsheet_core::retry::RetryPolicy;
use costsheet_core::windows::ReportWindows;
use chrono::NaiveDate;

/// Login domain stripped from group keys unless configured otherwise
pub const DEFAULT_DOMAIN_SUFFIX: &str = "@nwcdcloud.cn";

/// Settings for one report run
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Date all reporting windows are derived from
    pub today: NaiveDate,
    /// Report the current, partial month too
    pub current_month: bool,
    /// Report only the last full month
    pub last_month_only: bool,
    /// Count support charges in every report
    pub include_support: bool,
    /// Count tax in every report
    pub include_tax: bool,
    /// Narrow every report to a cost allocation tag's values
    pub tag: Option<TagFilter>,
    /// Attribute used to label accounts
    pub account_label: AccountLabelField,
    /// Login domain stripped from group keys
    pub domain_suffix: Option<String>,
    pub retry: RetryPolicy,
    /// Tag keys reported by the default plan
    pub cost_tags: Vec<String>,
    /// Accounts merged into the cross-account summary
    pub summary_accounts: Vec<AccountTarget>,
    /// Accounts whose tag reports are built through an assumed role
    pub group_accounts: Vec<String>,
    /// Add the reserved capacity reports to the default plan
    pub reservation_reports: bool,
    pub recommendation: RecommendationOptions,
    /// Show a spinner while visiting accounts
    pub show_progress: bool,
}

impl EngineConfig {
    /// Defaults for a run on `today`
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            current_month: false,
            last_month_only: false,
            include_support: false,
            include_tax: true,
            tag: None,
            account_label: AccountLabelField::default(),
            domain_suffix: Some(DEFAULT_DOMAIN_SUFFIX.to_string()),
            retry: RetryPolicy::default(),
            cost_tags: Vec::new(),
            summary_accounts: Vec::new(),
            group_accounts: Vec::new(),
            reservation_reports: false,
            recommendation: RecommendationOptions::default(),
            show_progress: false,
        }
    }

    /// Convert parsed command line arguments
    pub fn from_cli(cli: &Cli, today: NaiveDate) -> Result<Self> {
        if cli.current_month && cli.last_month_only {
            return Err(CostsheetError::Config(
                "--current-month and --last-month-only cannot be combined".to_string(),
            ));
        }
        if cli.max_attempts == 0 {
            return Err(CostsheetError::Config(
                "--max-attempts must be at least 1".to_string(),
            ));
        }

        let tag = cli
            .tag_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .map(|key| TagFilter::new(key).with_pattern(&cli.tag_value_filter));
        let domain_suffix = Some(cli.account_domain_suffix.clone()).filter(|s| !s.is_empty());

        Ok(Self {
            today,
            current_month: cli.current_month,
            last_month_only: cli.last_month_only,
            include_support: cli.include_support,
            include_tax: cli.include_tax,
            tag,
            account_label: cli.account_label.clone(),
            domain_suffix,
            retry: RetryPolicy {
                max_attempts: cli.max_attempts,
                ..RetryPolicy::default()
            },
            cost_tags: non_empty(&cli.cost_tags),
            summary_accounts: cli.accounts.clone(),
            group_accounts: non_empty(&cli.group_accounts),
            reservation_reports: cli.reservations,
            recommendation: RecommendationOptions {
                payment_option: cli.payment_option,
                service: cli.recommendation_service.clone(),
            },
            show_progress: cli.progress,
        })
    }

    pub fn with_support(mut self, include_support: bool) -> Self {
        self.include_support = include_support;
        self
    }

    pub fn with_tax(mut self, include_tax: bool) -> Self {
        self.include_tax = include_tax;
        self
    }

    pub fn with_tag(mut self, tag: TagFilter) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_current_month(mut self, current_month: bool) -> Self {
        self.current_month = current_month;
        self
    }

    pub fn with_cost_tags<S: Into<String>>(mut self, tags: Vec<S>) -> Self {
        self.cost_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_summary_accounts(mut self, accounts: Vec<AccountTarget>) -> Self {
        self.summary_accounts = accounts;
        self
    }

    pub fn with_group_accounts<S: Into<String>>(mut self, accounts: Vec<S>) -> Self {
        self.group_accounts = accounts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_reservation_reports(mut self, enabled: bool) -> Self {
        self.reservation_reports = enabled;
        self
    }

    /// Reporting windows for this run
    pub fn windows(&self) -> Result<ReportWindows> {
        ReportWindows::derive(self.today, self.current_month, self.last_month_only)
    }

    /// Filter builder for a report with the given record options
    pub fn filter_builder(&self, records: &RecordOptions) -> FilterBuilder {
        let include_support = self.include_support || records.include_support;
        let mut builder = FilterBuilder {
            record_types: records.record_types.map(|policy| {
                if include_support {
                    policy.including_support()
                } else {
                    policy
                }
            }),
            include_tax: self.include_tax && records.include_tax,
            tag: None,
        };
        if let Some(tag) = &self.tag {
            builder = builder.with_tag(tag.clone());
        }
        builder
    }
}

fn non_empty(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use costsheet_core::filters::RecordTypePolicy;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, 17).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new(today());
        assert!(config.include_tax);
        assert!(!config.include_support);
        assert_eq!(config.domain_suffix.as_deref(), Some(DEFAULT_DOMAIN_SUFFIX));
        assert_eq!(config.account_label, AccountLabelField::Name);
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_current_month_moves_reporting_end() {
        let closed = EngineConfig::new(today()).windows().unwrap();
        assert_eq!(closed.reporting.end, NaiveDate::from_ymd_opt(2024, 8, 1).unwrap());

        let open = EngineConfig::new(today())
            .with_current_month(true)
            .windows()
            .unwrap();
        assert_eq!(open.reporting.end, today());
        assert_eq!(open.reporting.start, closed.reporting.start);
    }

    #[test]
    fn test_filter_flags_combine() {
        let request = RecordOptions {
            include_support: true,
            ..RecordOptions::default()
        };
        let builder = EngineConfig::new(today()).filter_builder(&request);
        assert_eq!(
            builder.record_types,
            Some(RecordTypePolicy::ExcludeCreditsRefundsUpfronts)
        );
        assert!(builder.include_tax);

        let request = RecordOptions {
            include_tax: false,
            ..RecordOptions::default()
        };
        let builder = EngineConfig::new(today()).with_support(true).filter_builder(&request);
        assert_eq!(
            builder.record_types,
            Some(RecordTypePolicy::ExcludeCreditsRefundsUpfronts)
        );
        assert!(!builder.include_tax);
    }

    #[test]
    fn test_tag_is_carried_into_builder() {
        let config = EngineConfig::new(today()).with_tag(TagFilter::new("Owner").with_pattern("team"));
        let builder = config.filter_builder(&RecordOptions::default());
        assert_eq!(builder.tag, Some(TagFilter::new("Owner").with_pattern("team")));
    }

    #[test]
    fn test_from_cli() {
        let cli = Cli::try_parse_from([
            "costsheet",
            "--input",
            "export.json",
            "--include-tax",
            "false",
            "--include-support",
            "--tag-key",
            "Owner",
            "--cost-tags",
            "Owner,,aws:createdBy",
            "--accounts",
            "111122223333:ops",
            "--account-domain-suffix",
            "",
            "--max-attempts",
            "5",
        ])
        .unwrap();
        let config = EngineConfig::from_cli(&cli, today()).unwrap();

        assert!(!config.include_tax);
        assert!(config.include_support);
        assert_eq!(config.tag, Some(TagFilter::new("Owner")));
        assert_eq!(config.cost_tags, vec!["Owner", "aws:createdBy"]);
        assert_eq!(config.summary_accounts[0].login, "ops");
        assert_eq!(config.domain_suffix, None);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_conflicting_month_flags_rejected() {
        let cli = Cli::try_parse_from([
            "costsheet",
            "--input",
            "export.json",
            "--current-month",
            "--last-month-only",
        ])
        .unwrap();
        assert!(matches!(
            EngineConfig::from_cli(&cli, today()),
            Err(CostsheetError::Config(_))
        ));
    }
}
