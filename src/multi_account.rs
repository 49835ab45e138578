//! Cross-account summary
//!
//! Runs the same grouped query in several accounts, each through a client
//! obtained by assuming a role in that account, and merges the results into
//! one dated table. Keys are namespaced by account id so identically named
//! categories in different accounts stay apart.
//!
//! A failing account (role assumption or query) is logged, recorded as a
//! [`ReportWarning::AccountSkipped`], and left out; the summary is built from
//! the remaining accounts.

use crate::accounts::AccountDirectory;
use crate::aggregation::{KeyNormalizer, KeyScope, TableAccumulator};
use crate::config::EngineConfig;
use crate::cost_report::{fetch_buckets, BuiltReport, RecordOptions};
use costsheet_core::error::{CostsheetError, Result};
use costsheet_core::filters::FilterExpression;
use costsheet_core::provider::{BillingClient, CredentialBroker};
use costsheet_core::report::{RenderKind, ReportEntry, ReportWarning};
use costsheet_core::types::{CostQuery, GroupDefinition, UNBLENDED_COST};
use costsheet_core::windows::TimeWindow;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// One account taking part in a summary
///
/// # Examples
/// ```
/// use costsheet::multi_account::AccountTarget;
///
/// let target: AccountTarget = "111122223333:ops".parse().unwrap();
/// assert_eq!(target.account_id, "111122223333");
/// assert_eq!(target.login, "ops");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTarget {
    pub account_id: String,
    /// Label used for the account's ungrouped total
    pub login: String,
}

impl AccountTarget {
    pub fn new(account_id: impl Into<String>, login: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            login: login.into(),
        }
    }
}

impl fmt::Display for AccountTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.account_id, self.login)
    }
}

impl std::str::FromStr for AccountTarget {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().split_once(':') {
            Some((id, login)) if !id.trim().is_empty() && !login.trim().is_empty() => {
                Ok(Self::new(id.trim(), login.trim()))
            }
            _ => Err(format!("Invalid account '{s}', expected <account-id>:<login>")),
        }
    }
}

/// A cross-account summary to build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryReportRequest {
    pub name: String,
    pub group_by: Vec<GroupDefinition>,
    pub records: RecordOptions,
}

impl SummaryReportRequest {
    /// Ungrouped totals per account
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group_by: Vec::new(),
            records: RecordOptions::default(),
        }
    }

    pub fn group_by(mut self, definition: GroupDefinition) -> Self {
        self.group_by.push(definition);
        self
    }

    pub fn including_support(mut self) -> Self {
        self.records.include_support = true;
        self
    }
}

/// Builds cross-account summaries
pub struct MultiAccountAggregator<'a> {
    config: &'a EngineConfig,
    directory: &'a AccountDirectory,
    client: &'a dyn BillingClient,
    broker: &'a dyn CredentialBroker,
}

impl<'a> MultiAccountAggregator<'a> {
    pub fn new(
        config: &'a EngineConfig,
        directory: &'a AccountDirectory,
        client: &'a dyn BillingClient,
        broker: &'a dyn CredentialBroker,
    ) -> Self {
        Self {
            config,
            directory,
            client,
            broker,
        }
    }

    /// Build one merged summary over `accounts`
    ///
    /// The filter is built once, through the default client, and shared by
    /// every account. Failing to build it is fatal.
    pub async fn build(
        &self,
        request: &SummaryReportRequest,
        accounts: &[AccountTarget],
        window: TimeWindow,
        tag_window: TimeWindow,
    ) -> Result<BuiltReport> {
        let filter = self
            .config
            .filter_builder(&request.records)
            .build(self.client, tag_window, &self.config.retry)
            .await?;
        let mut warnings = filter.warnings;

        let normalizer = KeyNormalizer::new(
            self.directory,
            &request.group_by,
            self.config.domain_suffix.as_deref(),
        );

        let progress = if self.config.show_progress {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} [{elapsed_precise}] {pos}/{len} accounts")
            {
                pb.set_style(style);
            }
            pb.set_length(accounts.len() as u64);
            pb.set_message(format!("Building {}", request.name));
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            Some(pb)
        } else {
            None
        };

        let mut merged = TableAccumulator::new();
        for target in accounts {
            if let Some(pb) = &progress {
                pb.set_message(format!("Querying {}", target.account_id));
            }

            match self
                .account_table(request, target, filter.expression.clone(), window, &normalizer)
                .await
            {
                Ok(table) => merged.merge(table),
                Err(e) => {
                    warn!(
                        "{}: skipping account {}: {}",
                        request.name, target.account_id, e
                    );
                    warnings.push(ReportWarning::AccountSkipped {
                        report: request.name.clone(),
                        account_id: target.account_id.clone(),
                        reason: e.to_string(),
                    });
                }
            }

            if let Some(pb) = &progress {
                pb.inc(1);
            }
        }

        let skipped = warnings
            .iter()
            .filter(|w| matches!(w, ReportWarning::AccountSkipped { .. }))
            .count();
        if let Some(pb) = progress {
            pb.finish_with_message(format!(
                "Merged {} of {} accounts",
                accounts.len() - skipped,
                accounts.len()
            ));
        }

        let kind = if merged.is_empty() {
            RenderKind::Table
        } else {
            RenderKind::Chart
        };
        let entry = ReportEntry::new(&request.name, merged.into_report_table(), kind);
        info!(
            "Built {} across {} accounts ({} skipped)",
            entry.name,
            accounts.len(),
            skipped
        );
        Ok(BuiltReport { entry, warnings })
    }

    async fn account_table(
        &self,
        request: &SummaryReportRequest,
        target: &AccountTarget,
        filter: Option<FilterExpression>,
        window: TimeWindow,
        normalizer: &KeyNormalizer<'_>,
    ) -> Result<TableAccumulator> {
        let client = self.broker.assume_role(&target.account_id).await?;
        let query = CostQuery::monthly_unblended(window, request.group_by.clone(), filter);
        let buckets = fetch_buckets(client.as_ref(), &query, &self.config.retry).await?;

        let scope = KeyScope::Account {
            account_id: target.account_id.clone(),
            login: target.login.clone(),
        };
        let mut table = TableAccumulator::new();
        table
            .add_buckets(
                &buckets,
                UNBLENDED_COST,
                normalizer,
                &scope,
                !request.group_by.is_empty(),
            )
            .map_err(|e| match e {
                CostsheetError::MalformedResponse(message) => CostsheetError::MalformedResponse(
                    format!("account {}: {message}", target.account_id),
                ),
                other => other,
            })?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::{BillingExport, Fault, Operation, ReplayClient};
    use costsheet_core::error::ServiceErrorKind;
    use costsheet_core::retry::RetryPolicy;
    use costsheet_core::types::{Group, MetricValue, ResultByTime};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn window() -> TimeWindow {
        TimeWindow::new(date(2024, 1, 1), date(2024, 3, 1))
    }

    fn month(m: u32) -> TimeWindow {
        TimeWindow::new(date(2024, m, 1), date(2024, m + 1, 1))
    }

    fn total(m: u32, amount: &str) -> ResultByTime {
        ResultByTime {
            time_period: month(m),
            total: BTreeMap::from([(UNBLENDED_COST.to_string(), MetricValue::usd(amount))]),
            groups: Vec::new(),
            estimated: false,
        }
    }

    fn cost_center(m: u32, amount: &str) -> ResultByTime {
        ResultByTime {
            time_period: month(m),
            total: BTreeMap::new(),
            groups: vec![Group {
                keys: vec!["CostCenter$rnd".to_string()],
                metrics: BTreeMap::from([(UNBLENDED_COST.to_string(), MetricValue::usd(amount))]),
            }],
            estimated: false,
        }
    }

    fn export_with(linked: Vec<(&str, BillingExport)>) -> BillingExport {
        BillingExport {
            linked: linked
                .into_iter()
                .map(|(id, export)| (id.to_string(), export))
                .collect(),
            ..Default::default()
        }
    }

    fn account_export(buckets: Vec<ResultByTime>) -> BillingExport {
        BillingExport {
            cost_and_usage: vec![buckets],
            ..Default::default()
        }
    }

    async fn run(
        client: &ReplayClient,
        request: &SummaryReportRequest,
        accounts: &[AccountTarget],
    ) -> BuiltReport {
        let config = EngineConfig::new(date(2024, 3, 10)).with_retry(RetryPolicy::none());
        let directory = AccountDirectory::empty();
        MultiAccountAggregator::new(&config, &directory, client, client)
            .build(request, accounts, window(), window())
            .await
            .unwrap()
    }

    #[test]
    fn test_account_target_parsing() {
        assert_eq!(
            "222233334444:finance".parse::<AccountTarget>().unwrap(),
            AccountTarget::new("222233334444", "finance")
        );
        assert!("222233334444".parse::<AccountTarget>().is_err());
        assert!(":finance".parse::<AccountTarget>().is_err());
    }

    #[tokio::test]
    async fn test_ungrouped_totals_labelled_by_login() {
        let client = ReplayClient::new(export_with(vec![
            ("111", account_export(vec![total(1, "10"), total(2, "12")])),
            ("222", account_export(vec![total(2, "30")])),
        ]));
        let built = run(
            &client,
            &SummaryReportRequest::new("Summary"),
            &[AccountTarget::new("111", "ops"), AccountTarget::new("222", "data")],
        )
        .await;

        let table = &built.entry.table;
        assert_eq!(built.entry.kind, RenderKind::Chart);
        assert_eq!(table.labels(), vec!["data 222", "ops 111"]);
        assert_eq!(table.series("ops 111"), Some(vec![10.0, 12.0]));
        // Account 222 had no January bucket
        assert_eq!(table.series("data 222"), Some(vec![0.0, 30.0]));
    }

    #[tokio::test]
    async fn test_merged_dates_are_chronological() {
        // The first account lacks the earlier month the second one has
        let client = ReplayClient::new(export_with(vec![
            ("111", account_export(vec![total(2, "5")])),
            ("222", account_export(vec![total(1, "1"), total(2, "2")])),
        ]));
        let built = run(
            &client,
            &SummaryReportRequest::new("Summary"),
            &[AccountTarget::new("111", "ops"), AccountTarget::new("222", "data")],
        )
        .await;

        let table = &built.entry.table;
        assert_eq!(table.columns, vec!["2024-01-01", "2024-02-01"]);
        assert_eq!(table.series("data 222"), Some(vec![1.0, 2.0]));
        assert_eq!(table.series("ops 111"), Some(vec![0.0, 5.0]));
        assert_eq!(table.labels(), vec!["ops 111", "data 222"]);
    }

    #[tokio::test]
    async fn test_same_key_in_two_accounts_stays_apart() {
        let client = ReplayClient::new(export_with(vec![
            ("111", account_export(vec![cost_center(1, "5")])),
            ("222", account_export(vec![cost_center(1, "7")])),
        ]));
        let request = SummaryReportRequest::new("CostCenters")
            .group_by(GroupDefinition::tag("CostCenter"));
        let built = run(
            &client,
            &request,
            &[AccountTarget::new("111", "ops"), AccountTarget::new("222", "data")],
        )
        .await;

        assert_eq!(built.entry.table.labels(), vec!["rnd 222", "rnd 111"]);
    }

    #[tokio::test]
    async fn test_failed_account_is_skipped() {
        let mut broken = account_export(vec![total(1, "99")]);
        broken.faults.push(Fault::always(
            Operation::CostAndUsage,
            ServiceErrorKind::AccessDenied,
            "explicit deny",
        ));
        let client = ReplayClient::new(export_with(vec![
            ("111", account_export(vec![total(1, "10")])),
            ("222", broken),
        ]));
        let accounts = [
            AccountTarget::new("111", "ops"),
            AccountTarget::new("222", "data"),
            AccountTarget::new("333", "gone"),
        ];
        let built = run(&client, &SummaryReportRequest::new("Summary"), &accounts).await;

        assert_eq!(built.entry.table.labels(), vec!["ops 111"]);
        let skipped: Vec<_> = built
            .warnings
            .iter()
            .filter_map(|w| match w {
                ReportWarning::AccountSkipped { account_id, .. } => Some(account_id.as_str()),
                _ => None,
            })
            .collect();
        // 222 fails its query, 333 has no role to assume
        assert_eq!(skipped, vec!["222", "333"]);
    }

    #[tokio::test]
    async fn test_all_accounts_failing_degrades_to_table() {
        let client = ReplayClient::new(BillingExport::default());
        let built = run(
            &client,
            &SummaryReportRequest::new("Summary"),
            &[AccountTarget::new("111", "ops")],
        )
        .await;
        assert_eq!(built.entry.kind, RenderKind::Table);
        assert!(built.entry.table.is_empty());
        assert_eq!(built.warnings.len(), 1);
    }
}
