//! Grouped cost reports
//!
//! [`CostReportBuilder`] runs one grouped cost-and-usage query over the
//! reporting window and shapes the buckets into a category × date table,
//! optionally converted into period-over-period change.

use crate::accounts::AccountDirectory;
use crate::aggregation::{KeyNormalizer, KeyScope, TableAccumulator};
use crate::config::EngineConfig;
use costsheet_core::error::Result;
use costsheet_core::filters::RecordTypePolicy;
use costsheet_core::pagination::drain_pages;
use costsheet_core::provider::BillingClient;
use costsheet_core::report::{RenderKind, ReportEntry, ReportWarning};
use costsheet_core::retry::RetryPolicy;
use costsheet_core::types::{
    CostQuery, GroupDefinition, ReportStyle, ResultByTime, UNBLENDED_COST,
};
use costsheet_core::windows::TimeWindow;
use tracing::info;

/// Which records a report counts
///
/// Combined with the engine-wide flags: support is counted if either side
/// counts it, tax is dropped if either side drops it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOptions {
    /// Record policy; `None` sends no filter at all
    pub record_types: Option<RecordTypePolicy>,
    pub include_support: bool,
    pub include_tax: bool,
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self {
            record_types: Some(RecordTypePolicy::default()),
            include_support: false,
            include_tax: true,
        }
    }
}

/// One grouped cost report to build
///
/// # Examples
/// ```
/// use costsheet::cost_report::CostReportRequest;
/// use costsheet_core::types::{GroupDefinition, ReportStyle};
///
/// let request = CostReportRequest::new("Services")
///     .group_by(GroupDefinition::dimension("SERVICE"))
///     .including_support();
/// assert_eq!(request.style, ReportStyle::Total);
/// assert!(request.records.include_support);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostReportRequest {
    pub name: String,
    pub group_by: Vec<GroupDefinition>,
    pub style: ReportStyle,
    pub records: RecordOptions,
}

impl CostReportRequest {
    /// Ungrouped absolute totals with the default record policy
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group_by: Vec::new(),
            style: ReportStyle::Total,
            records: RecordOptions::default(),
        }
    }

    pub fn group_by(mut self, definition: GroupDefinition) -> Self {
        self.group_by.push(definition);
        self
    }

    pub fn style(mut self, style: ReportStyle) -> Self {
        self.style = style;
        self
    }

    pub fn record_types(mut self, policy: RecordTypePolicy) -> Self {
        self.records.record_types = Some(policy);
        self
    }

    /// Send no record type filter at all
    pub fn unfiltered(mut self) -> Self {
        self.records.record_types = None;
        self
    }

    pub fn including_support(mut self) -> Self {
        self.records.include_support = true;
        self
    }

    pub fn excluding_tax(mut self) -> Self {
        self.records.include_tax = false;
        self
    }
}

/// A shaped report plus the degradations noticed while building it
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltReport {
    pub entry: ReportEntry,
    pub warnings: Vec<ReportWarning>,
}

/// Drain every bucket of `query` from `client`
pub async fn fetch_buckets(
    client: &dyn BillingClient,
    query: &CostQuery,
    retry: &RetryPolicy,
) -> Result<Vec<ResultByTime>> {
    drain_pages("GetCostAndUsage", |token| {
        retry.run("GetCostAndUsage", move || client.cost_and_usage(query, token.clone()))
    })
    .await
}

/// Builds grouped cost reports
pub struct CostReportBuilder<'a> {
    config: &'a EngineConfig,
    directory: &'a AccountDirectory,
    client: &'a dyn BillingClient,
}

impl<'a> CostReportBuilder<'a> {
    pub fn new(
        config: &'a EngineConfig,
        directory: &'a AccountDirectory,
        client: &'a dyn BillingClient,
    ) -> Self {
        Self {
            config,
            directory,
            client,
        }
    }

    /// Query and shape one report over `window`
    ///
    /// With `override_client` the query, its pages and the tag lookup all go
    /// to that client instead of the default one.
    pub async fn build(
        &self,
        request: &CostReportRequest,
        window: TimeWindow,
        tag_window: TimeWindow,
        override_client: Option<&dyn BillingClient>,
    ) -> Result<BuiltReport> {
        let client = override_client.unwrap_or(self.client);
        let retry = &self.config.retry;

        let filter = self
            .config
            .filter_builder(&request.records)
            .build(client, tag_window, retry)
            .await?;
        let mut warnings = filter.warnings;

        let query = CostQuery::monthly_unblended(window, request.group_by.clone(), filter.expression);
        let buckets = fetch_buckets(client, &query, retry).await?;

        let normalizer = KeyNormalizer::new(
            self.directory,
            &request.group_by,
            self.config.domain_suffix.as_deref(),
        );
        let mut table = TableAccumulator::new();
        table.add_buckets(
            &buckets,
            UNBLENDED_COST,
            &normalizer,
            &KeyScope::Plain,
            !request.group_by.is_empty(),
        )?;

        if request.style == ReportStyle::Change {
            let (changes, change_warnings) = table.into_changes(&request.name);
            table = changes;
            warnings.extend(change_warnings);
        }

        let kind = if table.is_empty() {
            RenderKind::Table
        } else {
            RenderKind::Chart
        };
        let entry = ReportEntry::new(&request.name, table.into_report_table(), kind);
        info!(
            "Built {} from {} buckets ({} rows)",
            entry.name,
            buckets.len(),
            entry.table.rows.len()
        );

        Ok(BuiltReport { entry, warnings })
    }
}
