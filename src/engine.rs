//! Report engine
//!
//! [`ReportEngine`] ties the builders together for one run. It loads the
//! account directory and derives the reporting windows once, then appends one
//! entry per `add_*` call to its [`ReportCollection`], in call order, along
//! with the warnings raised while building it.
//!
//! # Examples
//!
//! ```
//! use costsheet::config::EngineConfig;
//! use costsheet::cost_report::CostReportRequest;
//! use costsheet::engine::ReportEngine;
//! use costsheet::replay::{BillingExport, ReplayClient};
//! use chrono::NaiveDate;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let client = Arc::new(ReplayClient::new(BillingExport::default()));
//! let config = EngineConfig::new(NaiveDate::from_ymd_opt(2024, 8, 17).unwrap());
//! let mut engine = ReportEngine::new(config, client.clone(), client.as_ref(), None)
//!     .await
//!     .unwrap();
//!
//! engine.add_cost_report(&CostReportRequest::new("Total")).await.unwrap();
//! let collection = engine.into_collection();
//! assert_eq!(collection.len(), 1);
//! # });
//! ```

use crate::accounts::AccountDirectory;
use crate::config::EngineConfig;
use crate::cost_report::{BuiltReport, CostReportBuilder, CostReportRequest};
use crate::multi_account::{AccountTarget, MultiAccountAggregator, SummaryReportRequest};
use crate::reservation::{ReservationReport, ReservedCapacityReportBuilder};
use costsheet_core::error::{CostsheetError, Result};
use costsheet_core::provider::{AccountRegistry, BillingClient, CredentialBroker};
use costsheet_core::report::ReportCollection;
use costsheet_core::types::{GroupDefinition, ReportStyle};
use costsheet_core::windows::ReportWindows;
use std::sync::Arc;
use tracing::{debug, info};

/// Builds the reports of one run into a [`ReportCollection`]
pub struct ReportEngine {
    config: EngineConfig,
    windows: ReportWindows,
    client: Arc<dyn BillingClient>,
    broker: Option<Arc<dyn CredentialBroker>>,
    directory: AccountDirectory,
    collection: ReportCollection,
}

impl ReportEngine {
    /// Prepare a run
    ///
    /// Fails only if the reporting windows cannot be derived. An unreachable
    /// account registry degrades to raw account ids and is recorded as the
    /// collection's first warning.
    pub async fn new(
        config: EngineConfig,
        client: Arc<dyn BillingClient>,
        registry: &dyn AccountRegistry,
        broker: Option<Arc<dyn CredentialBroker>>,
    ) -> Result<Self> {
        let windows = config.windows()?;
        let directory = AccountDirectory::load(registry, &config.account_label, &config.retry).await;

        let mut collection = ReportCollection::new();
        collection.extend_warnings(directory.warning().cloned());

        Ok(Self {
            config,
            windows,
            client,
            broker,
            directory,
            collection,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn windows(&self) -> &ReportWindows {
        &self.windows
    }

    pub fn directory(&self) -> &AccountDirectory {
        &self.directory
    }

    /// Reports built so far
    pub fn collection(&self) -> &ReportCollection {
        &self.collection
    }

    /// Finish the run
    pub fn into_collection(self) -> ReportCollection {
        self.collection
    }

    fn append(&mut self, built: BuiltReport) {
        self.collection.extend_warnings(built.warnings);
        self.collection.push(built.entry);
    }

    fn broker(&self) -> Result<Arc<dyn CredentialBroker>> {
        self.broker.clone().ok_or_else(|| {
            CostsheetError::Config("cross-account reports need a credential broker".to_string())
        })
    }

    /// Build a cost report with the default client
    pub async fn add_cost_report(&mut self, request: &CostReportRequest) -> Result<()> {
        let built = CostReportBuilder::new(&self.config, &self.directory, self.client.as_ref())
            .build(request, self.windows.reporting, self.windows.tags, None)
            .await?;
        self.append(built);
        Ok(())
    }

    /// Build a cost report inside `account_id`, through an assumed role
    pub async fn add_account_cost_report(
        &mut self,
        request: &CostReportRequest,
        account_id: &str,
    ) -> Result<()> {
        let scoped = self.broker()?.assume_role(account_id).await?;
        let built = CostReportBuilder::new(&self.config, &self.directory, self.client.as_ref())
            .build(
                request,
                self.windows.reporting,
                self.windows.tags,
                Some(scoped.as_ref()),
            )
            .await?;
        self.append(built);
        Ok(())
    }

    /// Build a reserved capacity report with the default client
    pub async fn add_reservation_report(&mut self, report: &ReservationReport) -> Result<()> {
        let entry = ReservedCapacityReportBuilder::new(
            self.client.as_ref(),
            &self.windows,
            &self.config.retry,
        )
        .build(report)
        .await?;
        self.collection.push(entry);
        Ok(())
    }

    /// Build one summary merged across `accounts`
    pub async fn add_summary_report(
        &mut self,
        request: &SummaryReportRequest,
        accounts: &[AccountTarget],
    ) -> Result<()> {
        let broker = self.broker()?;
        let built = MultiAccountAggregator::new(
            &self.config,
            &self.directory,
            self.client.as_ref(),
            broker.as_ref(),
        )
        .build(request, accounts, self.windows.reporting, self.windows.tags)
        .await?;
        self.append(built);
        Ok(())
    }

    /// Run the standard set of reports
    ///
    /// With summary accounts configured: the cross-account `Summary`, then one
    /// tag report per group account and cost tag. Otherwise: `<tag>` and
    /// `Change-<tag>` per cost tag, then `Total`, `TotalChange`, `Services`
    /// and `Regions`, then the reserved capacity reports if enabled.
    pub async fn run_default_plan(&mut self) -> Result<()> {
        let cost_tags = self.config.cost_tags.clone();

        if !self.config.summary_accounts.is_empty() {
            info!(
                "Running cross-account plan over {} accounts",
                self.config.summary_accounts.len()
            );
            let accounts = self.config.summary_accounts.clone();
            self.add_summary_report(&SummaryReportRequest::new("Summary").including_support(), &accounts)
                .await?;

            for account in self.config.group_accounts.clone() {
                for tag in &cost_tags {
                    let request = CostReportRequest::new(format!("{account}-{tag}"))
                        .group_by(GroupDefinition::tag(tag));
                    self.add_account_cost_report(&request, &account).await?;
                }
            }
            return Ok(());
        }

        info!("Running plan for {}", self.windows.reporting);
        for tag in &cost_tags {
            let by_tag = CostReportRequest::new(tag.as_str()).group_by(GroupDefinition::tag(tag));
            self.add_cost_report(&by_tag).await?;
            self.add_cost_report(&CostReportRequest {
                name: format!("Change-{tag}"),
                style: ReportStyle::Change,
                ..by_tag
            })
            .await?;
        }

        self.add_cost_report(&CostReportRequest::new("Total").including_support())
            .await?;
        self.add_cost_report(&CostReportRequest::new("TotalChange").style(ReportStyle::Change))
            .await?;
        self.add_cost_report(
            &CostReportRequest::new("Services")
                .group_by(GroupDefinition::dimension("SERVICE"))
                .including_support(),
        )
        .await?;
        self.add_cost_report(
            &CostReportRequest::new("Regions").group_by(GroupDefinition::dimension("REGION")),
        )
        .await?;

        if self.config.reservation_reports {
            let reports = [
                ReservationReport::Coverage,
                ReservationReport::Utilization,
                ReservationReport::UtilizationSavings,
                ReservationReport::Recommendation(self.config.recommendation.clone()),
            ];
            for report in &reports {
                self.add_reservation_report(report).await?;
            }
        }

        debug!("Plan produced {} reports", self.collection.len());
        Ok(())
    }
}
