//! Recorded billing export client
//!
//! [`ReplayClient`] answers every collaborator operation from a JSON document
//! of recorded responses instead of a live billing API. Each operation holds a
//! list of pages, linked by synthetic `page-N` continuation tokens. Recorded
//! faults let an export reproduce throttling, permission errors and the like.
//!
//! ```json
//! {
//!   "cost_and_usage": [[{"TimePeriod": {"Start": "2024-01-01", "End": "2024-02-01"},
//!                        "Total": {"UnblendedCost": {"Amount": "100", "Unit": "USD"}}}]],
//!   "accounts": [[{"Id": "111122223333", "Name": "ops"}]],
//!   "linked": {"111122223333": {"cost_and_usage": [[]]}},
//!   "faults": [{"operation": "tags", "kind": "throttling", "message": "slow down", "times": 1}]
//! }
//! ```
//!
//! Role assumption hands out a client for the nested export recorded under the
//! account id in `linked`. Unknown accounts are denied.

use costsheet_core::error::{CostsheetError, Result, ServiceError, ServiceErrorKind};
use costsheet_core::pagination::Page;
use costsheet_core::provider::{
    AccountRegistry, BillingClient, CostQueryService, CredentialBroker, ReservationService,
    TagService,
};
use costsheet_core::types::{
    CostQuery, CoverageByTime, OrganizationAccount, RecommendationQuery,
    ReservationPurchaseRecommendation, ResultByTime, TagQuery, UtilizationByTime,
};
use costsheet_core::windows::TimeWindow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Collaborator operation a fault applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CostAndUsage,
    Tags,
    Coverage,
    Utilization,
    Recommendations,
    Accounts,
    AssumeRole,
}

impl Operation {
    /// Billing API name of the operation
    pub fn api_name(self) -> &'static str {
        match self {
            Self::CostAndUsage => "GetCostAndUsage",
            Self::Tags => "GetTags",
            Self::Coverage => "GetReservationCoverage",
            Self::Utilization => "GetReservationUtilization",
            Self::Recommendations => "GetReservationPurchaseRecommendation",
            Self::Accounts => "ListAccounts",
            Self::AssumeRole => "AssumeRole",
        }
    }
}

/// A recorded failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub operation: Operation,
    pub kind: ServiceErrorKind,
    pub message: String,
    /// Fail only the first `times` calls; `None` fails every call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub times: Option<u32>,
}

impl Fault {
    /// Fail every call of `operation`
    pub fn always(operation: Operation, kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            times: None,
        }
    }

    /// Fail the first `times` calls of `operation`
    pub fn times(
        operation: Operation,
        kind: ServiceErrorKind,
        message: impl Into<String>,
        times: u32,
    ) -> Self {
        Self {
            times: Some(times),
            ..Self::always(operation, kind, message)
        }
    }
}

/// Recorded responses of every collaborator operation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingExport {
    pub cost_and_usage: Vec<Vec<ResultByTime>>,
    pub tags: Vec<Vec<String>>,
    pub coverage: Vec<Vec<CoverageByTime>>,
    pub utilization: Vec<Vec<UtilizationByTime>>,
    pub recommendations: Vec<Vec<ReservationPurchaseRecommendation>>,
    pub accounts: Vec<Vec<OrganizationAccount>>,
    /// Exports answering for other accounts after role assumption
    pub linked: BTreeMap<String, BillingExport>,
    pub faults: Vec<Fault>,
}

#[derive(Debug, Default)]
struct ReplayState {
    calls: HashMap<Operation, u32>,
    cost_queries: Vec<CostQuery>,
}

/// Serves a [`BillingExport`] through the collaborator traits
#[derive(Debug)]
pub struct ReplayClient {
    export: BillingExport,
    linked: BTreeMap<String, Arc<ReplayClient>>,
    state: Mutex<ReplayState>,
}

impl ReplayClient {
    pub fn new(mut export: BillingExport) -> Self {
        let linked = std::mem::take(&mut export.linked)
            .into_iter()
            .map(|(account_id, nested)| (account_id, Arc::new(Self::new(nested))))
            .collect();
        Self {
            export,
            linked,
            state: Mutex::new(ReplayState::default()),
        }
    }

    /// Parse an export from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    /// Load an export file
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let client = Self::from_json(&content).map_err(|e| match e {
            CostsheetError::Json(json) => {
                CostsheetError::Config(format!("{}: invalid billing export: {json}", path.display()))
            }
            other => other,
        })?;
        debug!("Loaded billing export from {}", path.display());
        Ok(client)
    }

    /// Cost queries received so far, in order
    pub fn cost_queries(&self) -> Vec<CostQuery> {
        self.state().cost_queries.clone()
    }

    /// Number of calls received for `operation`
    pub fn calls(&self, operation: Operation) -> u32 {
        self.state().calls.get(&operation).copied().unwrap_or(0)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ReplayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call and fail it if a recorded fault applies
    fn begin(&self, operation: Operation) -> Result<()> {
        let call = {
            let mut state = self.state();
            let calls = state.calls.entry(operation).or_insert(0);
            *calls += 1;
            *calls
        };

        let fault = self.export.faults.iter().find(|fault| {
            fault.operation == operation && fault.times.is_none_or(|times| call <= times)
        });
        match fault {
            Some(fault) => {
                debug!("Replaying recorded {} fault for {}", fault.kind, operation.api_name());
                Err(ServiceError::new(fault.kind, operation.api_name(), fault.message.clone()).into())
            }
            None => Ok(()),
        }
    }

    fn page<T: Clone>(
        &self,
        operation: Operation,
        pages: &[Vec<T>],
        token: Option<String>,
    ) -> Result<Page<T>> {
        self.begin(operation)?;

        let index = match token {
            None => 0,
            Some(token) => token
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|index| *index > 0 && *index < pages.len())
                .ok_or_else(|| {
                    ServiceError::new(
                        ServiceErrorKind::Validation,
                        operation.api_name(),
                        format!("invalid NextPageToken '{token}'"),
                    )
                })?,
        };

        let items = pages.get(index).cloned().unwrap_or_default();
        if index + 1 < pages.len() {
            Ok(Page::more(items, format!("page-{}", index + 1)))
        } else {
            Ok(Page::last(items))
        }
    }
}

#[async_trait]
impl CostQueryService for ReplayClient {
    async fn cost_and_usage(
        &self,
        query: &CostQuery,
        next_token: Option<String>,
    ) -> Result<Page<ResultByTime>> {
        self.state().cost_queries.push(query.clone());
        self.page(Operation::CostAndUsage, &self.export.cost_and_usage, next_token)
    }
}

#[async_trait]
impl TagService for ReplayClient {
    async fn tag_values(&self, _query: &TagQuery, next_token: Option<String>) -> Result<Page<String>> {
        self.page(Operation::Tags, &self.export.tags, next_token)
    }
}

#[async_trait]
impl ReservationService for ReplayClient {
    async fn reservation_coverage(
        &self,
        _window: &TimeWindow,
        next_token: Option<String>,
    ) -> Result<Page<CoverageByTime>> {
        self.page(Operation::Coverage, &self.export.coverage, next_token)
    }

    async fn reservation_utilization(
        &self,
        _window: &TimeWindow,
        next_token: Option<String>,
    ) -> Result<Page<UtilizationByTime>> {
        self.page(Operation::Utilization, &self.export.utilization, next_token)
    }

    async fn reservation_purchase_recommendation(
        &self,
        _query: &RecommendationQuery,
        next_token: Option<String>,
    ) -> Result<Page<ReservationPurchaseRecommendation>> {
        self.page(Operation::Recommendations, &self.export.recommendations, next_token)
    }
}

#[async_trait]
impl AccountRegistry for ReplayClient {
    async fn list_accounts(&self, next_token: Option<String>) -> Result<Page<OrganizationAccount>> {
        self.page(Operation::Accounts, &self.export.accounts, next_token)
    }
}

#[async_trait]
impl CredentialBroker for ReplayClient {
    async fn assume_role(&self, account_id: &str) -> Result<Arc<dyn BillingClient>> {
        self.begin(Operation::AssumeRole)?;
        match self.linked.get(account_id) {
            Some(client) => {
                let client: Arc<dyn BillingClient> = client.clone();
                Ok(client)
            }
            None => Err(ServiceError::new(
                ServiceErrorKind::AccessDenied,
                Operation::AssumeRole.api_name(),
                format!("no recorded export for account {account_id}"),
            )
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use costsheet_core::pagination::drain_pages;
    use costsheet_core::retry::RetryPolicy;
    use std::io::Write;
    use std::time::Duration;

    #[tokio::test]
    async fn test_pages_link_with_synthetic_tokens() {
        let client = ReplayClient::new(BillingExport {
            tags: vec![vec!["a".into()], vec![], vec!["b".into(), "c".into()]],
            ..Default::default()
        });
        let query = TagQuery {
            search_string: "*".into(),
            time_period: TimeWindow::new(
                chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                chrono::NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            ),
            tag_key: "Owner".into(),
        };

        let first = client.tag_values(&query, None).await.unwrap();
        assert_eq!(first.next_token.as_deref(), Some("page-1"));

        let all = drain_pages("GetTags", |token| client.tag_values(&query, token))
            .await
            .unwrap();
        assert_eq!(all, vec!["a", "b", "c"]);
        assert_eq!(client.calls(Operation::Tags), 4);
    }

    #[tokio::test]
    async fn test_no_pages_serves_one_empty_page() {
        let client = ReplayClient::new(BillingExport::default());
        let page = client.list_accounts(None).await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.next_token, None);
    }

    #[tokio::test]
    async fn test_unknown_token_is_rejected() {
        let client = ReplayClient::new(BillingExport::default());
        let err = client.list_accounts(Some("bogus".into())).await.unwrap_err();
        assert_eq!(err.service_error().unwrap().kind, ServiceErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_limited_fault_recovers_under_retry() {
        let client = ReplayClient::new(BillingExport {
            accounts: vec![vec![OrganizationAccount::named("1", "one")]],
            faults: vec![Fault::times(
                Operation::Accounts,
                ServiceErrorKind::Throttling,
                "Rate exceeded",
                2,
            )],
            ..Default::default()
        });
        let retry = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let page = retry
            .run("ListAccounts", || client.list_accounts(None))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(client.calls(Operation::Accounts), 3);
    }

    #[tokio::test]
    async fn test_assume_role_uses_linked_export() {
        let mut linked = BTreeMap::new();
        linked.insert(
            "111122223333".to_string(),
            BillingExport {
                tags: vec![vec!["linked".into()]],
                ..Default::default()
            },
        );
        let client = ReplayClient::new(BillingExport {
            linked,
            ..Default::default()
        });

        let scoped = client.assume_role("111122223333").await.unwrap();
        let query = TagQuery {
            search_string: "*".into(),
            time_period: TimeWindow::new(
                chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                chrono::NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            ),
            tag_key: "Owner".into(),
        };
        assert_eq!(scoped.tag_values(&query, None).await.unwrap().items, vec!["linked"]);

        let denied = match client.assume_role("999999999999").await {
            Err(e) => e,
            Ok(_) => panic!("unknown account should be denied"),
        };
        assert_eq!(denied.service_error().unwrap().kind, ServiceErrorKind::AccessDenied);
    }

    #[tokio::test]
    async fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"accounts": [[{{"Id": "1", "Name": "one"}}]], "faults": [{{"operation": "tags", "kind": "access_denied", "message": "no"}}]}}"#
        )
        .unwrap();

        let client = ReplayClient::from_path(file.path()).await.unwrap();
        assert_eq!(client.list_accounts(None).await.unwrap().items.len(), 1);
        assert_eq!(client.export.faults[0].operation, Operation::Tags);
    }

    #[tokio::test]
    async fn test_from_path_invalid_json_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            ReplayClient::from_path(file.path()).await,
            Err(CostsheetError::Config(_))
        ));
    }
}
