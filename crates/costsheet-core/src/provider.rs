//! Collaborator traits for the billing services
//!
//! The engine never talks to a cloud API directly. It is handed objects that
//! implement these traits: a billing client for cost, tag and reservation
//! queries, a registry that lists accounts, and a broker that hands out a
//! billing client scoped to another account. Every operation answers one page
//! at a time; callers drain them with [`drain_pages`](crate::pagination::drain_pages).

use crate::error::Result;
use crate::pagination::Page;
use crate::types::{
    CostQuery, CoverageByTime, OrganizationAccount, RecommendationQuery,
    ReservationPurchaseRecommendation, ResultByTime, TagQuery, UtilizationByTime,
};
use crate::windows::TimeWindow;
use async_trait::async_trait;
use std::sync::Arc;

/// Grouped cost-and-usage queries
#[async_trait]
pub trait CostQueryService: Send + Sync {
    /// One page of time-bucketed cost records
    async fn cost_and_usage(
        &self,
        query: &CostQuery,
        next_token: Option<String>,
    ) -> Result<Page<ResultByTime>>;
}

/// Cost allocation tag enumeration
#[async_trait]
pub trait TagService: Send + Sync {
    /// One page of tag values matching the query
    async fn tag_values(&self, query: &TagQuery, next_token: Option<String>)
    -> Result<Page<String>>;
}

/// Reserved capacity queries
#[async_trait]
pub trait ReservationService: Send + Sync {
    /// One page of monthly reservation coverage
    async fn reservation_coverage(
        &self,
        window: &TimeWindow,
        next_token: Option<String>,
    ) -> Result<Page<CoverageByTime>>;

    /// One page of monthly reservation utilization
    async fn reservation_utilization(
        &self,
        window: &TimeWindow,
        next_token: Option<String>,
    ) -> Result<Page<UtilizationByTime>>;

    /// One page of purchase recommendations
    async fn reservation_purchase_recommendation(
        &self,
        query: &RecommendationQuery,
        next_token: Option<String>,
    ) -> Result<Page<ReservationPurchaseRecommendation>>;
}

/// Everything a report needs from one billing endpoint
///
/// Implemented automatically for any type providing the three services.
pub trait BillingClient: CostQueryService + TagService + ReservationService {}

impl<T> BillingClient for T where T: CostQueryService + TagService + ReservationService + ?Sized {}

/// Lists the accounts of an organization
#[async_trait]
pub trait AccountRegistry: Send + Sync {
    /// One page of accounts
    async fn list_accounts(&self, next_token: Option<String>) -> Result<Page<OrganizationAccount>>;
}

/// Hands out billing clients acting inside another account
#[async_trait]
pub trait CredentialBroker: Send + Sync {
    /// Assume the reporting role in `account_id`
    async fn assume_role(&self, account_id: &str) -> Result<Arc<dyn BillingClient>>;
}
