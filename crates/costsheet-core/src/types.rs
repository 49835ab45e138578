//! Core domain types for costsheet
//!
//! This module contains the request and record types exchanged with the
//! billing collaborators, plus the small strongly-typed wrappers used while
//! shaping reports. Record types mirror the billing API's JSON shape
//! (PascalCase field names, decimal amounts carried as strings) so a recorded
//! response can be deserialized without translation.

use crate::error::{CostsheetError, Result};
use crate::filters::FilterExpression;
use crate::windows::TimeWindow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metric every cost report is built from
pub const UNBLENDED_COST: &str = "UnblendedCost";

/// Dimension whose group keys are account identifiers
pub const LINKED_ACCOUNT: &str = "LINKED_ACCOUNT";

/// Category label a cost amount is attributed to within one bucket
///
/// # Examples
/// ```
/// use costsheet_core::types::GroupKey;
///
/// let key = GroupKey::new("Amazon Elastic Compute Cloud - Compute");
/// assert_eq!(key.as_str(), "Amazon Elastic Compute Cloud - Compute");
/// assert_eq!(GroupKey::no_tag().as_str(), "(No Tag)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey(String);

impl GroupKey {
    /// Sentinel label for resources without the grouped tag
    pub const NO_TAG: &'static str = "(No Tag)";

    /// Column used when a bucket carries no groups at all
    pub const TOTAL: &'static str = "Total";

    /// Create a new GroupKey from any string-like type
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The `(No Tag)` sentinel key
    pub fn no_tag() -> Self {
        Self::new(Self::NO_TAG)
    }

    /// The `Total` key used for ungrouped buckets
    pub fn total() -> Self {
        Self::new(Self::TOTAL)
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for GroupKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Time granularity of a cost query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Granularity {
    Daily,
    #[default]
    Monthly,
}

/// Kind of breakdown a group definition requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupDefinitionType {
    Dimension,
    Tag,
    CostCategory,
}

/// One breakdown dimension of a grouped cost query
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GroupDefinition {
    #[serde(rename = "Type")]
    pub kind: GroupDefinitionType,
    pub key: String,
}

impl GroupDefinition {
    /// Group by a billing dimension such as `SERVICE` or `REGION`
    pub fn dimension(key: impl Into<String>) -> Self {
        Self {
            kind: GroupDefinitionType::Dimension,
            key: key.into(),
        }
    }

    /// Group by a cost allocation tag
    pub fn tag(key: impl Into<String>) -> Self {
        Self {
            kind: GroupDefinitionType::Tag,
            key: key.into(),
        }
    }

    /// Whether the group keys produced by this definition are account ids
    pub fn is_account_dimension(&self) -> bool {
        self.kind == GroupDefinitionType::Dimension && self.key == LINKED_ACCOUNT
    }
}

/// Whether a report shows absolute amounts or period-over-period change
///
/// # Examples
/// ```
/// use costsheet_core::types::ReportStyle;
/// use std::str::FromStr;
///
/// assert_eq!(ReportStyle::from_str("change").unwrap(), ReportStyle::Change);
/// assert_eq!(ReportStyle::Total.to_string(), "total");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStyle {
    /// Absolute amount per bucket
    #[default]
    Total,
    /// Difference from the immediately preceding bucket
    Change,
}

impl fmt::Display for ReportStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Total => write!(f, "total"),
            Self::Change => write!(f, "change"),
        }
    }
}

impl std::str::FromStr for ReportStyle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "total" => Ok(Self::Total),
            "change" => Ok(Self::Change),
            _ => Err(format!("Invalid report style: {s}")),
        }
    }
}

/// Payment option for reservation purchase recommendations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentOption {
    NoUpfront,
    #[default]
    PartialUpfront,
    AllUpfront,
}

impl fmt::Display for PaymentOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoUpfront => write!(f, "NO_UPFRONT"),
            Self::PartialUpfront => write!(f, "PARTIAL_UPFRONT"),
            Self::AllUpfront => write!(f, "ALL_UPFRONT"),
        }
    }
}

impl std::str::FromStr for PaymentOption {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "NO_UPFRONT" => Ok(Self::NoUpfront),
            "PARTIAL_UPFRONT" => Ok(Self::PartialUpfront),
            "ALL_UPFRONT" => Ok(Self::AllUpfront),
            _ => Err(format!("Invalid payment option: {s}")),
        }
    }
}

/// Lookback used to compute purchase recommendations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LookbackPeriod {
    SevenDays,
    ThirtyDays,
    #[default]
    SixtyDays,
}

/// Reservation term used for purchase recommendations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TermInYears {
    #[default]
    OneYear,
    ThreeYears,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A grouped cost-and-usage query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CostQuery {
    pub time_period: TimeWindow,
    pub granularity: Granularity,
    pub metrics: Vec<String>,
    #[serde(default)]
    pub group_by: Vec<GroupDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterExpression>,
}

impl CostQuery {
    /// Monthly unblended cost over `window`, grouped as requested
    pub fn monthly_unblended(
        window: TimeWindow,
        group_by: Vec<GroupDefinition>,
        filter: Option<FilterExpression>,
    ) -> Self {
        Self {
            time_period: window,
            granularity: Granularity::Monthly,
            metrics: vec![UNBLENDED_COST.to_string()],
            group_by,
            filter,
        }
    }
}

/// A tag value enumeration query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TagQuery {
    pub search_string: String,
    pub time_period: TimeWindow,
    pub tag_key: String,
}

/// A reservation purchase recommendation query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecommendationQuery {
    pub lookback_period_in_days: LookbackPeriod,
    pub term_in_years: TermInYears,
    pub payment_option: PaymentOption,
    pub service: String,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Parse a decimal amount as delivered by the billing API
pub fn parse_amount(field: &str, raw: &str) -> Result<f64> {
    raw.trim().parse::<f64>().map_err(|_| {
        CostsheetError::MalformedResponse(format!("{field} is not a number: '{raw}'"))
    })
}

/// A metric amount, e.g. `{"Amount": "12.34", "Unit": "USD"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricValue {
    pub amount: String,
    #[serde(default)]
    pub unit: String,
}

impl MetricValue {
    /// Create a USD metric value
    pub fn usd(amount: impl Into<String>) -> Self {
        Self {
            amount: amount.into(),
            unit: "USD".to_string(),
        }
    }

    /// The amount as a float
    pub fn value(&self) -> Result<f64> {
        parse_amount("Amount", &self.amount)
    }
}

/// One group inside a time bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Group {
    pub keys: Vec<String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricValue>,
}

impl Group {
    /// First group key, or an empty string when the collaborator sent none
    pub fn primary_key(&self) -> &str {
        self.keys.first().map(String::as_str).unwrap_or("")
    }

    /// Amount of `metric` for this group
    pub fn amount(&self, metric: &str) -> Result<f64> {
        self.metrics
            .get(metric)
            .ok_or_else(|| {
                CostsheetError::MalformedResponse(format!(
                    "group '{}' has no {metric} metric",
                    self.primary_key()
                ))
            })?
            .value()
    }
}

/// One time bucket of a cost-and-usage response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResultByTime {
    pub time_period: TimeWindow,
    #[serde(default)]
    pub total: BTreeMap<String, MetricValue>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub estimated: bool,
}

impl ResultByTime {
    /// Aggregate amount of `metric` for the whole bucket
    pub fn total_amount(&self, metric: &str) -> Result<f64> {
        self.total
            .get(metric)
            .ok_or_else(|| {
                CostsheetError::MalformedResponse(format!(
                    "bucket {} has no {metric} total",
                    self.time_period.start
                ))
            })?
            .value()
    }
}

/// Hours covered by reservations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CoverageHours {
    pub coverage_hours_percentage: String,
}

/// Reservation coverage aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Coverage {
    pub coverage_hours: CoverageHours,
}

/// One time bucket of a reservation coverage response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CoverageByTime {
    pub time_period: TimeWindow,
    pub total: Coverage,
}

/// Reservation utilization aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReservationAggregates {
    pub utilization_percentage: String,
    #[serde(rename = "NetRISavings")]
    pub net_ri_savings: String,
}

/// One time bucket of a reservation utilization response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UtilizationByTime {
    pub time_period: TimeWindow,
    pub total: ReservationAggregates,
}

/// One suggested purchase inside a recommendation
///
/// `instance_details` is keyed by service family (e.g. `EC2InstanceDetails`)
/// and holds the attributes describing the instance to buy. Both levels keep
/// the order the response listed them in.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RecommendationDetail {
    pub instance_details: serde_json::Map<String, serde_json::Value>,
    pub recommended_number_of_instances_to_purchase: Option<String>,
    pub minimum_number_of_instances_used_per_hour: Option<String>,
    pub maximum_number_of_instances_used_per_hour: Option<String>,
    pub estimated_monthly_savings_amount: Option<String>,
    pub estimated_monthly_on_demand_cost: Option<String>,
    pub estimated_break_even_in_months: Option<String>,
    pub upfront_cost: Option<String>,
    pub recurring_standard_monthly_cost: Option<String>,
}

/// A reservation purchase recommendation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ReservationPurchaseRecommendation {
    pub recommendation_details: Vec<RecommendationDetail>,
}

/// One account as listed by the organization registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrganizationAccount {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Any further attributes (alias, status, ARN, ...)
    #[serde(flatten)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl OrganizationAccount {
    /// Create an account with a display name
    pub fn named(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
            email: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Look up a further attribute as text
    pub fn attribute(&self, field: &str) -> Option<String> {
        self.attributes.get(field).and_then(|value| match value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        })
    }
}
