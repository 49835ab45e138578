//! Reserved capacity reports
//!
//! Three independent query and shape pipelines: monthly reservation coverage,
//! monthly utilization (as a percentage or as net savings), and purchase
//! recommendations. Each has its own row schema.

use crate::aggregation::TableAccumulator;
use costsheet_core::error::Result;
use costsheet_core::pagination::drain_pages;
use costsheet_core::provider::BillingClient;
use costsheet_core::report::{CellValue, RenderKind, ReportEntry, ReportRow, ReportTable};
use costsheet_core::retry::RetryPolicy;
use costsheet_core::types::{
    parse_amount, GroupKey, LookbackPeriod, PaymentOption, RecommendationDetail,
    RecommendationQuery, TermInYears,
};
use costsheet_core::windows::ReportWindows;
use serde_json::Value;
use std::collections::HashMap;
use tracing::info;

/// Service recommendations are requested for unless configured otherwise
pub const DEFAULT_RECOMMENDATION_SERVICE: &str = "Amazon Elastic Compute Cloud - Compute";

/// What to ask purchase recommendations for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendationOptions {
    pub payment_option: PaymentOption,
    pub service: String,
}

impl Default for RecommendationOptions {
    fn default() -> Self {
        Self {
            payment_option: PaymentOption::default(),
            service: DEFAULT_RECOMMENDATION_SERVICE.to_string(),
        }
    }
}

/// The reserved capacity reports the engine can build
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationReport {
    /// Monthly coverage percentage over the reservation window
    Coverage,
    /// Monthly utilization percentage over the savings window
    Utilization,
    /// Monthly net savings over the savings window
    UtilizationSavings,
    /// Purchase recommendations, one row per suggested purchase
    Recommendation(RecommendationOptions),
}

impl ReservationReport {
    /// Sheet name the report is filed under
    pub fn name(&self) -> &'static str {
        match self {
            Self::Coverage => "RICoverage",
            Self::Utilization => "RIUtilization",
            Self::UtilizationSavings => "RIUtilizationSavings",
            Self::Recommendation(_) => "RIRecommendation",
        }
    }
}

/// Builds reserved capacity reports against one billing client
pub struct ReservedCapacityReportBuilder<'a> {
    client: &'a dyn BillingClient,
    windows: &'a ReportWindows,
    retry: &'a RetryPolicy,
}

impl<'a> ReservedCapacityReportBuilder<'a> {
    pub fn new(
        client: &'a dyn BillingClient,
        windows: &'a ReportWindows,
        retry: &'a RetryPolicy,
    ) -> Self {
        Self {
            client,
            windows,
            retry,
        }
    }

    /// Query and shape one report
    pub async fn build(&self, report: &ReservationReport) -> Result<ReportEntry> {
        let entry = match report {
            ReservationReport::Coverage => self.coverage().await?,
            ReservationReport::Utilization => self.utilization(false).await?,
            ReservationReport::UtilizationSavings => self.utilization(true).await?,
            ReservationReport::Recommendation(options) => self.recommendation(options).await?,
        };
        info!(
            "Built {} with {} rows",
            entry.name,
            entry.table.rows.len()
        );
        Ok(entry)
    }

    async fn coverage(&self) -> Result<ReportEntry> {
        let (client, retry) = (self.client, self.retry);
        let window = self.windows.reservation;
        let records = drain_pages("GetReservationCoverage", |token| {
            let window = &window;
            retry.run("GetReservationCoverage", move || {
                client.reservation_coverage(window, token.clone())
            })
        })
        .await?;

        let mut table = TableAccumulator::new();
        for record in &records {
            let percentage = parse_amount(
                "CoverageHoursPercentage",
                &record.total.coverage_hours.coverage_hours_percentage,
            )?;
            table.add(record.time_period.start, GroupKey::new("Coverage%"), percentage);
        }

        Ok(ReportEntry::new(
            ReservationReport::Coverage.name(),
            table.into_report_table(),
            RenderKind::Chart,
        ))
    }

    async fn utilization(&self, savings: bool) -> Result<ReportEntry> {
        let (client, retry) = (self.client, self.retry);
        let window = self.windows.savings;
        let records = drain_pages("GetReservationUtilization", |token| {
            let window = &window;
            retry.run("GetReservationUtilization", move || {
                client.reservation_utilization(window, token.clone())
            })
        })
        .await?;

        let name = if savings {
            ReservationReport::UtilizationSavings.name()
        } else {
            ReservationReport::Utilization.name()
        };
        if records.is_empty() {
            return Ok(ReportEntry::new(name, ReportTable::empty(), RenderKind::Table));
        }

        let mut table = TableAccumulator::new();
        for record in &records {
            let (label, amount) = if savings {
                ("Savings$", parse_amount("NetRISavings", &record.total.net_ri_savings)?)
            } else {
                (
                    "Utilization%",
                    parse_amount("UtilizationPercentage", &record.total.utilization_percentage)?,
                )
            };
            table.add(record.time_period.start, GroupKey::new(label), amount);
        }

        Ok(ReportEntry::new(name, table.into_report_table(), RenderKind::Chart))
    }

    async fn recommendation(&self, options: &RecommendationOptions) -> Result<ReportEntry> {
        let query = RecommendationQuery {
            lookback_period_in_days: LookbackPeriod::SixtyDays,
            term_in_years: TermInYears::OneYear,
            payment_option: options.payment_option,
            service: options.service.clone(),
        };
        let (client, retry) = (self.client, self.retry);
        let recommendations = drain_pages("GetReservationPurchaseRecommendation", |token| {
            let query = &query;
            retry.run("GetReservationPurchaseRecommendation", move || {
                client.reservation_purchase_recommendation(query, token.clone())
            })
        })
        .await?;

        let details = recommendations
            .iter()
            .flat_map(|recommendation| recommendation.recommendation_details.iter());
        Ok(ReportEntry::new(
            ReservationReport::Recommendation(options.clone()).name(),
            recommendation_table(details),
            RenderKind::Table,
        ))
    }
}

/// Fixed recommendation columns, after the instance attributes
const RECOMMENDATION_FIELDS: [&str; 8] = [
    "Recommended",
    "Minimum",
    "Maximum",
    "Savings",
    "OnDemand",
    "BreakEvenIn",
    "UpfrontCost",
    "MonthlyCost",
];

fn attribute_cell(value: &Value) -> CellValue {
    match value {
        Value::Null => CellValue::Number(0.0),
        Value::Number(n) => CellValue::Number(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => CellValue::Text(s.clone()),
        other => CellValue::Text(other.to_string()),
    }
}

fn amount_cell(raw: Option<&String>) -> CellValue {
    match raw {
        None => CellValue::Number(0.0),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .map(CellValue::Number)
            .unwrap_or_else(|_| CellValue::Text(raw.clone())),
    }
}

fn detail_fields(detail: &RecommendationDetail) -> [Option<&String>; 8] {
    [
        detail.recommended_number_of_instances_to_purchase.as_ref(),
        detail.minimum_number_of_instances_used_per_hour.as_ref(),
        detail.maximum_number_of_instances_used_per_hour.as_ref(),
        detail.estimated_monthly_savings_amount.as_ref(),
        detail.estimated_monthly_on_demand_cost.as_ref(),
        detail.estimated_break_even_in_months.as_ref(),
        detail.upfront_cost.as_ref(),
        detail.recurring_standard_monthly_cost.as_ref(),
    ]
}

/// One row per detail: instance attributes, then the fixed figures
///
/// Columns are the union of every row's keys in first-seen order; cells a
/// row lacks are zero. Rows are labelled by their index.
fn recommendation_table<'a>(details: impl Iterator<Item = &'a RecommendationDetail>) -> ReportTable {
    let mut columns: Vec<String> = Vec::new();
    let mut rows: Vec<HashMap<String, CellValue>> = Vec::new();

    for detail in details {
        let mut row = HashMap::new();
        let mut add = |column: &str, cell: CellValue| {
            if !columns.iter().any(|c| c == column) {
                columns.push(column.to_string());
            }
            row.insert(column.to_string(), cell);
        };

        // Only the first service family listed in the response is used
        if let Some(Value::Object(attributes)) = detail.instance_details.values().next() {
            for (name, value) in attributes {
                add(name, attribute_cell(value));
            }
        }
        for (name, raw) in RECOMMENDATION_FIELDS.iter().zip(detail_fields(detail)) {
            add(name, amount_cell(raw));
        }
        rows.push(row);
    }

    let rows = rows
        .into_iter()
        .enumerate()
        .map(|(index, mut row)| ReportRow {
            label: index.to_string(),
            cells: columns
                .iter()
                .map(|column| row.remove(column).unwrap_or(CellValue::Number(0.0)))
                .collect(),
        })
        .collect();

    ReportTable { columns, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::{BillingExport, ReplayClient};
    use costsheet_core::types::{
        Coverage, CoverageByTime, CoverageHours, ReservationAggregates,
        ReservationPurchaseRecommendation, UtilizationByTime,
    };
    use costsheet_core::windows::TimeWindow;
    use chrono::NaiveDate;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn windows() -> ReportWindows {
        ReportWindows::derive(date(2024, 8, 17), false, false).unwrap()
    }

    fn month(m: u32) -> TimeWindow {
        TimeWindow::new(date(2024, m, 1), date(2024, m + 1, 1))
    }

    fn utilization(m: u32, percentage: &str, savings: &str) -> UtilizationByTime {
        UtilizationByTime {
            time_period: month(m),
            total: ReservationAggregates {
                utilization_percentage: percentage.to_string(),
                net_ri_savings: savings.to_string(),
            },
        }
    }

    async fn build(export: BillingExport, report: ReservationReport) -> ReportEntry {
        let client = ReplayClient::new(export);
        let windows = windows();
        let retry = RetryPolicy::none();
        ReservedCapacityReportBuilder::new(&client, &windows, &retry)
            .build(&report)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_coverage_single_row_chart() {
        let export = BillingExport {
            coverage: vec![
                vec![CoverageByTime {
                    time_period: month(6),
                    total: Coverage {
                        coverage_hours: CoverageHours {
                            coverage_hours_percentage: "41.5".to_string(),
                        },
                    },
                }],
                vec![CoverageByTime {
                    time_period: month(7),
                    total: Coverage {
                        coverage_hours: CoverageHours {
                            coverage_hours_percentage: "60".to_string(),
                        },
                    },
                }],
            ],
            ..Default::default()
        };
        let entry = build(export, ReservationReport::Coverage).await;

        assert_eq!(entry.name.as_str(), "RICoverage");
        assert_eq!(entry.kind, RenderKind::Chart);
        assert_eq!(entry.table.columns, vec!["2024-06-01", "2024-07-01"]);
        assert_eq!(entry.table.series("Coverage%"), Some(vec![41.5, 60.0]));
    }

    #[tokio::test]
    async fn test_utilization_percentage_and_savings() {
        let export = BillingExport {
            utilization: vec![vec![utilization(6, "88.0", "120.5"), utilization(7, "91.0", "130")]],
            ..Default::default()
        };

        let percentage = build(export.clone(), ReservationReport::Utilization).await;
        assert_eq!(percentage.kind, RenderKind::Chart);
        assert_eq!(percentage.table.series("Utilization%"), Some(vec![88.0, 91.0]));

        let savings = build(export, ReservationReport::UtilizationSavings).await;
        assert_eq!(savings.name.as_str(), "RIUtilizationSavings");
        assert_eq!(savings.table.series("Savings$"), Some(vec![120.5, 130.0]));
        assert!(savings.table.row("Utilization%").is_none());
    }

    #[tokio::test]
    async fn test_empty_utilization_degrades_to_table() {
        let entry = build(BillingExport::default(), ReservationReport::Utilization).await;
        assert_eq!(entry.kind, RenderKind::Table);
        assert!(entry.table.is_empty());
    }

    #[tokio::test]
    async fn test_recommendation_rows() {
        let first: RecommendationDetail = serde_json::from_value(json!({
            "InstanceDetails": {"EC2InstanceDetails": {"InstanceType": "m5.large", "Region": "cn-north-1"}},
            "RecommendedNumberOfInstancesToPurchase": "4",
            "EstimatedMonthlySavingsAmount": "52.1",
            "UpfrontCost": "300"
        }))
        .unwrap();
        let second: RecommendationDetail = serde_json::from_value(json!({
            "InstanceDetails": {"EC2InstanceDetails": {"InstanceType": "c5.xlarge", "Tenancy": "shared"}},
            "RecommendedNumberOfInstancesToPurchase": "1"
        }))
        .unwrap();
        let export = BillingExport {
            recommendations: vec![vec![ReservationPurchaseRecommendation {
                recommendation_details: vec![first, second],
            }]],
            ..Default::default()
        };

        let entry = build(
            export,
            ReservationReport::Recommendation(RecommendationOptions::default()),
        )
        .await;

        assert_eq!(entry.kind, RenderKind::Table);
        assert_eq!(entry.table.labels(), vec!["0", "1"]);
        assert_eq!(
            entry.table.columns,
            vec![
                "InstanceType", "Region", "Recommended", "Minimum", "Maximum", "Savings",
                "OnDemand", "BreakEvenIn", "UpfrontCost", "MonthlyCost", "Tenancy",
            ]
        );
        assert_eq!(
            entry.table.cell("0", "InstanceType"),
            Some(&CellValue::Text("m5.large".to_string()))
        );
        assert_eq!(entry.table.cell("0", "Savings"), Some(&CellValue::Number(52.1)));
        assert_eq!(entry.table.cell("0", "Minimum"), Some(&CellValue::Number(0.0)));
        assert_eq!(entry.table.cell("1", "Region"), Some(&CellValue::Number(0.0)));
        assert_eq!(
            entry.table.cell("1", "Tenancy"),
            Some(&CellValue::Text("shared".to_string()))
        );
    }

    #[tokio::test]
    async fn test_recommendation_attributes_keep_response_order() {
        let detail: RecommendationDetail = serde_json::from_str(
            r#"{
              "InstanceDetails": {
                "RDSInstanceDetails": {"Region": "cn-northwest-1", "DatabaseEngine": "MySQL"},
                "EC2InstanceDetails": {"InstanceType": "m5.large"}
              },
              "RecommendedNumberOfInstancesToPurchase": "2"
            }"#,
        )
        .unwrap();
        let export = BillingExport {
            recommendations: vec![vec![ReservationPurchaseRecommendation {
                recommendation_details: vec![detail],
            }]],
            ..Default::default()
        };

        let entry = build(
            export,
            ReservationReport::Recommendation(RecommendationOptions::default()),
        )
        .await;

        // The first listed family wins and its attributes stay unsorted
        assert_eq!(entry.table.columns[..2], ["Region", "DatabaseEngine"]);
        assert!(!entry.table.columns.iter().any(|c| c == "InstanceType"));
        assert_eq!(
            entry.table.cell("0", "DatabaseEngine"),
            Some(&CellValue::Text("MySQL".to_string()))
        );
    }

    #[test]
    fn test_default_recommendation_options() {
        let options = RecommendationOptions::default();
        assert_eq!(options.payment_option, PaymentOption::PartialUpfront);
        assert_eq!(options.service, DEFAULT_RECOMMENDATION_SERVICE);
    }
}
