//! costsheet - Shape paginated cloud billing records into cost reports
//!
//! This library provides functionality to:
//! - Build monthly cost reports grouped by dimension, tag or cost category
//! - Turn any cost report into a month-over-month change report
//! - Merge cost data across several accounts reached through assumed roles
//! - Report reserved capacity coverage, utilization and purchase recommendations
//! - Render the resulting collection as terminal tables or JSON
//!
//! Billing data comes from the collaborator traits in
//! [`costsheet_core::provider`]; [`replay::ReplayClient`] implements them over
//! a recorded billing export.
//!
//! # Examples
//!
//! ```no_run
//! use costsheet::{
//!     config::EngineConfig,
//!     engine::ReportEngine,
//!     output::get_formatter,
//!     replay::ReplayClient,
//! };
//! use costsheet_core::provider::CredentialBroker;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> costsheet::Result<()> {
//!     let client = Arc::new(ReplayClient::from_path("export.json").await?);
//!     let config = EngineConfig::new(chrono::Local::now().date_naive())
//!         .with_cost_tags(vec!["Owner"]);
//!
//!     let broker: Arc<dyn CredentialBroker> = client.clone();
//!     let mut engine = ReportEngine::new(config, client.clone(), client.as_ref(), Some(broker)).await?;
//!     engine.run_default_plan().await?;
//!
//!     println!("{}", get_formatter(false).format_collection(engine.collection()));
//!     Ok(())
//! }
//! ```

pub mod accounts;
pub mod aggregation;
pub mod cli;
pub mod config;
pub mod cost_report;
pub mod engine;
pub mod multi_account;
pub mod output;
pub mod replay;
pub mod reservation;

// Re-export commonly used types
pub use costsheet_core::error::{CostsheetError, Result};
pub use costsheet_core::report::{RenderKind, ReportCollection, ReportEntry, ReportTable};
pub use engine::ReportEngine;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
