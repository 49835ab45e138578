//! Core types, traits, and utilities for costsheet
//!
//! This crate provides the foundational pieces of the report engine: billing
//! record and request types, the collaborator traits the engine is driven
//! through, continuation-token pagination, filter construction, reporting
//! windows, retry policy, and the report data types handed to renderers.

pub mod error;
pub mod filters;
pub mod pagination;
pub mod provider;
pub mod report;
pub mod retry;
pub mod types;
pub mod windows;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use error::{CostsheetError, Result, ServiceError, ServiceErrorKind};
pub use report::{RenderKind, ReportCollection, ReportEntry, ReportTable, ReportWarning};
pub use types::{GroupDefinition, GroupKey, ReportStyle};
pub use windows::{ReportWindows, TimeWindow};
