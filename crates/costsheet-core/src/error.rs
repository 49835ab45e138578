//! Error types for costsheet
//!
//! This module defines the error types used throughout the costsheet library.
//! All errors are derived from `thiserror` for convenient error handling
//! and automatic `From` implementations.
//!
//! Failures reported by a billing collaborator travel as
//! [`CostsheetError::Service`] and are never rewrapped on their way to the
//! caller: the message a collaborator produced is the message the caller sees.
//!
//! # Example
//!
//! ```
//! use costsheet_core::error::{CostsheetError, Result, ServiceError, ServiceErrorKind};
//!
//! fn query() -> Result<()> {
//!     Err(ServiceError::new(ServiceErrorKind::Throttling, "GetCostAndUsage", "Rate exceeded").into())
//! }
//!
//! let err = query().unwrap_err();
//! assert!(err.is_throttling());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a failed collaborator call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceErrorKind {
    /// Request rate exceeded; safe to retry after a pause
    Throttling,
    /// Credentials rejected or role not assumable
    AccessDenied,
    /// Malformed request (bad group definition, filter or date)
    Validation,
    /// Service or network unavailable
    Unavailable,
    /// Anything the collaborator did not classify
    Other,
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Throttling => write!(f, "throttling"),
            Self::AccessDenied => write!(f, "access denied"),
            Self::Validation => write!(f, "validation"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Other => write!(f, "error"),
        }
    }
}

/// A failure returned by one of the external billing collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceError {
    /// What kind of failure this was
    pub kind: ServiceErrorKind,
    /// Operation that failed, e.g. `GetCostAndUsage`
    pub operation: String,
    /// Message as reported by the collaborator
    pub message: String,
}

impl ServiceError {
    /// Create a new service error
    pub fn new(
        kind: ServiceErrorKind,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            operation: operation.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed ({}): {}", self.operation, self.kind, self.message)
    }
}

impl std::error::Error for ServiceError {}

/// Main error type for costsheet operations
#[derive(Error, Debug)]
pub enum CostsheetError {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// A billing collaborator call failed
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// A collaborator answered with data that cannot be interpreted
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Invalid date or date arithmetic out of range
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl CostsheetError {
    /// Whether this error is a throttling failure worth retrying
    pub fn is_throttling(&self) -> bool {
        matches!(
            self,
            Self::Service(ServiceError {
                kind: ServiceErrorKind::Throttling,
                ..
            })
        )
    }

    /// The collaborator failure, if this error came from one
    pub fn service_error(&self) -> Option<&ServiceError> {
        match self {
            Self::Service(err) => Some(err),
            _ => None,
        }
    }
}

/// Convenience type alias for Results in costsheet
pub type Result<T> = std::result::Result<T, CostsheetError>;
