//! Query filter construction
//!
//! Cost queries are narrowed by a small boolean expression over record types
//! and, optionally, cost allocation tag values. [`FilterBuilder`] turns a
//! handful of declarative options into that expression.
//!
//! # Examples
//!
//! ```
//! use costsheet_core::filters::{FilterBuilder, FilterExpression, RecordTypePolicy};
//!
//! // Credits only, no tag narrowing
//! let builder = FilterBuilder::new().with_record_types(RecordTypePolicy::CreditsOnly);
//! let predicate = builder.base_predicate().unwrap();
//! assert_eq!(
//!     serde_json::to_value(&predicate).unwrap(),
//!     serde_json::json!({"Dimensions": {"Key": "RECORD_TYPE", "Values": ["Credit"]}})
//! );
//! ```

use crate::error::Result;
use crate::pagination::drain_pages;
use crate::provider::TagService;
use crate::report::ReportWarning;
use crate::retry::RetryPolicy;
use crate::types::TagQuery;
use crate::windows::TimeWindow;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Dimension holding the billing record class
pub const RECORD_TYPE: &str = "RECORD_TYPE";

/// Record class excluded alongside the others when taxes are left out
pub const TAX: &str = "Tax";

/// Values of one dimension to match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DimensionValues {
    pub key: String,
    pub values: Vec<String>,
}

/// Values of one cost allocation tag to match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TagValues {
    pub key: String,
    pub values: Vec<String>,
}

/// Boolean filter over billing records
///
/// Serializes to the billing API's expression shape, e.g.
/// `{"Not": {"Dimensions": {"Key": "RECORD_TYPE", "Values": ["Credit"]}}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterExpression {
    Dimensions(DimensionValues),
    Tags(TagValues),
    Not(Box<FilterExpression>),
    And(Vec<FilterExpression>),
}

impl FilterExpression {
    /// Match records whose `key` dimension is one of `values`
    pub fn dimension(key: impl Into<String>, values: &[&str]) -> Self {
        Self::Dimensions(DimensionValues {
            key: key.into(),
            values: values.iter().map(|v| v.to_string()).collect(),
        })
    }

    /// Match records carrying tag `key` with one of `values`
    pub fn tags(key: impl Into<String>, values: Vec<String>) -> Self {
        Self::Tags(TagValues {
            key: key.into(),
            values,
        })
    }

    /// Negate an expression
    pub fn negate(inner: FilterExpression) -> Self {
        Self::Not(Box::new(inner))
    }

    /// Whether the expression is a negated predicate
    pub fn is_negation(&self) -> bool {
        matches!(self, Self::Not(_))
    }

    /// Excluded record types when this is a negated dimension predicate
    pub fn excluded_values(&self) -> Option<&[String]> {
        match self {
            Self::Not(inner) => match inner.as_ref() {
                Self::Dimensions(dimension) => Some(&dimension.values),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Which billing record classes a report counts
///
/// # Examples
/// ```
/// use costsheet_core::filters::RecordTypePolicy;
/// use std::str::FromStr;
///
/// let policy = RecordTypePolicy::from_str("refunds-only").unwrap();
/// assert_eq!(policy, RecordTypePolicy::RefundsOnly);
/// assert!(!policy.is_exclusion());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordTypePolicy {
    /// Usage only: credits, refunds, upfront fees and support are excluded
    #[default]
    ExcludeCreditsRefundsUpfrontsSupport,
    /// Usage and support: credits, refunds and upfront fees are excluded
    ExcludeCreditsRefundsUpfronts,
    /// Credits only
    CreditsOnly,
    /// Refunds only
    RefundsOnly,
    /// Upfront reservation fees only
    UpfrontsOnly,
}

impl RecordTypePolicy {
    /// Whether the policy excludes record types rather than selecting one
    pub fn is_exclusion(self) -> bool {
        matches!(
            self,
            Self::ExcludeCreditsRefundsUpfrontsSupport | Self::ExcludeCreditsRefundsUpfronts
        )
    }

    /// Same policy, but with support charges counted
    ///
    /// Only the default exclusion changes; the other policies already decide
    /// about support on their own.
    pub fn including_support(self) -> Self {
        match self {
            Self::ExcludeCreditsRefundsUpfrontsSupport => Self::ExcludeCreditsRefundsUpfronts,
            other => other,
        }
    }

    /// Predicate selecting the records this policy counts
    pub fn predicate(self) -> FilterExpression {
        match self {
            Self::ExcludeCreditsRefundsUpfrontsSupport => FilterExpression::negate(
                FilterExpression::dimension(RECORD_TYPE, &["Credit", "Refund", "Upfront", "Support"]),
            ),
            Self::ExcludeCreditsRefundsUpfronts => FilterExpression::negate(
                FilterExpression::dimension(RECORD_TYPE, &["Credit", "Refund", "Upfront"]),
            ),
            Self::CreditsOnly => FilterExpression::dimension(RECORD_TYPE, &["Credit"]),
            Self::RefundsOnly => FilterExpression::dimension(RECORD_TYPE, &["Refund"]),
            Self::UpfrontsOnly => FilterExpression::dimension(RECORD_TYPE, &["Upfront"]),
        }
    }
}

impl fmt::Display for RecordTypePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExcludeCreditsRefundsUpfrontsSupport => write!(f, "usage"),
            Self::ExcludeCreditsRefundsUpfronts => write!(f, "usage-and-support"),
            Self::CreditsOnly => write!(f, "credits-only"),
            Self::RefundsOnly => write!(f, "refunds-only"),
            Self::UpfrontsOnly => write!(f, "upfronts-only"),
        }
    }
}

impl std::str::FromStr for RecordTypePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "usage" | "exclude-credits-refunds-upfronts-support" => {
                Ok(Self::ExcludeCreditsRefundsUpfrontsSupport)
            }
            "usage-and-support" | "exclude-credits-refunds-upfronts" => {
                Ok(Self::ExcludeCreditsRefundsUpfronts)
            }
            "credits-only" => Ok(Self::CreditsOnly),
            "refunds-only" => Ok(Self::RefundsOnly),
            "upfronts-only" => Ok(Self::UpfrontsOnly),
            _ => Err(format!("Invalid record type policy: {s}")),
        }
    }
}

/// Cost allocation tag narrowing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    /// Tag key, e.g. `Owner`
    pub key: String,
    /// Search pattern for tag values; `*` matches everything
    pub value_pattern: String,
}

impl TagFilter {
    /// Narrow by every value of `key`
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value_pattern: "*".to_string(),
        }
    }

    /// Only values matching `pattern`
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.value_pattern = pattern.into();
        self
    }
}

/// Result of building a filter
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterOutcome {
    /// The expression to send; `None` sends no filter at all
    pub expression: Option<FilterExpression>,
    /// Degradations noticed while building
    pub warnings: Vec<ReportWarning>,
}

/// Builds the filter expression for one report
///
/// Defaults to the usage-only record policy with taxes included and no tag
/// narrowing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterBuilder {
    /// Record policy; `None` disables filtering entirely
    pub record_types: Option<RecordTypePolicy>,
    /// Whether tax records are counted
    pub include_tax: bool,
    /// Optional tag narrowing
    pub tag: Option<TagFilter>,
}

impl Default for FilterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterBuilder {
    /// Usage-only filter, taxes included, no tag narrowing
    pub fn new() -> Self {
        Self {
            record_types: Some(RecordTypePolicy::default()),
            include_tax: true,
            tag: None,
        }
    }

    /// A builder that produces no filter at all
    pub fn unfiltered() -> Self {
        Self {
            record_types: None,
            ..Self::new()
        }
    }

    /// Set the record type policy
    pub fn with_record_types(mut self, policy: RecordTypePolicy) -> Self {
        self.record_types = Some(policy);
        self
    }

    /// Count or drop tax records
    pub fn with_tax(mut self, include_tax: bool) -> Self {
        self.include_tax = include_tax;
        self
    }

    /// Narrow by cost allocation tag values
    pub fn with_tag(mut self, tag: TagFilter) -> Self {
        self.tag = Some(tag);
        self
    }

    /// The record type predicate, with `Tax` folded into exclusions
    ///
    /// Tax is only ever excluded when the policy already excludes record
    /// types. The positive "only" policies never carry a tax clause.
    pub fn base_predicate(&self) -> Option<FilterExpression> {
        let mut predicate = self.record_types?.predicate();
        if !self.include_tax {
            if let FilterExpression::Not(inner) = &mut predicate {
                if let FilterExpression::Dimensions(dimension) = inner.as_mut() {
                    dimension.values.push(TAX.to_string());
                }
            }
        }
        Some(predicate)
    }

    /// Build the full expression, enumerating tag values when configured
    ///
    /// Tag enumeration failures are fatal. A tag key that matches no values
    /// is dropped from the expression and reported as a warning.
    pub async fn build<S>(
        &self,
        tags: &S,
        window: TimeWindow,
        retry: &RetryPolicy,
    ) -> Result<FilterOutcome>
    where
        S: TagService + ?Sized,
    {
        let Some(base) = self.base_predicate() else {
            debug!("Record filtering disabled; querying without a filter");
            return Ok(FilterOutcome::default());
        };

        let Some(tag) = &self.tag else {
            return Ok(FilterOutcome {
                expression: Some(base),
                warnings: Vec::new(),
            });
        };

        let query = TagQuery {
            search_string: tag.value_pattern.clone(),
            time_period: window,
            tag_key: tag.key.clone(),
        };
        let values = drain_pages("GetTags", |token| {
            let query = &query;
            retry.run("GetTags", move || tags.tag_values(query, token.clone()))
        })
        .await?;

        if values.is_empty() {
            warn!(
                "Tag '{}' has no values matching '{}'; filtering by record type only",
                tag.key, tag.value_pattern
            );
            return Ok(FilterOutcome {
                expression: Some(base),
                warnings: vec![ReportWarning::TagFilterDropped {
                    tag_key: tag.key.clone(),
                    pattern: tag.value_pattern.clone(),
                }],
            });
        }

        debug!("Tag '{}' narrowed to {} values", tag.key, values.len());
        Ok(FilterOutcome {
            expression: Some(FilterExpression::And(vec![
                base,
                FilterExpression::tags(tag.key.clone(), values),
            ])),
            warnings: Vec::new(),
        })
    }
}
