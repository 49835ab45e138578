//! Account directory
//!
//! Maps account identifiers to human labels for reports grouped by linked
//! account. The directory is loaded once per engine from the organization
//! registry. It never fails: if the listing cannot be fetched, the directory is
//! empty, every lookup answers with the raw identifier, and the failure is
//! kept as a [`ReportWarning`] for the caller to inspect.

use costsheet_core::error::Result;
use costsheet_core::pagination::drain_pages;
use costsheet_core::provider::AccountRegistry;
use costsheet_core::report::ReportWarning;
use costsheet_core::retry::RetryPolicy;
use costsheet_core::types::OrganizationAccount;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Which account attribute becomes the label
///
/// # Examples
/// ```
/// use costsheet::accounts::AccountLabelField;
/// use std::str::FromStr;
///
/// assert_eq!(AccountLabelField::from_str("email").unwrap(), AccountLabelField::Email);
/// assert_eq!(
///     AccountLabelField::from_str("Alias").unwrap(),
///     AccountLabelField::Attribute("Alias".to_string())
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AccountLabelField {
    /// The account's display name
    #[default]
    Name,
    /// The account's root e-mail address
    Email,
    /// Any other listed attribute, e.g. an alias
    Attribute(String),
}

impl AccountLabelField {
    /// Label of `account`, if it carries the selected attribute
    pub fn label_of(&self, account: &OrganizationAccount) -> Option<String> {
        match self {
            Self::Name => account.name.clone(),
            Self::Email => account.email.clone(),
            Self::Attribute(field) => account.attribute(field),
        }
    }
}

impl fmt::Display for AccountLabelField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name => write!(f, "Name"),
            Self::Email => write!(f, "Email"),
            Self::Attribute(field) => write!(f, "{field}"),
        }
    }
}

impl std::str::FromStr for AccountLabelField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_lowercase().as_str() {
            "" => Err("Account label field must not be empty".to_string()),
            "name" => Ok(Self::Name),
            "email" => Ok(Self::Email),
            _ => Ok(Self::Attribute(trimmed.to_string())),
        }
    }
}

/// A resolved account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: String,
    pub label: String,
}

/// Account id to label lookup, built once per engine
#[derive(Debug, Clone, Default)]
pub struct AccountDirectory {
    records: HashMap<String, AccountRecord>,
    warning: Option<ReportWarning>,
}

impl AccountDirectory {
    /// A directory that knows no accounts
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from already listed accounts
    ///
    /// Accounts lacking the selected attribute resolve to their raw id.
    pub fn from_accounts(
        accounts: impl IntoIterator<Item = OrganizationAccount>,
        field: &AccountLabelField,
    ) -> Self {
        let mut records = HashMap::new();
        for account in accounts {
            let Some(label) = field.label_of(&account) else {
                debug!("Account {} has no {} attribute", account.id, field);
                continue;
            };
            records.insert(
                account.id.clone(),
                AccountRecord {
                    id: account.id,
                    label,
                },
            );
        }
        Self {
            records,
            warning: None,
        }
    }

    /// Load every account from `registry`
    ///
    /// Listing failures are logged and turned into an empty directory that
    /// carries an [`ReportWarning::AccountDirectoryUnavailable`].
    pub async fn load<R>(registry: &R, field: &AccountLabelField, retry: &RetryPolicy) -> Self
    where
        R: AccountRegistry + ?Sized,
    {
        match Self::fetch(registry, retry).await {
            Ok(accounts) => {
                let directory = Self::from_accounts(accounts, field);
                info!("Loaded {} account labels", directory.len());
                directory
            }
            Err(e) => {
                warn!("Getting account names failed: {}", e);
                Self {
                    records: HashMap::new(),
                    warning: Some(ReportWarning::AccountDirectoryUnavailable {
                        reason: e.to_string(),
                    }),
                }
            }
        }
    }

    async fn fetch<R>(registry: &R, retry: &RetryPolicy) -> Result<Vec<OrganizationAccount>>
    where
        R: AccountRegistry + ?Sized,
    {
        drain_pages("ListAccounts", |token| {
            retry.run("ListAccounts", move || registry.list_accounts(token.clone()))
        })
        .await
    }

    /// Label for `account_id`, or the id itself when unknown
    pub fn resolve<'a>(&'a self, account_id: &'a str) -> &'a str {
        self.records
            .get(account_id)
            .map(|record| record.label.as_str())
            .unwrap_or(account_id)
    }

    /// Resolved record for `account_id`
    pub fn get(&self, account_id: &str) -> Option<&AccountRecord> {
        self.records.get(account_id)
    }

    /// The degradation recorded while loading, if any
    pub fn warning(&self) -> Option<&ReportWarning> {
        self.warning.as_ref()
    }

    /// Number of known accounts
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no accounts are known
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
