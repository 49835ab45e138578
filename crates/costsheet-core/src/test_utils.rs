//! Shared test utilities for unit tests
//!
//! Note: the root crate and the integration tests cannot see this module
//! because it is compiled only under `#[cfg(test)]`. They use the recorded
//! export client (`costsheet::replay`) as their test double instead.

use crate::error::{Result, ServiceError};
use crate::pagination::Page;
use crate::provider::TagService;
use crate::types::TagQuery;
use async_trait::async_trait;
use std::sync::Mutex;

/// Tag service answering every query with the same values in one page
pub struct StaticTags {
    values: Vec<String>,
    failure: Option<ServiceError>,
    queries: Mutex<Vec<TagQuery>>,
}

impl StaticTags {
    /// Answer with `values`
    pub fn new<S: Into<String>>(values: Vec<S>) -> Self {
        Self {
            values: values.into_iter().map(Into::into).collect(),
            failure: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Fail every query with `error`
    pub fn failing(error: ServiceError) -> Self {
        Self {
            values: Vec::new(),
            failure: Some(error),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Number of queries received
    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    /// Most recent query received
    pub fn last_query(&self) -> Option<TagQuery> {
        self.queries.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TagService for StaticTags {
    async fn tag_values(&self, query: &TagQuery, _next_token: Option<String>) -> Result<Page<String>> {
        self.queries.lock().unwrap().push(query.clone());
        match &self.failure {
            Some(error) => Err(error.clone().into()),
            None => Ok(Page::last(self.values.clone())),
        }
    }
}
