//! Continuation-token pagination
//!
//! Every billing collaborator answers in pages: a list of records plus an
//! optional token naming the next page. [`drain_pages`] keeps calling the
//! supplied query until no token comes back and returns every record in
//! arrival order.
//!
//! # Example
//!
//! ```
//! use costsheet_core::pagination::{drain_pages, Page};
//!
//! # tokio_test::block_on(async {
//! let pages = vec![Page::more(vec![1, 2], "t1"), Page::last(vec![3])];
//! let records = drain_pages("Numbers", |token| {
//!     let index = token.map(|_| 1).unwrap_or(0);
//!     let page = pages[index].clone();
//!     async move { Ok(page) }
//! })
//! .await
//! .unwrap();
//! assert_eq!(records, vec![1, 2, 3]);
//! # });
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::debug;

/// One page of records returned by a collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Records on this page, in collaborator order
    pub items: Vec<T>,
    /// Token for the next page; `None` on the final page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    /// A page followed by another page
    pub fn more(items: Vec<T>, next_token: impl Into<String>) -> Self {
        Self {
            items,
            next_token: Some(next_token.into()),
        }
    }

    /// The final page
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }
}

/// Drain a paginated query into one record list
///
/// `query` receives `None` for the first call and the previous page's token
/// afterwards. There is no page limit and no retry; the first failing call
/// ends the drain and its error is returned unchanged.
pub async fn drain_pages<T, F, Fut>(operation: &str, mut query: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut records = Vec::new();
    let mut token = None;
    let mut page_index = 0usize;

    loop {
        let page = query(token.take()).await?;
        debug!(
            "{operation}: page {page_index} returned {} records",
            page.items.len()
        );
        records.extend(page.items);
        page_index += 1;

        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    Ok(records)
}
