//! Web search adapter.

mod exa;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use self::exa::ExaSearch;
use crate::Result;

/// One web page returned by a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebResult {
    /// Page URL.
    pub url: String,
    /// Extracted page text.
    pub content: String,
}

impl WebResult {
    /// Creates a new result.
    pub fn new(url: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content: content.into(),
        }
    }
}

/// A web search backend.
///
/// Implementations may return an empty list; callers treat errors as empty.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Searches the web for the query.
    async fn search(&self, query: &str) -> Result<Vec<WebResult>>;
}
