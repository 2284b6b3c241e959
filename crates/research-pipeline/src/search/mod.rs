//! Web search abstraction
//!
//! The research agent issues queries through a `SearchProvider`. The provider
//! makes exactly one attempt per call; retrying is the caller's job.

mod tavily;

pub use tavily::{TavilyClient, DEFAULT_BASE_URL as TAVILY_BASE_URL};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One search result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
}

impl SearchHit {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            content: content.into(),
        }
    }

    /// Title, or `No title` when the provider sent none
    pub fn title_or_default(&self) -> &str {
        non_empty_or(&self.title, "No title")
    }

    /// URL, or `No URL`
    pub fn url_or_default(&self) -> &str {
        non_empty_or(&self.url, "No URL")
    }

    /// Content, or `No content`
    pub fn content_or_default(&self) -> &str {
        non_empty_or(&self.content, "No content")
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

/// Search depth
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    /// Fast search with basic results
    Basic,
    /// More thorough search with detailed results
    #[default]
    Advanced,
}

impl SearchDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchDepth::Basic => "basic",
            SearchDepth::Advanced => "advanced",
        }
    }
}

/// Typed search errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthorized - check API key")]
    Unauthorized,

    #[error("Rate limited - too many requests")]
    RateLimited,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("HTTP error ({0}): {1}")]
    HttpError(u16, String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Transient search failure: {0}")]
    Transient(String),
}

impl SearchError {
    /// Check if this error is worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SearchError::Timeout
                | SearchError::Connection(_)
                | SearchError::Network(_)
                | SearchError::RateLimited
                | SearchError::ServerError(_, _)
                | SearchError::Transient(_)
        )
    }
}

/// A web search backend
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run one query, returning hits in provider order
    async fn search(
        &self,
        query: &str,
        max_results: u32,
        depth: SearchDepth,
    ) -> Result<Vec<SearchHit>, SearchError>;
}
