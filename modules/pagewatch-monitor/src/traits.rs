// Collaborator seams for the site job.
//
// PageFetcher renders a page and returns the text under a selector.
// RelevanceClassifier judges whether a change matters for a goal.
// Both have production adapters (fetch.rs, classify.rs) and fakes in testing.rs.

use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use thiserror::Error;

use pagewatch_common::{Goal, WaitStrategy};

// ---------------------------------------------------------------------------
// PageFetcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub selector: String,
    pub timeout: Duration,
    pub wait: WaitStrategy,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Retryable once by the site job.
    #[error("fetch timed out: {0}")]
    Timeout(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    /// Neither the configured selector nor the fallback yielded text.
    #[error("no content for selector '{0}'")]
    SelectorMissing(String),
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<String, FetchError>;
}

// ---------------------------------------------------------------------------
// RelevanceClassifier
// ---------------------------------------------------------------------------

/// Structured classifier answer. Every field is required.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct ClassifierVerdict {
    /// True when the change moves the operator closer to their goal.
    pub relevant: bool,
    /// One sentence explaining the verdict.
    pub reason: String,
    /// Short human-readable description of what changed.
    pub summary: String,
}

#[async_trait]
pub trait RelevanceClassifier: Send + Sync {
    async fn classify(
        &self,
        old_text: &str,
        new_text: &str,
        goal: &Goal,
    ) -> anyhow::Result<ClassifierVerdict>;
}
