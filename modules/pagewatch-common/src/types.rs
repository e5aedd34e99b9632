use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Site configuration
// =============================================================================

/// How a detected change is turned into a notify decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelevanceMode {
    /// Heuristic gate, then the semantic classifier decides.
    #[default]
    Strict,
    /// Every change notifies; the classifier only writes the summary.
    Loose,
}

impl fmt::Display for RelevanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelevanceMode::Strict => write!(f, "strict"),
            RelevanceMode::Loose => write!(f, "loose"),
        }
    }
}

/// Navigation milestone the fetcher waits for before reading content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitStrategy {
    Load,
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    #[serde(rename = "networkidle0")]
    NetworkIdle0,
    #[default]
    #[serde(rename = "networkidle2")]
    NetworkIdle2,
}

/// What the operator is waiting for on a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Goal {
    /// Free-text description handed to the classifier.
    #[serde(default)]
    pub description: String,
    /// Written in the TOML file as a quoted `YYYY-MM-DD` string.
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
    #[serde(default)]
    pub party_size: Option<u32>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub negative_hints: Vec<String>,
}

/// A regex whose matches are deleted before comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScrubPattern {
    pub pattern: String,
    /// Any of `i`, `m`, `s`, `x`, `U`.
    #[serde(default)]
    pub flags: String,
}

impl ScrubPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            flags: String::new(),
        }
    }

    pub fn with_flags(mut self, flags: impl Into<String>) -> Self {
        self.flags = flags.into();
        self
    }
}

fn default_selector() -> String {
    "body".to_string()
}

/// Immutable per-site descriptor, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Unique key; also the storage key for the site's baseline.
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub url: String,
    #[serde(default = "default_selector")]
    pub selector: String,
    /// Lower cadence bound, minutes.
    pub check_min: f64,
    /// Upper cadence bound, minutes.
    pub check_max: f64,
    #[serde(default)]
    pub relevance_mode: RelevanceMode,
    #[serde(default)]
    pub goal: Goal,
    #[serde(default)]
    pub scrub_patterns: Vec<ScrubPattern>,
    #[serde(default)]
    pub wait: Option<WaitStrategy>,
    #[serde(default)]
    pub fetch_timeout_secs: Option<u64>,
    #[serde(default)]
    pub notify_on_baseline: Option<bool>,
}

impl SiteConfig {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            url: url.into(),
            selector: default_selector(),
            check_min: 5.0,
            check_max: 10.0,
            relevance_mode: RelevanceMode::Strict,
            goal: Goal::default(),
            scrub_patterns: Vec::new(),
            wait: None,
            fetch_timeout_secs: None,
            notify_on_baseline: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

// =============================================================================
// Baseline
// =============================================================================

/// Last recorded state of a site, the anchor for change detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    /// Lowercase hex SHA-256 of `text`.
    pub fingerprint: String,
    /// Scrubbed, normalized page text.
    pub text: String,
    pub last_checked: DateTime<Utc>,
}

// =============================================================================
// Evaluation results
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeuristicResult {
    pub hit: bool,
    /// Human-readable account of what matched. Observability only.
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelevanceDecision {
    pub notify: bool,
    pub reason: String,
    pub summary: String,
}

// =============================================================================
// Notices
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Relevant,
    Loose,
    Baseline,
    Error,
}

impl NoticeKind {
    pub fn is_error(&self) -> bool {
        matches!(self, NoticeKind::Error)
    }
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoticeKind::Relevant => write!(f, "relevant"),
            NoticeKind::Loose => write!(f, "loose"),
            NoticeKind::Baseline => write!(f, "baseline"),
            NoticeKind::Error => write!(f, "error"),
        }
    }
}

/// One outbound notification about a site.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub site_id: String,
    pub site_name: String,
    pub url: String,
    pub reason: String,
    pub summary: String,
    pub at: DateTime<Utc>,
}

impl Notice {
    pub fn new(kind: NoticeKind, site: &SiteConfig) -> Self {
        Self {
            kind,
            site_id: site.id.clone(),
            site_name: site.display_name().to_string(),
            url: site.url.clone(),
            reason: String::new(),
            summary: String::new(),
            at: Utc::now(),
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }
}
