//! Core data type definitions

use serde::{Deserialize, Serialize};

/// A fetched, cleaned web page.
///
/// Created by the extractor and never modified afterwards; `url` is the unique key
/// within one research run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub url: String,
    pub title: String,
    pub text: String,
}

impl Document {
    pub fn new(url: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            text: text.into(),
        }
    }

    /// Title for display purposes, falling back to the URL when the page had none
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.url
        } else {
            &self.title
        }
    }
}

/// One ranked result returned by a search provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub score: f64,
}

/// A document selected by an external curation stage, possibly lacking full content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuratedDocument {
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// Snippet or summary content supplied by the curation stage
    #[serde(default)]
    pub content: String,
    /// Full page content, filled by enrichment
    #[serde(default)]
    pub raw_content: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

impl CuratedDocument {
    pub fn needs_enrichment(&self) -> bool {
        self.raw_content
            .as_deref()
            .map(|content| content.is_empty())
            .unwrap_or(true)
    }
}

/// Numbered source reference handed to the downstream editor stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub id: usize,
    pub url: String,
    pub title: String,
}

/// Why a research run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Nothing was searched or discovered and every section is covered
    NoMoreActions,
    /// Every section is covered after the minimum number of steps
    CoverageSatisfied,
    /// No queries remain and the last step found no new URLs
    Exhausted,
    /// The step budget ran out
    StepBudgetExhausted,
    /// The caller's deadline expired; results are partial
    DeadlineExpired,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::NoMoreActions => "no_more_actions",
            TerminationReason::CoverageSatisfied => "coverage_satisfied",
            TerminationReason::Exhausted => "exhausted",
            TerminationReason::StepBudgetExhausted => "step_budget_exhausted",
            TerminationReason::DeadlineExpired => "deadline_expired",
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary returned alongside the documents of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchMeta {
    pub resolved_name: String,
    pub source_count: usize,
    pub steps_used: usize,
    pub termination: TerminationReason,
    /// Final per-section keyword score; informational only
    pub coverage: std::collections::BTreeMap<String, usize>,
}

/// Truncate a string to at most `max_chars` characters on a char boundary
pub fn clip_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
