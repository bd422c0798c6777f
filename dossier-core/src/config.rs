//! Configuration management
//!
//! Every tunable constant of the research loop lives here so that runs are driven by
//! data. Values are loaded from TOML; missing sections fall back to the defaults.

use crate::error::{DossierError, DossierResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const TAVILY_API_KEY_ENV: &str = "TAVILY_API_KEY";

/// Top-level configuration for the research workspace
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DossierConfig {
    pub search: SearchConfig,
    pub fetch: FetchConfig,
    pub research: ResearchSettings,
    pub enrichment: EnrichmentConfig,
    pub coverage: CoverageConfig,
    pub llm: LlmConfig,
}

/// Search provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Provider name (only "tavily" is built in)
    pub provider: String,
    /// API key; falls back to the TAVILY_API_KEY environment variable
    pub api_key: Option<String>,
    pub endpoint: String,
    /// Results requested per query
    pub max_results: usize,
    /// Results requested by the entity disambiguation query
    pub resolve_max_results: usize,
    pub search_depth: String,
    pub timeout_secs: u64,
    /// Attempts per query; 1 disables retry
    pub retry_attempts: usize,
    pub user_agent: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: "tavily".to_string(),
            api_key: None,
            endpoint: "https://api.tavily.com/search".to_string(),
            max_results: 6,
            resolve_max_results: 6,
            search_depth: "advanced".to_string(),
            timeout_secs: 25,
            retry_attempts: 1,
            user_agent: default_user_agent(),
        }
    }
}

impl SearchConfig {
    /// Resolve the API key from configuration or environment
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var(TAVILY_API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

/// Page fetch and text extraction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Simultaneous fetches shared by every caller of one extractor
    pub max_concurrent: usize,
    /// Pages whose extracted text is shorter than this are dropped
    pub min_text_chars: usize,
    /// Extracted text is truncated to this many characters
    pub max_text_chars: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 25,
            user_agent: default_user_agent(),
            max_concurrent: 6,
            min_text_chars: 300,
            max_text_chars: 60_000,
            max_redirects: 10,
        }
    }
}

/// Orchestration loop limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchSettings {
    /// Default step budget when a request does not specify one
    pub max_steps: usize,
    /// Queries dequeued per step
    pub queries_per_step: usize,
    /// New URLs extracted per step
    pub max_urls_per_step: usize,
    /// Steps required before satisfied coverage ends the run
    pub min_steps_before_success: usize,
    /// Most recent documents whose titles are handed to the planner
    pub planner_context_docs: usize,
    /// Titles included in the planning prompt
    pub planner_title_limit: usize,
    /// Adaptive queries accepted per planning call
    pub max_planned_queries: usize,
    /// Characters of each document considered by the coverage heuristic
    pub coverage_prefix_chars: usize,
    /// URL cap for the single-pass pipeline
    pub single_pass_url_cap: usize,
    /// Minimum text length kept by the single-pass pipeline
    pub single_pass_min_text_chars: usize,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            max_steps: 5,
            queries_per_step: 4,
            max_urls_per_step: 16,
            min_steps_before_success: 2,
            planner_context_docs: 20,
            planner_title_limit: 12,
            max_planned_queries: 6,
            coverage_prefix_chars: 5_000,
            single_pass_url_cap: 40,
            single_pass_min_text_chars: 400,
        }
    }
}

/// Curated-document enrichment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub batch_size: usize,
    pub max_concurrent_batches: usize,
    /// Per-URL timeout
    pub timeout_secs: u64,
    pub extract_endpoint: String,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            max_concurrent_batches: 3,
            timeout_secs: 25,
            extract_endpoint: "https://api.tavily.com/extract".to_string(),
        }
    }
}

/// Section keyword table used by the coverage heuristic
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    pub keywords: BTreeMap<String, Vec<String>>,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        let table: [(&str, &[&str]); 6] = [
            ("products", &["product", "service", "製品", "サービス"]),
            ("market", &["competitor", "競合", "market share", "シェア"]),
            (
                "financials",
                &["revenue", "売上", "決算", "収益", "funding"],
            ),
            ("news", &["2024", "2025", "news", "発表", "プレス"]),
            (
                "risks",
                &["risk", "リスク", "規制", "訴訟", "罰金", "コンプライアンス"],
            ),
            (
                "profile",
                &["overview", "会社概要", "沿革", "history", "business model"],
            ),
        ];

        Self {
            keywords: table
                .iter()
                .map(|(section, words)| {
                    (
                        section.to_string(),
                        words.iter().map(|w| w.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }
}

/// Language model settings for adaptive query planning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider type (openai, anthropic, ollama, groq)
    pub provider: String,
    pub model: String,
    /// API key (optional, can be set via environment)
    pub api_key: Option<String>,
    /// Base URL for custom or OpenAI-compatible deployments
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: None,
            temperature: 0.2,
            max_tokens: Some(800),
            timeout_secs: 60,
        }
    }
}

fn default_user_agent() -> String {
    "DossierBot/0.1 (+https://example.org)".to_string()
}

impl DossierConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> DossierResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DossierError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: crate::ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: DossierConfig = toml::from_str(&content).map_err(|e| DossierError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: crate::ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> DossierResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| DossierError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: crate::ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content).map_err(|e| DossierError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: crate::ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Validate limits and keyword tables
    pub fn validate(&self) -> DossierResult<()> {
        let positive = [
            ("search.max_results", self.search.max_results),
            ("search.retry_attempts", self.search.retry_attempts),
            ("fetch.max_concurrent", self.fetch.max_concurrent),
            ("fetch.max_text_chars", self.fetch.max_text_chars),
            ("research.max_steps", self.research.max_steps),
            ("research.queries_per_step", self.research.queries_per_step),
            ("research.max_urls_per_step", self.research.max_urls_per_step),
            ("enrichment.batch_size", self.enrichment.batch_size),
            (
                "enrichment.max_concurrent_batches",
                self.enrichment.max_concurrent_batches,
            ),
        ];

        for (field, value) in positive {
            if value == 0 {
                return Err(invalid(field, "must be greater than 0"));
            }
        }

        if self.search.timeout_secs == 0 || self.fetch.timeout_secs == 0 {
            return Err(invalid("timeout_secs", "timeouts must be greater than 0"));
        }

        if self.fetch.min_text_chars > self.fetch.max_text_chars {
            return Err(invalid(
                "fetch.min_text_chars",
                "must not exceed fetch.max_text_chars",
            ));
        }

        for (section, words) in &self.coverage.keywords {
            if words.iter().all(|w| w.trim().is_empty()) {
                return Err(invalid(
                    &format!("coverage.keywords.{}", section),
                    "needs at least one non-empty keyword",
                ));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> DossierError {
    DossierError::Config {
        message: format!("{} {}", field, reason),
        source: None,
        context: crate::ErrorContext::new("config")
            .with_operation("validate")
            .with_metadata("field", field)
            .with_suggestion(&format!("Set {} to a valid value", field)),
    }
}
