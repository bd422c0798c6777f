//! Collaborator traits at the boundary with external services

use crate::error::DossierResult;
use crate::types::SearchHit;
use async_trait::async_trait;

/// External web search provider
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run one query and return provider-ranked hits
    async fn search(&self, query: &str, max_results: usize) -> DossierResult<Vec<SearchHit>>;

    /// Provider name for logs and progress payloads
    fn name(&self) -> &str;
}

/// Language model used for adaptive query planning
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete a system + user prompt pair and return the raw text
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> DossierResult<String>;
}

/// Fetches the full content of one curated URL for enrichment
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// `Ok(None)` means the provider answered but had no content for the URL
    async fn fetch_content(&self, url: &str) -> DossierResult<Option<String>>;
}
