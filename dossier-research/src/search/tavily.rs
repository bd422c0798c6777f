//! Tavily web search provider

use crate::http::{create_http_client, response_error, transport_error};
use async_trait::async_trait;
use dossier_core::{config_error, DossierResult, SearchConfig, SearchHit, SearchProvider};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct TavilySearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
    include_answer: bool,
    include_raw_content: bool,
    include_domains: Vec<String>,
    exclude_domains: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TavilySearchResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
}

pub struct TavilySearchProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    search_depth: String,
}

impl TavilySearchProvider {
    /// Build a provider from configuration; a missing API key is a configuration error
    pub fn new(config: &SearchConfig) -> DossierResult<Self> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| config_error!("TAVILY_API_KEY is not set", "tavily"))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &SearchConfig, api_key: impl Into<String>) -> DossierResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(config_error!("Tavily API key is empty", "tavily"));
        }

        let client = create_http_client(
            &config.user_agent,
            Duration::from_secs(config.timeout_secs),
            10,
        )?;

        Ok(Self {
            client,
            api_key,
            endpoint: config.endpoint.clone(),
            search_depth: config.search_depth.clone(),
        })
    }
}

#[async_trait]
impl SearchProvider for TavilySearchProvider {
    async fn search(&self, query: &str, max_results: usize) -> DossierResult<Vec<SearchHit>> {
        let request = TavilySearchRequest {
            api_key: &self.api_key,
            query,
            max_results,
            search_depth: &self.search_depth,
            include_answer: false,
            include_raw_content: false,
            include_domains: Vec::new(),
            exclude_domains: Vec::new(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, "tavily", "search"))?;

        if !response.status().is_success() {
            return Err(response_error(response, "tavily", "search").await);
        }

        let body: TavilySearchResponse = response
            .json()
            .await
            .map_err(|e| transport_error(e, "tavily", "decode_search"))?;

        debug!(query, results = body.results.len(), "Tavily search returned");

        Ok(body
            .results
            .into_iter()
            .map(|r| SearchHit {
                url: r.url,
                title: r.title,
                snippet: r.content,
                score: r.score,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "tavily"
    }
}
