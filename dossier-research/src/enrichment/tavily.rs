//! Tavily extract endpoint as a content fetcher

use crate::http::{create_http_client, response_error, transport_error};
use async_trait::async_trait;
use dossier_core::{config_error, ContentFetcher, DossierResult, EnrichmentConfig, SearchConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    api_key: &'a str,
    urls: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    results: Vec<ExtractResult>,
}

#[derive(Debug, Deserialize)]
struct ExtractResult {
    #[serde(default)]
    raw_content: Option<String>,
}

/// Fetches full page content through Tavily's `/extract`
pub struct TavilyExtractClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl TavilyExtractClient {
    pub fn new(search: &SearchConfig, enrichment: &EnrichmentConfig) -> DossierResult<Self> {
        let api_key = search
            .resolve_api_key()
            .ok_or_else(|| config_error!("TAVILY_API_KEY is not set", "tavily_extract"))?;

        let client = create_http_client(
            &search.user_agent,
            Duration::from_secs(enrichment.timeout_secs),
            10,
        )?;

        Ok(Self {
            client,
            api_key,
            endpoint: enrichment.extract_endpoint.clone(),
        })
    }
}

#[async_trait]
impl ContentFetcher for TavilyExtractClient {
    async fn fetch_content(&self, url: &str) -> DossierResult<Option<String>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ExtractRequest {
                api_key: &self.api_key,
                urls: [url],
            })
            .send()
            .await
            .map_err(|e| transport_error(e, "tavily_extract", "extract"))?;

        if !response.status().is_success() {
            return Err(response_error(response, "tavily_extract", "extract").await);
        }

        let body: ExtractResponse = response
            .json()
            .await
            .map_err(|e| transport_error(e, "tavily_extract", "decode_extract"))?;

        Ok(body
            .results
            .into_iter()
            .next()
            .and_then(|r| r.raw_content)
            .filter(|content| !content.is_empty()))
    }
}
