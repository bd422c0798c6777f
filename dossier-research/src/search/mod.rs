//! Search client
//!
//! Wraps a [`SearchProvider`] with the research loop's conventions: a fixed result count,
//! tracking-parameter stripping, optional retry, and typed `Search` failures.

use dossier_core::{
    retry_async, search_error, DossierError, DossierResult, RetryConfig, SearchConfig,
    SearchProvider,
};
use futures::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

pub mod tavily;

pub use tavily::TavilySearchProvider;

/// Bucket queries used by the single-pass pipeline
const BUCKET_TEMPLATES: &[(&str, &str)] = &[
    ("profile", "{entity} company overview business model"),
    ("products", "{entity} products services portfolio customers"),
    ("market", "{entity} competitors industry market share"),
    (
        "financials",
        "{entity} financial results revenue operating income funding",
    ),
    ("news", "{entity} recent news last 12 months"),
];

#[derive(Clone)]
pub struct SearchClient {
    provider: Arc<dyn SearchProvider>,
    max_results: usize,
    resolve_max_results: usize,
    retry: RetryConfig,
}

impl SearchClient {
    pub fn new(provider: Arc<dyn SearchProvider>, config: &SearchConfig) -> Self {
        Self {
            provider,
            max_results: config.max_results,
            resolve_max_results: config.resolve_max_results,
            retry: RetryConfig::default().with_max_attempts(config.retry_attempts),
        }
    }

    /// Run one query and return cleaned URLs in provider-ranked order
    pub async fn search(&self, query: &str) -> DossierResult<Vec<String>> {
        self.search_with_limit(query, self.max_results).await
    }

    /// Disambiguate an entity name.
    ///
    /// The name is returned unchanged; only seed URLs are discovered here.
    pub async fn resolve_entity(&self, name: &str) -> DossierResult<(String, Vec<String>)> {
        let query = format!("{} official site OR investors OR wikipedia", name);
        let urls = self
            .search_with_limit(&query, self.resolve_max_results)
            .await?;
        Ok((name.to_string(), urls))
    }

    /// One query per thematic bucket, run concurrently and deduplicated per bucket.
    /// A failing bucket yields an empty list.
    pub async fn search_buckets(&self, entity: &str) -> BTreeMap<String, Vec<String>> {
        let searches = BUCKET_TEMPLATES.iter().map(|(bucket, template)| {
            let query = template.replace("{entity}", entity);
            async move {
                let urls = match self.search(&query).await {
                    Ok(urls) => urls,
                    Err(e) => {
                        e.log();
                        Vec::new()
                    }
                };
                (bucket.to_string(), dedupe(urls))
            }
        });

        join_all(searches).await.into_iter().collect()
    }

    async fn search_with_limit(&self, query: &str, limit: usize) -> DossierResult<Vec<String>> {
        let hits = retry_async(
            || self.provider.search(query, limit),
            &self.retry,
            "search",
        )
        .await
        .map_err(|e| into_search_error(query, e))?;

        let urls: Vec<String> = hits
            .into_iter()
            .map(|hit| hit.url.trim().to_string())
            .filter(|url| !url.is_empty())
            .map(|url| strip_tracking_params(&url))
            .collect();

        debug!(query, results = urls.len(), "Search completed");
        Ok(urls)
    }
}

impl std::fmt::Debug for SearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchClient")
            .field("provider", &self.provider.name())
            .field("max_results", &self.max_results)
            .finish()
    }
}

fn into_search_error(query: &str, error: DossierError) -> DossierError {
    match error {
        err @ DossierError::Search { .. } => err,
        other => {
            warn!(query, error = %other, "Search provider call failed");
            let message = other.to_string();
            search_error!(query, message, "search_client", other)
        }
    }
}

fn dedupe(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter().filter(|u| seen.insert(u.clone())).collect()
}

fn is_tracking_key(key: &str) -> bool {
    key.to_ascii_lowercase().starts_with("utm_")
}

/// Remove `utm_*` query parameters (case-insensitive) and normalize the URL.
///
/// Every parseable URL comes back in its serialized form, so `https://a.example` and
/// `https://a.example?utm_source=x` both become `https://a.example/`. A query without
/// tracking keys is kept byte for byte. Unparseable input is returned unchanged.
pub fn strip_tracking_params(raw: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw) else {
        return raw.to_string();
    };

    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let kept: Vec<&(String, String)> = pairs
        .iter()
        .filter(|(k, _)| !is_tracking_key(k))
        .collect();

    if kept.is_empty() {
        parsed.set_query(None);
    } else if kept.len() < pairs.len() {
        parsed
            .query_pairs_mut()
            .clear()
            .extend_pairs(kept.into_iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    parsed.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dossier_core::{ErrorContext, SearchHit};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProvider {
        urls: Vec<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SearchProvider for FixedProvider {
        async fn search(&self, query: &str, max_results: usize) -> DossierResult<Vec<SearchHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if query.contains("boom") {
                return Err(DossierError::Network {
                    message: "connection refused".to_string(),
                    source: None,
                    context: ErrorContext::new("test"),
                });
            }
            Ok(self
                .urls
                .iter()
                .take(max_results)
                .map(|u| SearchHit {
                    url: u.to_string(),
                    title: String::new(),
                    snippet: String::new(),
                    score: 0.5,
                })
                .collect())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn client(urls: Vec<&'static str>) -> (SearchClient, Arc<FixedProvider>) {
        let provider = Arc::new(FixedProvider {
            urls,
            calls: AtomicUsize::new(0),
        });
        (
            SearchClient::new(provider.clone(), &SearchConfig::default()),
            provider,
        )
    }

    #[test]
    fn strips_utm_parameters_only() {
        assert_eq!(
            strip_tracking_params("https://x.example/page?utm_source=foo&id=5"),
            "https://x.example/page?id=5"
        );
        assert_eq!(
            strip_tracking_params("https://x.example/page?UTM_Medium=mail&utm_campaign=q3#top"),
            "https://x.example/page#top"
        );
        assert_eq!(
            strip_tracking_params("https://x.example/page?id=5&ref=home"),
            "https://x.example/page?id=5&ref=home"
        );
        assert_eq!(strip_tracking_params("not a url"), "not a url");
    }

    #[test]
    fn stripped_and_bare_urls_share_one_form() {
        let bare = strip_tracking_params("https://a.example");
        assert_eq!(bare, "https://a.example/");
        assert_eq!(strip_tracking_params("https://a.example?utm_source=x"), bare);
        assert_eq!(strip_tracking_params("https://a.example/?"), bare);
        assert_eq!(
            strip_tracking_params("https://a.example/p?q=a%20b"),
            "https://a.example/p?q=a%20b"
        );
    }

    #[tokio::test]
    async fn search_cleans_and_caps_results() {
        let (client, _) = client(vec![
            "https://a.example/?utm_source=x",
            "  ",
            "https://b.example/",
            "https://c.example/",
            "https://d.example/",
            "https://e.example/",
            "https://f.example/",
            "https://g.example/",
        ]);
        let urls = client.search("acme").await.unwrap();
        assert_eq!(urls.len(), 5);
        assert_eq!(urls[0], "https://a.example/");
    }

    #[tokio::test]
    async fn provider_failure_becomes_search_error() {
        let (client, provider) = client(vec![]);
        match client.search("boom").await {
            Err(DossierError::Search { query, .. }) => assert_eq!(query, "boom"),
            other => panic!("expected search error, got {other:?}"),
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resolve_entity_keeps_name_verbatim() {
        let (client, _) = client(vec!["https://acme.example/"]);
        let (name, urls) = client.resolve_entity(" Acme Corp ").await.unwrap();
        assert_eq!(name, " Acme Corp ");
        assert_eq!(urls, ["https://acme.example/"]);
    }

    #[tokio::test]
    async fn buckets_are_deduplicated() {
        let (client, provider) = client(vec![
            "https://a.example/",
            "https://a.example/?utm_source=feed",
            "https://b.example/",
        ]);
        let buckets = client.search_buckets("Acme").await;
        assert_eq!(buckets.len(), 5);
        assert_eq!(buckets["news"], ["https://a.example/", "https://b.example/"]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 5);
    }
}
