//! Page fetching and text extraction
//!
//! [`WebExtractor`] fetches URLs concurrently under a shared limiter, reduces each page to
//! clean text and drops anything that fails or reads as low quality. Failures never
//! escape [`DocumentExtractor::fetch_and_extract`]; they are logged and reported as
//! progress events.

use crate::http::{create_http_client, response_error, transport_error};
use crate::progress::{stages, ProgressReporter};
use async_trait::async_trait;
use dossier_core::{
    clip_chars, ContentFetcher, Document, DossierError, DossierResult, ErrorContext, FetchConfig,
    RateLimiter,
};
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

pub mod html;

pub use html::extract_text;

/// Turns URLs into documents
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Fetch and extract every URL, dropping failures and low-quality pages.
    /// Output order follows completion order, not input order.
    async fn fetch_and_extract(
        &self,
        urls: Vec<String>,
        progress: &ProgressReporter,
    ) -> Vec<Document>;
}

/// Page download plus local text extraction, with no concurrency limit of its own
#[derive(Debug, Clone)]
struct PageReader {
    client: reqwest::Client,
    max_text_chars: usize,
}

impl PageReader {
    fn new(config: &FetchConfig) -> DossierResult<Self> {
        let client = create_http_client(
            &config.user_agent,
            Duration::from_secs(config.timeout_secs),
            config.max_redirects,
        )?;

        Ok(Self {
            client,
            max_text_chars: config.max_text_chars,
        })
    }

    /// Readable text and title of one page, truncated to the cap
    async fn read(&self, url: &str) -> DossierResult<(String, Option<String>)> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(url, transport_error(e, "extractor", "fetch")))?;

        if !response.status().is_success() {
            let err = response_error(response, "extractor", "fetch").await;
            return Err(fetch_error(url, err));
        }

        let body = response
            .text()
            .await
            .map_err(|e| fetch_error(url, transport_error(e, "extractor", "read_body")))?;

        let (text, title) = extract_text(&body);
        Ok((clip_chars(&text, self.max_text_chars).to_string(), title))
    }
}

/// HTTP extractor shared by every run of an orchestrator
#[derive(Debug, Clone)]
pub struct WebExtractor {
    reader: PageReader,
    limiter: RateLimiter,
    min_text_chars: usize,
}

impl WebExtractor {
    pub fn new(config: &FetchConfig) -> DossierResult<Self> {
        Ok(Self {
            reader: PageReader::new(config)?,
            limiter: RateLimiter::new(config.max_concurrent),
            min_text_chars: config.min_text_chars,
        })
    }

    /// Fetch one page under the shared limiter and return its text and title
    pub async fn fetch_text(&self, url: &str) -> DossierResult<(String, Option<String>)> {
        let _permit = self.limiter.acquire().await?;
        self.reader.read(url).await
    }

    /// Fetch one URL into a document, rejecting pages with too little text
    pub async fn fetch_document(&self, url: &str) -> DossierResult<Document> {
        let (text, title) = self.fetch_text(url).await?;

        let chars = text.chars().count();
        if chars < self.min_text_chars {
            return Err(DossierError::Fetch {
                url: url.to_string(),
                message: format!(
                    "extracted text too short ({} < {} chars)",
                    chars, self.min_text_chars
                ),
                source: None,
                context: ErrorContext::new("extractor").with_operation("quality_filter"),
            });
        }

        Ok(Document::new(url, title.unwrap_or_default(), text))
    }
}

#[async_trait]
impl DocumentExtractor for WebExtractor {
    async fn fetch_and_extract(
        &self,
        urls: Vec<String>,
        progress: &ProgressReporter,
    ) -> Vec<Document> {
        let mut pending: FuturesUnordered<_> = urls
            .into_iter()
            .map(|url| async move {
                progress.emit(stages::EXTRACT_START, format!("Fetching {}", url), json!({ "url": url }));
                let result = self.fetch_document(&url).await;
                (url, result)
            })
            .collect();

        let mut documents = Vec::new();
        while let Some((url, result)) = pending.next().await {
            match result {
                Ok(document) => {
                    debug!(url = %url, chars = document.text.chars().count(), "Extracted document");
                    progress.emit(
                        stages::EXTRACT_SUCCESS,
                        format!("Extracted {}", document.display_title()),
                        json!({ "url": url, "title": document.title }),
                    );
                    documents.push(document);
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Dropping URL");
                    progress.emit(
                        stages::EXTRACT_FAILED,
                        format!("Skipped {}", url),
                        json!({ "url": url, "error": e.to_string() }),
                    );
                }
            }
        }

        documents
    }
}

/// [`ContentFetcher`] over plain HTTP and local text extraction.
///
/// Does not share the extractor's limiter: the enrichment batcher bounds fan-out itself,
/// and its per-URL timeout must only cover the request.
#[derive(Debug, Clone)]
pub struct WebContentFetcher {
    reader: PageReader,
}

impl WebContentFetcher {
    pub fn new(config: &FetchConfig) -> DossierResult<Self> {
        Ok(Self {
            reader: PageReader::new(config)?,
        })
    }
}

#[async_trait]
impl ContentFetcher for WebContentFetcher {
    async fn fetch_content(&self, url: &str) -> DossierResult<Option<String>> {
        let (text, _) = self.reader.read(url).await?;
        Ok((!text.trim().is_empty()).then_some(text))
    }
}

fn fetch_error(url: &str, cause: DossierError) -> DossierError {
    DossierError::Fetch {
        url: url.to_string(),
        message: cause.to_string(),
        source: Some(Box::new(cause)),
        context: ErrorContext::new("extractor").with_operation("fetch"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    fn page(body_text: &str) -> String {
        format!(
            "<html><head><title>Acme</title></head><body><main><p>{}</p></main></body></html>",
            body_text
        )
    }

    fn extractor() -> WebExtractor {
        WebExtractor::new(&FetchConfig {
            min_text_chars: 20,
            max_text_chars: 50,
            timeout_secs: 5,
            ..FetchConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn fetches_with_user_agent_and_truncates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/about"))
            .and(header("user-agent", FetchConfig::default().user_agent.as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(page(&"overview ".repeat(20)))
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;

        let url = format!("{}/about", server.uri());
        let doc = extractor().fetch_document(&url).await.unwrap();
        assert_eq!(doc.title, "Acme");
        assert_eq!(doc.url, url);
        assert_eq!(doc.text.chars().count(), 50);
    }

    #[tokio::test]
    async fn drops_failures_and_thin_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/good"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page(&"revenue ".repeat(10))))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/thin"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page("tiny")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let urls = ["/good", "/thin", "/gone"]
            .iter()
            .map(|p| format!("{}{}", server.uri(), p))
            .collect();
        let docs = extractor()
            .fetch_and_extract(urls, &ProgressReporter::disabled())
            .await;

        assert_eq!(docs.len(), 1);
        assert!(docs[0].url.ends_with("/good"));
    }

    #[tokio::test]
    async fn content_fetcher_returns_none_for_empty_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blank"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>"))
            .mount(&server)
            .await;

        let fetcher = WebContentFetcher::new(&FetchConfig::default()).unwrap();
        let content = fetcher
            .fetch_content(&format!("{}/blank", server.uri()))
            .await
            .unwrap();
        assert!(content.is_none());
    }

    /// Slow page that records when each request reached the server
    struct TimedPage {
        arrivals: Arc<Mutex<Vec<Instant>>>,
        delay: Duration,
    }

    impl Respond for TimedPage {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            self.arrivals.lock().unwrap().push(Instant::now());
            ResponseTemplate::new(200)
                .set_body_string(page(&"revenue ".repeat(10)))
                .set_delay(self.delay)
        }
    }

    #[tokio::test]
    async fn concurrent_fetches_stay_within_limit() {
        let server = MockServer::start().await;
        let arrivals = Arc::new(Mutex::new(Vec::new()));
        let delay = Duration::from_millis(200);
        Mock::given(method("GET"))
            .respond_with(TimedPage {
                arrivals: arrivals.clone(),
                delay,
            })
            .mount(&server)
            .await;

        let config = FetchConfig {
            max_concurrent: 2,
            min_text_chars: 20,
            timeout_secs: 5,
            ..FetchConfig::default()
        };
        let urls = (0..8).map(|i| format!("{}/p{}", server.uri(), i)).collect();
        let docs = WebExtractor::new(&config)
            .unwrap()
            .fetch_and_extract(urls, &ProgressReporter::disabled())
            .await;
        assert_eq!(docs.len(), 8);

        // A request holds its permit for at least `delay`, so arrivals closer than
        // half of it were in flight together.
        let arrivals = arrivals.lock().unwrap();
        let peak = arrivals
            .iter()
            .map(|t| {
                arrivals
                    .iter()
                    .filter(|s| *s <= t && t.duration_since(**s) < delay / 2)
                    .count()
            })
            .max()
            .unwrap();
        assert_eq!(peak, config.max_concurrent);
    }
}
