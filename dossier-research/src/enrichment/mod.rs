//! Enrichment batcher
//!
//! Fills `raw_content` on curated documents that lack it. Categories run in parallel, each
//! category's URLs are split into fixed-size batches, a bounded number of batches run at
//! once, and every URL in a batch is fetched concurrently. Failures are counted, never
//! propagated.

use crate::progress::{stages, ProgressReporter};
use dossier_core::{
    log_operation_start, log_operation_success, with_timeout, ContentFetcher, CuratedDocument,
    DossierError, DossierResult, EnrichmentConfig, ErrorContext,
};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub mod tavily;

pub use tavily::TavilyExtractClient;

/// Curated documents keyed by category, then by URL
pub type CuratedSet = BTreeMap<String, BTreeMap<String, CuratedDocument>>;

/// Outcome of enriching one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryEnrichment {
    pub category: String,
    pub enriched: usize,
    pub total: usize,
    pub errors: usize,
    /// Fetches that succeeded but returned no content
    pub empty: usize,
    pub elapsed_ms: u64,
}

/// Outcome of one enrichment invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentReport {
    pub categories: Vec<CategoryEnrichment>,
    pub total_enriched: usize,
    pub total_documents: usize,
    pub total_errors: usize,
    pub elapsed_ms: u64,
}

impl EnrichmentReport {
    pub fn category(&self, name: &str) -> Option<&CategoryEnrichment> {
        self.categories.iter().find(|c| c.category == name)
    }
}

enum FetchOutcome {
    Content(String),
    Empty,
    Failed,
}

struct CategoryRun {
    outcomes: Vec<(String, FetchOutcome)>,
    elapsed: Duration,
}

#[derive(Clone)]
pub struct EnrichmentBatcher {
    fetcher: Arc<dyn ContentFetcher>,
    batch_size: usize,
    max_concurrent_batches: usize,
    timeout: Duration,
}

impl EnrichmentBatcher {
    pub fn new(fetcher: Arc<dyn ContentFetcher>, config: &EnrichmentConfig) -> Self {
        Self {
            fetcher,
            batch_size: config.batch_size.max(1),
            max_concurrent_batches: config.max_concurrent_batches.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Enrich every category in place and report per-category counts
    pub async fn enrich(
        &self,
        curated: &mut CuratedSet,
        progress: &ProgressReporter,
    ) -> EnrichmentReport {
        let started = Instant::now();
        log_operation_start!("enrichment", categories = curated.len());
        progress.emit(
            stages::ENRICHMENT_START,
            "Starting content enrichment",
            json!({ "categories": curated.len() }),
        );

        let mut handles = Vec::new();
        for (category, docs) in curated.iter() {
            let urls: Vec<String> = docs
                .iter()
                .filter(|(_, doc)| doc.needs_enrichment())
                .map(|(url, _)| url.clone())
                .collect();

            if urls.is_empty() {
                info!(category = %category, "No documents need enrichment");
                continue;
            }

            progress.emit(
                stages::CATEGORY_START,
                format!("Processing {} documents", category),
                json!({ "category": category, "count": urls.len() }),
            );

            let batcher = self.clone();
            let reporter = progress.clone();
            let name = category.clone();
            let total = urls.len();
            let handle = tokio::spawn(async move {
                batcher.enrich_category(&name, urls, &reporter).await
            });
            handles.push((category.clone(), total, Instant::now(), handle));
        }

        let mut categories = Vec::new();
        for (category, total, spawned, handle) in handles {
            let summary = match handle.await {
                Ok(run) => apply_outcomes(&category, total, run, curated),
                Err(e) => {
                    DossierError::Enrichment {
                        category: category.clone(),
                        message: e.to_string(),
                        context: ErrorContext::new("enrichment")
                            .with_operation("enrich_category")
                            .with_metadata("total", &total.to_string()),
                    }
                    .log();
                    CategoryEnrichment {
                        category: category.clone(),
                        enriched: 0,
                        total,
                        errors: total,
                        empty: 0,
                        elapsed_ms: spawned.elapsed().as_millis() as u64,
                    }
                }
            };

            progress.emit(
                stages::CATEGORY_COMPLETE,
                format!(
                    "Completed {} documents in {:.2}s",
                    category,
                    summary.elapsed_ms as f64 / 1000.0
                ),
                json!({
                    "category": category,
                    "enriched": summary.enriched,
                    "total": summary.total,
                    "errors": summary.errors,
                    "elapsed_ms": summary.elapsed_ms,
                }),
            );
            categories.push(summary);
        }

        let report = EnrichmentReport {
            total_enriched: categories.iter().map(|c| c.enriched).sum(),
            total_documents: categories.iter().map(|c| c.total).sum(),
            total_errors: categories.iter().map(|c| c.errors).sum(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            categories,
        };

        let mut message = format!(
            "Content enrichment complete. Enriched {}/{} documents",
            report.total_enriched, report.total_documents
        );
        if report.total_errors > 0 {
            message.push_str(&format!(", skipped {}", report.total_errors));
        }
        progress.emit(
            stages::ENRICHMENT_COMPLETE,
            message,
            json!({
                "total_enriched": report.total_enriched,
                "total_documents": report.total_documents,
                "total_errors": report.total_errors,
                "elapsed_ms": report.elapsed_ms,
            }),
        );
        log_operation_success!(
            "enrichment",
            enriched = report.total_enriched,
            total = report.total_documents,
            duration_ms = report.elapsed_ms
        );

        report
    }

    async fn enrich_category(
        &self,
        category: &str,
        urls: Vec<String>,
        progress: &ProgressReporter,
    ) -> CategoryRun {
        let started = Instant::now();
        let batches: Vec<Vec<String>> = urls.chunks(self.batch_size).map(<[_]>::to_vec).collect();
        let total_batches = batches.len();

        let outcomes: Vec<Vec<(String, FetchOutcome)>> = stream::iter(batches.into_iter().enumerate())
            .map(|(index, batch)| async move {
                progress.emit(
                    stages::BATCH_START,
                    format!("Processing batch {}/{}", index + 1, total_batches),
                    json!({
                        "category": category,
                        "batch": index + 1,
                        "total_batches": total_batches,
                    }),
                );
                let batch_started = Instant::now();
                let results =
                    join_all(batch.into_iter().map(|url| self.fetch_one(category, url, progress)))
                        .await;
                info!(
                    category,
                    batch = index + 1,
                    urls = results.len(),
                    duration_ms = batch_started.elapsed().as_millis() as u64,
                    "Batch completed"
                );
                results
            })
            .buffer_unordered(self.max_concurrent_batches)
            .collect()
            .await;

        CategoryRun {
            outcomes: outcomes.into_iter().flatten().collect(),
            elapsed: started.elapsed(),
        }
    }

    async fn fetch_one(
        &self,
        category: &str,
        url: String,
        progress: &ProgressReporter,
    ) -> (String, FetchOutcome) {
        let started = Instant::now();
        progress.emit(
            stages::EXTRACTING,
            format!("Extracting content from {}", url),
            json!({ "category": category, "url": url }),
        );

        let result: DossierResult<Option<String>> = with_timeout(
            self.fetcher.fetch_content(&url),
            self.timeout,
            "enrichment_fetch",
        )
        .await
        .and_then(|inner| inner);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(Some(content)) if !content.is_empty() => {
                progress.emit(
                    stages::EXTRACTED,
                    format!("Extracted content from {}", url),
                    json!({ "category": category, "url": url, "success": true, "elapsed_ms": elapsed_ms }),
                );
                FetchOutcome::Content(content)
            }
            Ok(_) => FetchOutcome::Empty,
            Err(e) => {
                warn!(category, url = %url, error = %e, "Enrichment fetch failed");
                progress.emit(
                    stages::EXTRACTION_ERROR,
                    format!("Failed to extract content from {}", url),
                    json!({
                        "category": category,
                        "url": url,
                        "success": false,
                        "error": e.to_string(),
                        "elapsed_ms": elapsed_ms,
                    }),
                );
                FetchOutcome::Failed
            }
        };

        (url, outcome)
    }
}

impl std::fmt::Debug for EnrichmentBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichmentBatcher")
            .field("batch_size", &self.batch_size)
            .field("max_concurrent_batches", &self.max_concurrent_batches)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn apply_outcomes(
    category: &str,
    total: usize,
    run: CategoryRun,
    curated: &mut CuratedSet,
) -> CategoryEnrichment {
    let mut summary = CategoryEnrichment {
        category: category.to_string(),
        enriched: 0,
        total,
        errors: 0,
        empty: 0,
        elapsed_ms: run.elapsed.as_millis() as u64,
    };

    for (url, outcome) in run.outcomes {
        match outcome {
            FetchOutcome::Content(content) => {
                if let Some(doc) = curated.get_mut(category).and_then(|d| d.get_mut(&url)) {
                    doc.raw_content = Some(content);
                    summary.enriched += 1;
                }
            }
            FetchOutcome::Empty => summary.empty += 1,
            FetchOutcome::Failed => summary.errors += 1,
        }
    }

    info!(
        category,
        enriched = summary.enriched,
        errors = summary.errors,
        duration_ms = summary.elapsed_ms,
        "Category enrichment completed"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubFetcher {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl StubFetcher {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ContentFetcher for StubFetcher {
        async fn fetch_content(&self, url: &str) -> DossierResult<Option<String>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if url.contains("panic") {
                panic!("fetcher bug");
            }
            if url.contains("fail") {
                Err(DossierError::Network {
                    message: "reset".to_string(),
                    source: None,
                    context: ErrorContext::new("stub"),
                })
            } else if url.contains("empty") {
                Ok(None)
            } else {
                Ok(Some(format!("full text of {}", url)))
            }
        }
    }

    fn doc(url: &str, raw: Option<&str>) -> (String, CuratedDocument) {
        (
            url.to_string(),
            CuratedDocument {
                url: url.to_string(),
                title: String::new(),
                content: "snippet".to_string(),
                raw_content: raw.map(str::to_string),
                score: None,
            },
        )
    }

    fn config(batch_size: usize) -> EnrichmentConfig {
        EnrichmentConfig {
            batch_size,
            ..EnrichmentConfig::default()
        }
    }

    #[tokio::test]
    async fn fills_missing_content_and_counts_failures() {
        let mut curated = CuratedSet::new();
        curated.insert(
            "news".to_string(),
            [
                doc("https://n/ok", None),
                doc("https://n/fail", None),
                doc("https://n/empty", Some("")),
                doc("https://n/done", Some("already here")),
            ]
            .into_iter()
            .collect(),
        );

        let batcher = EnrichmentBatcher::new(Arc::new(StubFetcher::new()), &config(20));
        let report = batcher
            .enrich(&mut curated, &ProgressReporter::disabled())
            .await;

        let news = report.category("news").unwrap();
        assert_eq!((news.enriched, news.total, news.errors, news.empty), (1, 3, 1, 1));
        assert_eq!(
            curated["news"]["https://n/ok"].raw_content.as_deref(),
            Some("full text of https://n/ok")
        );
        assert_eq!(curated["news"]["https://n/fail"].raw_content, None);
        assert_eq!(
            curated["news"]["https://n/done"].raw_content.as_deref(),
            Some("already here")
        );
    }

    #[tokio::test]
    async fn bounds_concurrency_by_batches() {
        let fetcher = Arc::new(StubFetcher::new());
        let mut curated = CuratedSet::new();
        curated.insert(
            "company".to_string(),
            (0..20).map(|i| doc(&format!("https://c/{}", i), None)).collect(),
        );

        let batcher = EnrichmentBatcher::new(
            fetcher.clone(),
            &EnrichmentConfig {
                batch_size: 2,
                max_concurrent_batches: 3,
                ..EnrichmentConfig::default()
            },
        );
        let report = batcher
            .enrich(&mut curated, &ProgressReporter::disabled())
            .await;

        assert_eq!(report.total_enriched, 20);
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 6);
    }

    #[tokio::test]
    async fn aborted_category_does_not_affect_siblings() {
        let mut curated = CuratedSet::new();
        curated.insert(
            "financial".to_string(),
            [doc("https://f/panic", None), doc("https://f/ok", None)]
                .into_iter()
                .collect(),
        );
        curated.insert(
            "news".to_string(),
            [doc("https://n/ok", None)].into_iter().collect(),
        );

        let batcher = EnrichmentBatcher::new(Arc::new(StubFetcher::new()), &config(20));
        let report = batcher
            .enrich(&mut curated, &ProgressReporter::disabled())
            .await;

        let financial = report.category("financial").unwrap();
        assert_eq!((financial.enriched, financial.errors), (0, 2));
        assert_eq!(curated["financial"]["https://f/ok"].raw_content, None);
        assert_eq!(report.category("news").unwrap().enriched, 1);
        assert_eq!(report.total_errors, 2);
    }

    #[tokio::test]
    async fn categories_without_work_are_skipped() {
        let mut curated = CuratedSet::new();
        curated.insert(
            "industry".to_string(),
            [doc("https://i/1", Some("done"))].into_iter().collect(),
        );

        let batcher = EnrichmentBatcher::new(Arc::new(StubFetcher::new()), &config(20));
        let report = batcher
            .enrich(&mut curated, &ProgressReporter::disabled())
            .await;
        assert!(report.categories.is_empty());
        assert_eq!(report.total_documents, 0);
    }
}
