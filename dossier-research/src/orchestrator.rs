//! Orchestration loop
//!
//! Drives one research run through `Seeding -> Stepping -> Terminated`:
//!
//! 1. **Seeding**: resolve the entity, queue seed queries, extract any seed URLs.
//! 2. **Stepping**: per step, search a batch of queued queries concurrently, extract the
//!    newly discovered URLs, evaluate coverage, then either stop or plan follow-up queries.
//! 3. **Terminated**: hand back the accumulated documents with run metadata.
//!
//! Every per-item failure is absorbed; a run with no usable results still succeeds.

use crate::coverage::{missing_from, CoverageEvaluator};
use crate::extractor::DocumentExtractor;
use crate::planner::QueryPlanner;
use crate::progress::{stages, ProgressReporter};
use crate::search::SearchClient;
use crate::state::ResearchState;
use dossier_core::{
    log_operation_error, log_operation_start, log_operation_success, performance,
    validation_error, Document, DossierConfig, DossierResult, ResearchMeta, ResearchSettings,
    SearchProvider, SourceRef, TerminationReason,
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Sections used when a request names none
pub const DEFAULT_SECTIONS: &[&str] = &["profile", "products", "market", "financials", "news", "risks"];

/// Caller-supplied parameters of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub entity: String,
    pub locale: String,
    pub sections: Vec<String>,
    /// Overrides the configured step budget
    pub max_steps: Option<usize>,
    /// Overall deadline, checked between steps
    #[serde(skip)]
    pub deadline: Option<Duration>,
}

impl ResearchRequest {
    pub fn new(
        entity: impl Into<String>,
        locale: impl Into<String>,
        sections: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            entity: entity.into(),
            locale: locale.into(),
            sections: sections.into_iter().map(Into::into).collect(),
            max_steps: None,
            deadline: None,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Final documents of a run plus metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchReport {
    pub documents: Vec<Document>,
    pub meta: ResearchMeta,
}

impl ResearchReport {
    /// Numbered source list for the downstream writing stage
    pub fn sources(&self) -> Vec<SourceRef> {
        self.documents
            .iter()
            .enumerate()
            .map(|(i, doc)| SourceRef {
                id: i + 1,
                url: doc.url.clone(),
                title: doc.display_title().to_string(),
            })
            .collect()
    }
}

pub struct ResearchOrchestrator {
    settings: ResearchSettings,
    search: SearchClient,
    extractor: Arc<dyn DocumentExtractor>,
    planner: QueryPlanner,
    coverage: CoverageEvaluator,
}

impl ResearchOrchestrator {
    /// Validate configuration and assemble an orchestrator.
    ///
    /// Configuration problems fail here, before any run starts.
    pub fn new(
        config: &DossierConfig,
        search_provider: Arc<dyn SearchProvider>,
        extractor: Arc<dyn DocumentExtractor>,
        planner: QueryPlanner,
    ) -> DossierResult<Self> {
        config.validate()?;

        Ok(Self {
            settings: config.research.clone(),
            search: SearchClient::new(search_provider, &config.search),
            extractor,
            planner,
            coverage: CoverageEvaluator::new(&config.coverage, config.research.coverage_prefix_chars),
        })
    }

    /// Run the iterative research loop for one request
    pub async fn run_research(
        &self,
        request: ResearchRequest,
        progress: &ProgressReporter,
    ) -> DossierResult<ResearchReport> {
        let entity = request.entity.trim().to_string();
        if entity.is_empty() {
            return Err(validation_error!("entity must not be empty", "entity", "orchestrator"));
        }
        let sections: Vec<String> = if request.sections.is_empty() {
            DEFAULT_SECTIONS.iter().map(|s| s.to_string()).collect()
        } else {
            request.sections
        };
        let max_steps = request.max_steps.unwrap_or(self.settings.max_steps);
        let deadline = request.deadline.map(|d| Instant::now() + d);

        log_operation_start!(
            "research",
            entity = %entity,
            max_steps = max_steps,
            adaptive = self.planner.has_llm(),
            run_id = %progress.run_id()
        );

        // Seeding
        progress.emit(
            stages::SEEDING_START,
            format!("Researching {}", entity),
            json!({ "entity": entity, "locale": request.locale, "sections": sections }),
        );

        let (resolved_name, seed_urls) = self.resolve(&entity, progress).await;
        let mut state = ResearchState::new(resolved_name.clone(), request.locale, sections, max_steps);
        let seeds = self.planner.seed_queries(&resolved_name, state.sections());
        state.enqueue_queries(seeds);

        let fresh_seeds: Vec<String> = seed_urls
            .into_iter()
            .filter(|url| state.remember_url(url))
            .collect();
        if !fresh_seeds.is_empty() {
            let documents = self.extractor.fetch_and_extract(fresh_seeds, progress).await;
            for document in documents {
                state.push_document(document);
            }
        }

        // Stepping
        let termination = loop {
            if state.is_exhausted() {
                break TerminationReason::StepBudgetExhausted;
            }
            if deadline.is_some_and(|at| Instant::now() >= at) {
                warn!(step = state.step(), "Deadline expired, returning partial results");
                break TerminationReason::DeadlineExpired;
            }

            let step = state.advance_step();
            let batch = state.take_queries(self.settings.queries_per_step);
            let discovered = self.search_batch(&batch, &mut state, progress).await;
            let found_new = !discovered.is_empty();

            if found_new {
                let urls: Vec<String> = discovered
                    .into_iter()
                    .take(self.settings.max_urls_per_step)
                    .collect();
                let documents = self.extractor.fetch_and_extract(urls, progress).await;
                for document in documents {
                    state.push_document(document);
                }
            }

            let snapshot = self.coverage.coverage(state.documents());
            let missing = missing_from(&snapshot, state.sections());
            info!(
                step,
                queries = batch.len(),
                documents = state.documents().len(),
                pending = state.pending_query_count(),
                missing = ?missing,
                "Step complete"
            );
            progress.emit(
                stages::STEP_COVERAGE,
                format!("Step {} of {}", step, state.max_steps()),
                json!({
                    "step": step,
                    "coverage": snapshot,
                    "missing": missing,
                    "documents": state.documents().len(),
                }),
            );

            if batch.is_empty() && !found_new && missing.is_empty() {
                break TerminationReason::NoMoreActions;
            }
            if missing.is_empty() && step >= self.settings.min_steps_before_success {
                break TerminationReason::CoverageSatisfied;
            }

            if !state.is_exhausted() {
                let titles = state.recent_titles(self.settings.planner_context_docs);
                match self.planner.plan_next(state.entity(), &missing, &titles).await {
                    Ok(queries) => state.enqueue_queries(queries),
                    Err(e) => {
                        log_operation_error!("plan_next", e, step = step);
                        progress.emit(
                            stages::PLANNING_FAILED,
                            "Could not plan follow-up queries",
                            json!({ "step": step, "error": e.to_string() }),
                        );
                    }
                }
            }

            if !state.has_pending_queries() && !found_new {
                break TerminationReason::Exhausted;
            }
        };

        let coverage = self.coverage.coverage(state.documents());
        let steps_used = state.step();
        progress.emit(
            stages::TERMINATED,
            format!("Research finished: {}", termination),
            json!({
                "reason": termination,
                "steps_used": steps_used,
                "documents": state.documents().len(),
            }),
        );
        log_operation_success!(
            "research",
            reason = %termination,
            steps_used = steps_used,
            documents = state.documents().len()
        );

        let documents = state.into_documents();
        Ok(ResearchReport {
            meta: ResearchMeta {
                resolved_name,
                source_count: documents.len(),
                steps_used,
                termination,
                coverage,
            },
            documents,
        })
    }

    /// One-shot pipeline: fixed bucket queries, a single extraction round, no planning
    pub async fn run_single_pass(
        &self,
        entity: &str,
        progress: &ProgressReporter,
    ) -> DossierResult<ResearchReport> {
        let entity = entity.trim();
        if entity.is_empty() {
            return Err(validation_error!("entity must not be empty", "entity", "orchestrator"));
        }

        log_operation_start!("single_pass", entity = %entity, run_id = %progress.run_id());
        progress.emit(
            stages::SEEDING_START,
            format!("Researching {}", entity),
            json!({ "entity": entity, "mode": "single_pass" }),
        );

        let (resolved_name, seed_urls) = self.resolve(entity, progress).await;
        let buckets = self.search.search_buckets(&resolved_name).await;

        let mut seen = HashSet::new();
        let urls: Vec<String> = seed_urls
            .into_iter()
            .chain(buckets.into_values().flatten())
            .filter(|url| seen.insert(url.clone()))
            .take(self.settings.single_pass_url_cap)
            .collect();
        debug!(urls = urls.len(), "Single-pass URL set");

        let mut unique = HashSet::new();
        let documents: Vec<Document> = performance::measure_async(
            "single_pass_extract",
            self.extractor.fetch_and_extract(urls, progress),
        )
        .await
        .into_iter()
        .filter(|doc| doc.text.chars().count() > self.settings.single_pass_min_text_chars)
        .filter(|doc| unique.insert(doc.url.clone()))
        .collect();

        let coverage = self.coverage.coverage(&documents);
        progress.emit(
            stages::TERMINATED,
            "Single-pass research finished",
            json!({ "reason": TerminationReason::Exhausted, "documents": documents.len() }),
        );
        log_operation_success!("single_pass", documents = documents.len());

        Ok(ResearchReport {
            meta: ResearchMeta {
                resolved_name,
                source_count: documents.len(),
                steps_used: 1,
                termination: TerminationReason::Exhausted,
                coverage,
            },
            documents,
        })
    }

    async fn resolve(&self, entity: &str, progress: &ProgressReporter) -> (String, Vec<String>) {
        match self.search.resolve_entity(entity).await {
            Ok(resolved) => resolved,
            Err(e) => {
                e.log();
                progress.emit(
                    stages::SEARCH_FAILED,
                    "Entity resolution failed",
                    json!({ "entity": entity, "error": e.to_string() }),
                );
                (entity.to_string(), Vec::new())
            }
        }
    }

    /// Search every query concurrently and return URLs not seen before, in batch order
    async fn search_batch(
        &self,
        batch: &[String],
        state: &mut ResearchState,
        progress: &ProgressReporter,
    ) -> Vec<String> {
        let searches = batch.iter().map(|query| async move {
            progress.emit(
                stages::SEARCH_START,
                format!("Searching: {}", query),
                json!({ "query": query }),
            );
            (query, self.search.search(query).await)
        });

        let mut discovered = Vec::new();
        for (query, result) in join_all(searches).await {
            match result {
                Ok(urls) => {
                    let before = discovered.len();
                    discovered.extend(urls.into_iter().filter(|url| state.remember_url(url)));
                    progress.emit(
                        stages::SEARCH_RESULT,
                        format!("Found {} new URLs", discovered.len() - before),
                        json!({ "query": query, "new_urls": discovered.len() - before }),
                    );
                }
                Err(e) => {
                    e.log();
                    progress.emit(
                        stages::SEARCH_FAILED,
                        format!("Search failed: {}", query),
                        json!({ "query": query, "error": e.to_string() }),
                    );
                }
            }
        }

        discovered
    }
}

impl std::fmt::Debug for ResearchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchOrchestrator")
            .field("settings", &self.settings)
            .field("search", &self.search)
            .field("planner", &self.planner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(documents: Vec<Document>) -> ResearchReport {
        ResearchReport {
            meta: ResearchMeta {
                resolved_name: "Acme".to_string(),
                source_count: documents.len(),
                steps_used: 1,
                termination: TerminationReason::Exhausted,
                coverage: Default::default(),
            },
            documents,
        }
    }

    #[test]
    fn sources_are_numbered_from_one() {
        let report = report(vec![
            Document::new("https://a.example/", "About Acme", "text"),
            Document::new("https://b.example/", "", "text"),
        ]);
        let sources = report.sources();
        assert_eq!(sources[0].id, 1);
        assert_eq!(sources[0].title, "About Acme");
        assert_eq!(sources[1].id, 2);
        assert_eq!(sources[1].title, "https://b.example/");
    }

    #[test]
    fn request_builder_sets_overrides() {
        let request = ResearchRequest::new("Acme", "en", ["profile"])
            .with_max_steps(3)
            .with_deadline(Duration::from_secs(30));
        assert_eq!(request.max_steps, Some(3));
        assert_eq!(request.deadline, Some(Duration::from_secs(30)));
        assert_eq!(request.sections, ["profile"]);
    }
}
