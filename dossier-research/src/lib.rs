//! Dossier Research - iterative web research about a named entity
//!
//! This crate runs the bounded Plan → Search → Extract → Evaluate loop, the single-pass
//! pipeline and the post-curation enrichment batcher on top of the `dossier-core`
//! abstractions.

mod http;

pub mod coverage;
pub mod enrichment;
pub mod extractor;
pub mod llm;
pub mod orchestrator;
pub mod planner;
pub mod progress;
pub mod search;
pub mod state;

pub use coverage::{missing_from, CoverageEvaluator, CoverageSnapshot};
pub use enrichment::{
    CategoryEnrichment, CuratedSet, EnrichmentBatcher, EnrichmentReport, TavilyExtractClient,
};
pub use extractor::{extract_text, DocumentExtractor, WebContentFetcher, WebExtractor};
pub use llm::SiumaiLanguageModel;
pub use orchestrator::{ResearchOrchestrator, ResearchReport, ResearchRequest, DEFAULT_SECTIONS};
pub use planner::{parse_planned_queries, seed_queries, QueryPlanner};
pub use progress::{
    stages, NoopProgress, ProgressEvent, ProgressHub, ProgressReporter, ProgressSink,
    RunSubscription,
};
pub use search::{strip_tracking_params, SearchClient, TavilySearchProvider};
pub use state::ResearchState;
