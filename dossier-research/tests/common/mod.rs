//! Shared stub collaborators for orchestrator tests

#![allow(dead_code)]

use async_trait::async_trait;
use dossier_core::{
    Document, DossierConfig, DossierError, DossierResult, ErrorContext, LanguageModel, SearchHit,
    SearchProvider,
};
use dossier_research::{
    DocumentExtractor, ProgressEvent, ProgressReporter, ProgressSink, QueryPlanner,
    ResearchOrchestrator,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Search provider answering from a fixed table; unknown queries return nothing
#[derive(Default)]
pub struct StubSearch {
    answers: HashMap<String, Vec<String>>,
    failing: Vec<String>,
    pub calls: Mutex<Vec<String>>,
    pub delay: Option<Duration>,
}

impl StubSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, query: &str, urls: &[&str]) -> Self {
        self.answers
            .insert(query.to_string(), urls.iter().map(|u| u.to_string()).collect());
        self
    }

    pub fn fail(mut self, query: &str) -> Self {
        self.failing.push(query.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for StubSearch {
    async fn search(&self, query: &str, max_results: usize) -> DossierResult<Vec<SearchHit>> {
        self.calls.lock().unwrap().push(query.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.iter().any(|q| q == query) {
            return Err(DossierError::Network {
                message: "provider unavailable".to_string(),
                source: None,
                context: ErrorContext::new("stub_search"),
            });
        }
        Ok(self
            .answers
            .get(query)
            .map(|urls| {
                urls.iter()
                    .take(max_results)
                    .map(|url| SearchHit {
                        url: url.clone(),
                        title: String::new(),
                        snippet: String::new(),
                        score: 1.0,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "stub"
    }
}

/// Extractor returning canned documents; URLs without a page are dropped
#[derive(Default)]
pub struct StubExtractor {
    pages: HashMap<String, Document>,
    pub fetched: Mutex<Vec<String>>,
}

impl StubExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, title: &str, text: &str) -> Self {
        self.pages
            .insert(url.to_string(), Document::new(url, title, text));
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentExtractor for StubExtractor {
    async fn fetch_and_extract(
        &self,
        urls: Vec<String>,
        _progress: &ProgressReporter,
    ) -> Vec<Document> {
        self.fetched.lock().unwrap().extend(urls.iter().cloned());
        urls.iter()
            .filter_map(|url| self.pages.get(url).cloned())
            .collect()
    }
}

/// Language model replying with a fixed script, or failing
pub struct ScriptedLlm {
    reply: Option<String>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> DossierResult<String> {
        self.prompts.lock().unwrap().push(user_prompt.to_string());
        self.reply.clone().ok_or_else(|| DossierError::Llm {
            message: "model overloaded".to_string(),
            provider: Some("stub".to_string()),
            model: None,
            context: ErrorContext::new("stub_llm"),
        })
    }
}

/// Sink that keeps every event
#[derive(Default)]
pub struct CapturingSink {
    pub events: Mutex<Vec<ProgressEvent>>,
}

impl CapturingSink {
    pub fn stages(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.stage.clone())
            .collect()
    }
}

impl ProgressSink for CapturingSink {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn orchestrator(
    search: Arc<StubSearch>,
    extractor: Arc<StubExtractor>,
    llm: Option<Arc<ScriptedLlm>>,
) -> ResearchOrchestrator {
    let config = DossierConfig::default();
    let planner = match llm {
        Some(llm) => QueryPlanner::with_llm(&config.research, llm, Duration::from_secs(5)),
        None => QueryPlanner::seed_only(&config.research),
    };
    ResearchOrchestrator::new(&config, search, extractor, planner)
        .expect("Should build orchestrator from default config")
}

/// Text long enough to look like a real page, containing `keyword`
pub fn page_text(keyword: &str) -> String {
    format!("{} {}", keyword, "lorem ipsum ".repeat(40))
}
