//! Research state: the mutable memory of one orchestration run

use dossier_core::Document;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};

/// Mutable state owned by exactly one run.
///
/// Invariants: `known_urls` contains the URL of every accumulated document, documents
/// have unique URLs, and `step` never decreases.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchState {
    entity: String,
    locale: String,
    sections: Vec<String>,
    known_urls: HashSet<String>,
    documents: Vec<Document>,
    #[serde(skip)]
    document_urls: HashSet<String>,
    pending_queries: VecDeque<String>,
    step: usize,
    max_steps: usize,
}

impl ResearchState {
    /// Create fresh state. Duplicate and blank sections are dropped, first occurrence wins.
    pub fn new(
        entity: impl Into<String>,
        locale: impl Into<String>,
        sections: impl IntoIterator<Item = impl Into<String>>,
        max_steps: usize,
    ) -> Self {
        let mut seen = HashSet::new();
        let sections = sections
            .into_iter()
            .map(Into::into)
            .map(|s: String| s.trim().to_string())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();

        Self {
            entity: entity.into(),
            locale: locale.into(),
            sections,
            known_urls: HashSet::new(),
            documents: Vec::new(),
            document_urls: HashSet::new(),
            pending_queries: VecDeque::new(),
            step: 0,
            max_steps,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn sections(&self) -> &[String] {
        &self.sections
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn is_known(&self, url: &str) -> bool {
        self.known_urls.contains(url)
    }

    pub fn pending_query_count(&self) -> usize {
        self.pending_queries.len()
    }

    pub fn has_pending_queries(&self) -> bool {
        !self.pending_queries.is_empty()
    }

    /// Whether the step budget is used up
    pub fn is_exhausted(&self) -> bool {
        self.step >= self.max_steps
    }

    /// Record a URL as seen. Returns `true` the first time a URL is recorded.
    pub fn remember_url(&mut self, url: &str) -> bool {
        if self.is_known(url) {
            return false;
        }
        self.known_urls.insert(url.to_string())
    }

    /// Append a document unless one with the same URL is already present
    pub fn push_document(&mut self, document: Document) -> bool {
        if !self.document_urls.insert(document.url.clone()) {
            return false;
        }
        self.known_urls.insert(document.url.clone());
        self.documents.push(document);
        true
    }

    /// Append queries to the back of the queue, skipping blank ones
    pub fn enqueue_queries<I, S>(&mut self, queries: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending_queries.extend(
            queries
                .into_iter()
                .map(Into::into)
                .filter(|q: &String| !q.trim().is_empty()),
        );
    }

    /// Dequeue up to `limit` queries in FIFO order
    pub fn take_queries(&mut self, limit: usize) -> Vec<String> {
        let count = limit.min(self.pending_queries.len());
        self.pending_queries.drain(..count).collect()
    }

    /// Advance the step counter and return the new step number
    pub fn advance_step(&mut self) -> usize {
        self.step += 1;
        self.step
    }

    /// Display titles of the last `limit` documents, in accumulation order
    pub fn recent_titles(&self, limit: usize) -> Vec<String> {
        let start = self.documents.len().saturating_sub(limit);
        self.documents[start..]
            .iter()
            .map(|d| d.display_title().to_string())
            .collect()
    }

    /// Consume the state, keeping only the accumulated documents
    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(url: &str, title: &str) -> Document {
        Document::new(url, title, "body")
    }

    #[test]
    fn sections_are_deduplicated_in_order() {
        let state = ResearchState::new("Acme", "en", ["news", "profile", "news", " "], 5);
        assert_eq!(state.sections(), ["news", "profile"]);
    }

    #[test]
    fn queries_drain_fifo_in_batches() {
        let mut state = ResearchState::new("Acme", "en", ["profile"], 5);
        state.enqueue_queries(["q1", "q2", "", "q3", "q4", "q5"]);
        assert_eq!(state.pending_query_count(), 5);
        assert_eq!(state.take_queries(4), ["q1", "q2", "q3", "q4"]);
        assert_eq!(state.take_queries(4), ["q5"]);
        assert!(state.take_queries(4).is_empty());
    }

    #[test]
    fn duplicate_documents_are_rejected_and_urls_remembered() {
        let mut state = ResearchState::new("Acme", "en", ["profile"], 5);
        assert!(state.push_document(doc("https://a.example", "A")));
        assert!(!state.push_document(doc("https://a.example", "A again")));
        assert_eq!(state.documents().len(), 1);
        assert!(state.is_known("https://a.example"));
        assert!(!state.remember_url("https://a.example"));
        assert!(state.remember_url("https://b.example"));
    }

    #[test]
    fn recent_titles_use_last_documents_and_fall_back_to_url() {
        let mut state = ResearchState::new("Acme", "en", ["profile"], 5);
        for i in 0..5 {
            state.push_document(doc(&format!("https://{i}.example"), &format!("T{i}")));
        }
        state.push_document(doc("https://untitled.example", ""));
        assert_eq!(
            state.recent_titles(3),
            ["T3", "T4", "https://untitled.example"]
        );
    }

    #[test]
    fn step_counter_is_monotonic_and_bounded_by_budget() {
        let mut state = ResearchState::new("Acme", "en", ["profile"], 2);
        assert!(!state.is_exhausted());
        assert_eq!(state.advance_step(), 1);
        assert_eq!(state.advance_step(), 2);
        assert!(state.is_exhausted());
    }
}
