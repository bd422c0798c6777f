//! Keyword-occurrence coverage heuristic
//!
//! A blunt signal of whether the collected documents address each section. Sections and
//! their keywords are data supplied by configuration.

use dossier_core::{clip_chars, CoverageConfig, Document};
use std::collections::BTreeMap;

/// Per-section scores, recomputed on every evaluation
pub type CoverageSnapshot = BTreeMap<String, usize>;

#[derive(Debug, Clone)]
pub struct CoverageEvaluator {
    keywords: BTreeMap<String, Vec<String>>,
    prefix_chars: usize,
}

impl CoverageEvaluator {
    pub fn new(config: &CoverageConfig, prefix_chars: usize) -> Self {
        let keywords = config
            .keywords
            .iter()
            .map(|(section, words)| {
                let words = words
                    .iter()
                    .map(|w| w.trim().to_lowercase())
                    .filter(|w| !w.is_empty())
                    .collect();
                (section.clone(), words)
            })
            .collect();

        Self {
            keywords,
            prefix_chars,
        }
    }

    /// Score every configured section against the documents.
    ///
    /// The corpus is the lower-cased concatenation of each document's text prefix;
    /// a section's score is the summed occurrence count of its keywords.
    pub fn coverage(&self, documents: &[Document]) -> CoverageSnapshot {
        let corpus = self.corpus(documents);

        self.keywords
            .iter()
            .map(|(section, words)| {
                let score = words.iter().map(|w| corpus.matches(w.as_str()).count()).sum();
                (section.clone(), score)
            })
            .collect()
    }

    /// Wanted sections scoring exactly zero, in `wanted` order.
    /// Sections without a keyword entry always count as missing.
    pub fn missing_sections(&self, documents: &[Document], wanted: &[String]) -> Vec<String> {
        let snapshot = self.coverage(documents);
        missing_from(&snapshot, wanted)
    }

    fn corpus(&self, documents: &[Document]) -> String {
        documents
            .iter()
            .map(|d| clip_chars(&d.text, self.prefix_chars))
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

/// Wanted sections whose snapshot score is zero or absent
pub fn missing_from(snapshot: &CoverageSnapshot, wanted: &[String]) -> Vec<String> {
    wanted
        .iter()
        .filter(|section| snapshot.get(section.as_str()).copied().unwrap_or(0) == 0)
        .cloned()
        .collect()
}
