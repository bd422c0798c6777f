//! Query planning: deterministic seed queries and LLM-driven adaptive queries

use dossier_core::{
    with_timeout, DossierError, DossierResult, ErrorContext, LanguageModel, ResearchSettings,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const PLANNER_SYSTEM_PROMPT: &str = "You are a research planner. Based on the target company and missing sections, \
propose up to 3 high-value web search queries per section. \
Output as plain lines in the format: <section>: <query>.";

/// Fixed seed templates per section; `{entity}` is replaced by the entity name
const SEED_TEMPLATES: &[(&str, &[&str])] = &[
    (
        "profile",
        &[
            "{entity} company overview business model",
            "{entity} wikipedia investors",
        ],
    ),
    (
        "products",
        &["{entity} products services portfolio customers"],
    ),
    (
        "market",
        &[
            "{entity} competitors industry market share",
            "{entity} competitor list vs",
        ],
    ),
    (
        "financials",
        &[
            "{entity} financial results revenue operating income funding",
            "{entity} annual report presentation pdf",
        ],
    ),
    (
        "news",
        &[
            "{entity} recent news last 12 months",
            "{entity} press release site:ir OR site:news",
        ],
    ),
    (
        "risks",
        &[
            "{entity} risks litigation compliance",
            "{entity} 規制 リスク 訴訟 罰金",
        ],
    ),
];

/// Seed queries for the given sections.
///
/// Deterministic: sections are visited in the given order, each contributing its fixed
/// templates (or `"<entity> <section>"` when no template exists); duplicates are removed,
/// first occurrence wins.
pub fn seed_queries(entity: &str, sections: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut queries = Vec::new();

    for section in sections {
        let templates = SEED_TEMPLATES
            .iter()
            .find(|(name, _)| *name == section.as_str())
            .map(|(_, templates)| *templates);

        let expanded: Vec<String> = match templates {
            Some(templates) => templates
                .iter()
                .map(|t| t.replace("{entity}", entity))
                .collect(),
            None => vec![format!("{} {}", entity, section)],
        };

        for query in expanded {
            if seen.insert(query.clone()) {
                queries.push(query);
            }
        }
    }

    queries
}

/// Parse newline-delimited `"<section>: <query>"` lines into at most `max_queries` queries.
///
/// Everything after the first colon is the query; a line without a colon is taken as a
/// bare query. Bullets, surrounding whitespace and empty lines are dropped.
pub fn parse_planned_queries(text: &str, max_queries: usize) -> Vec<String> {
    let mut queries = Vec::new();

    for line in text.lines() {
        let line = line.trim_matches(|c: char| c.is_whitespace() || c == '-' || c == '*');
        if line.is_empty() {
            continue;
        }

        let query = match line.split_once(':') {
            Some((_, query)) => query.trim(),
            None => line,
        };

        if !query.is_empty() {
            queries.push(query.to_string());
        }
    }

    queries.truncate(max_queries);
    queries
}

/// Produces seed and adaptive queries for a run
#[derive(Clone)]
pub struct QueryPlanner {
    llm: Option<Arc<dyn LanguageModel>>,
    title_limit: usize,
    max_queries: usize,
    timeout: Duration,
}

impl QueryPlanner {
    /// Planner without a language model; adaptive planning yields nothing
    pub fn seed_only(settings: &ResearchSettings) -> Self {
        Self {
            llm: None,
            title_limit: settings.planner_title_limit,
            max_queries: settings.max_planned_queries,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_llm(
        settings: &ResearchSettings,
        llm: Arc<dyn LanguageModel>,
        timeout: Duration,
    ) -> Self {
        Self {
            llm: Some(llm),
            timeout,
            ..Self::seed_only(settings)
        }
    }

    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    pub fn seed_queries(&self, entity: &str, sections: &[String]) -> Vec<String> {
        seed_queries(entity, sections)
    }

    /// Ask the language model for follow-up queries covering `missing_sections`.
    ///
    /// Returns an empty list without calling the model when nothing is missing.
    /// Model failures surface as [`DossierError::Planning`].
    pub async fn plan_next(
        &self,
        entity: &str,
        missing_sections: &[String],
        recent_titles: &[String],
    ) -> DossierResult<Vec<String>> {
        if missing_sections.is_empty() {
            return Ok(Vec::new());
        }

        let Some(llm) = &self.llm else {
            debug!("No language model configured, skipping adaptive planning");
            return Ok(Vec::new());
        };

        let prompt = self.build_prompt(entity, missing_sections, recent_titles);

        let response = with_timeout(
            llm.complete(PLANNER_SYSTEM_PROMPT, &prompt),
            self.timeout,
            "plan_next_queries",
        )
        .await
        .and_then(|inner| inner)
        .map_err(|e| DossierError::Planning {
            message: e.to_string(),
            source: Some(Box::new(e)),
            context: ErrorContext::new("query_planner")
                .with_operation("plan_next")
                .with_metadata("missing", &missing_sections.join(",")),
        })?;

        let queries = parse_planned_queries(response.trim(), self.max_queries);
        info!(
            entity,
            missing = missing_sections.len(),
            planned = queries.len(),
            "Planned adaptive queries"
        );

        Ok(queries)
    }

    fn build_prompt(&self, entity: &str, missing: &[String], recent_titles: &[String]) -> String {
        let start = recent_titles.len().saturating_sub(self.title_limit);
        let context = recent_titles[start..]
            .iter()
            .map(|t| format!("- {}", t))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Company: {}\nMissing sections: {}\nKnown document titles:\n{}\n\n\
             Return only lines like 'section: query' (no numbering).",
            entity,
            missing.join(", "),
            context
        )
    }
}

impl std::fmt::Debug for QueryPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPlanner")
            .field("has_llm", &self.llm.is_some())
            .field("title_limit", &self.title_limit)
            .field("max_queries", &self.max_queries)
            .finish()
    }
}
