//! Language model adapter over siumai
//!
//! Only the single completion call used by the query planner is exposed.

use async_trait::async_trait;
use dossier_core::{DossierError, DossierResult, ErrorContext, LanguageModel, LlmConfig};
use siumai::prelude::*;
use std::time::Instant;
use tracing::{debug, info};

const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Apply model and sampling settings to a provider builder, then build and box the client.
/// Each siumai provider has its own builder type, so this is a macro rather than a fn.
macro_rules! finish_client {
    ($builder:expr, $config:expr) => {{
        let mut builder = $builder
            .model(&$config.model)
            .temperature($config.temperature);
        if let Some(max_tokens) = $config.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }
        let client = builder
            .build()
            .await
            .map_err(|e| build_error($config, e))?;
        Ok(Box::new(client) as Box<dyn LlmClient>)
    }};
}

/// [`LanguageModel`] backed by any provider siumai supports
pub struct SiumaiLanguageModel {
    client: Box<dyn LlmClient>,
    provider: String,
    model: String,
}

impl SiumaiLanguageModel {
    pub async fn new(config: &LlmConfig) -> DossierResult<Self> {
        let client = Self::build_client(config).await?;

        info!(
            provider = %config.provider,
            model = %config.model,
            "Created planning LLM client"
        );

        Ok(Self {
            client,
            provider: config.provider.clone(),
            model: config.model.clone(),
        })
    }

    async fn build_client(config: &LlmConfig) -> DossierResult<Box<dyn LlmClient>> {
        match config.provider.as_str() {
            "openai" => {
                let mut builder = LlmBuilder::new()
                    .openai()
                    .api_key(&api_key(config, "OPENAI_API_KEY")?);
                if let Some(base_url) = &config.base_url {
                    builder = builder.base_url(base_url);
                }
                finish_client!(builder, config)
            }
            "anthropic" => finish_client!(
                LlmBuilder::new()
                    .anthropic()
                    .api_key(&api_key(config, "ANTHROPIC_API_KEY")?),
                config
            ),
            "ollama" => finish_client!(
                LlmBuilder::new()
                    .ollama()
                    .base_url(config.base_url.as_deref().unwrap_or(OLLAMA_BASE_URL)),
                config
            ),
            "groq" => finish_client!(
                LlmBuilder::new()
                    .groq()
                    .api_key(&api_key(config, "GROQ_API_KEY")?),
                config
            ),
            provider => Err(DossierError::Config {
                message: format!("Unsupported LLM provider: {}", provider),
                source: None,
                context: ErrorContext::new("llm")
                    .with_operation("build_client")
                    .with_suggestion("Use one of: openai, anthropic, ollama, groq"),
            }),
        }
    }

    fn llm_error(&self, message: String) -> DossierError {
        DossierError::Llm {
            message,
            provider: Some(self.provider.clone()),
            model: Some(self.model.clone()),
            context: ErrorContext::new("llm").with_operation("complete"),
        }
    }
}

#[async_trait]
impl LanguageModel for SiumaiLanguageModel {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> DossierResult<String> {
        let start = Instant::now();
        let messages = vec![system!(system_prompt), user!(user_prompt)];

        let response = self
            .client
            .chat(messages)
            .await
            .map_err(|e| self.llm_error(format!("LLM generation failed: {}", e)))?;

        let content = response
            .content_text()
            .ok_or_else(|| self.llm_error("No text content in LLM response".to_string()))?;

        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            chars = content.chars().count(),
            "LLM completion finished"
        );
        Ok(content.to_string())
    }
}

fn api_key(config: &LlmConfig, env_var: &str) -> DossierResult<String> {
    config
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .or_else(|| std::env::var(env_var).ok())
        .ok_or_else(|| DossierError::Config {
            message: format!("{} provider API key not found", config.provider),
            source: None,
            context: ErrorContext::new("llm")
                .with_operation("build_client")
                .with_suggestion(&format!("Set llm.api_key or the {} variable", env_var)),
        })
}

fn build_error(config: &LlmConfig, error: impl std::fmt::Display) -> DossierError {
    DossierError::Config {
        message: format!("Failed to build {} client: {}", config.provider, error),
        source: None,
        context: ErrorContext::new("llm").with_operation("build_client"),
    }
}
