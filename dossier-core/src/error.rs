//! Unified error handling system
//!
//! Provides structured error types with context, recovery suggestions, and proper error chaining.
//! Per-item failures (one query, one URL, one category) are represented here but absorbed by
//! the research loop; only configuration and validation errors are fatal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type DossierResult<T> = Result<T, DossierError>;

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: std::collections::HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: std::collections::HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Main error type for the research system
#[derive(Error, Debug)]
pub enum DossierError {
    /// One search query failed at the provider
    #[error("Search failed for '{query}': {message}")]
    Search {
        query: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    /// One URL could not be fetched or extracted
    #[error("Fetch failed for {url}: {message}")]
    Fetch {
        url: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    /// The language model could not plan follow-up queries
    #[error("Query planning failed: {message}")]
    Planning {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    /// Batch enrichment of one category raised
    #[error("Enrichment failed for category '{category}': {message}")]
    Enrichment {
        category: String,
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        context: ErrorContext,
    },

    #[error("Operation timeout: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },

    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        retry_after_ms: Option<u64>,
        context: ErrorContext,
    },

    #[error("LLM error: {message}")]
    Llm {
        message: String,
        provider: Option<String>,
        model: Option<String>,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },
}

impl DossierError {
    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            DossierError::Search { context, .. } => Some(context),
            DossierError::Fetch { context, .. } => Some(context),
            DossierError::Planning { context, .. } => Some(context),
            DossierError::Enrichment { context, .. } => Some(context),
            DossierError::Config { context, .. } => Some(context),
            DossierError::Validation { context, .. } => Some(context),
            DossierError::Network { context, .. } => Some(context),
            DossierError::Http { context, .. } => Some(context),
            DossierError::Timeout { context, .. } => Some(context),
            DossierError::RateLimit { context, .. } => Some(context),
            DossierError::Llm { context, .. } => Some(context),
            DossierError::Internal { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            DossierError::Network { .. } => true,
            DossierError::Timeout { .. } => true,
            DossierError::RateLimit { .. } => true,
            DossierError::Config { .. } => false,
            DossierError::Validation { .. } => false,
            _ => false,
        }
    }

    /// Get retry delay in milliseconds for recoverable errors
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            DossierError::Network { .. } => Some(1000),
            DossierError::Timeout { .. } => Some(2000),
            DossierError::RateLimit { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }

    /// Whether this error must stop the caller before any run starts
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DossierError::Config { .. } | DossierError::Validation { .. }
        )
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            DossierError::Internal { .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Internal error occurred"
                );
            }
            DossierError::Config { .. } | DossierError::Validation { .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Configuration or validation error"
                );
            }
            DossierError::Search { .. }
            | DossierError::Fetch { .. }
            | DossierError::Planning { .. }
            | DossierError::Enrichment { .. } => {
                warn!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Per-item failure absorbed"
                );
            }
            DossierError::Network { .. } | DossierError::Timeout { .. } => {
                warn!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Network or timeout error (may be recoverable)"
                );
            }
            _ => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Error occurred"
                );
            }
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! search_error {
    ($query:expr, $msg:expr, $component:expr) => {
        $crate::DossierError::Search {
            query: $query.to_string(),
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($query:expr, $msg:expr, $component:expr, $source:expr) => {
        $crate::DossierError::Search {
            query: $query.to_string(),
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component),
        }
    };
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::DossierError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file")
                .with_suggestion("Run 'dossier config --init' to create default config"),
        }
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::DossierError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the field value and format"),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_error_macro_carries_query_and_component() {
        let err = search_error!("acme news", "provider returned 502", "search_client");
        match &err {
            DossierError::Search { query, context, .. } => {
                assert_eq!(query, "acme news");
                assert_eq!(context.component, "search_client");
                assert!(!context.error_id.is_empty());
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Search failed for 'acme news': provider returned 502"
        );
    }

    #[test]
    fn config_errors_are_fatal_and_not_retried() {
        let err = config_error!("TAVILY_API_KEY is not set", "tavily");
        assert!(err.is_fatal());
        assert!(!err.is_recoverable());
        assert!(err.retry_delay_ms().is_none());
        assert_eq!(err.context().unwrap().recovery_suggestions.len(), 2);
    }

    #[test]
    fn rate_limit_uses_server_supplied_delay() {
        let err = DossierError::RateLimit {
            message: "slow down".to_string(),
            retry_after_ms: Some(750),
            context: ErrorContext::new("search"),
        };
        assert!(err.is_recoverable());
        assert_eq!(err.retry_delay_ms(), Some(750));
    }
}
