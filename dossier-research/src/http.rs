//! Shared HTTP client construction and error mapping

use dossier_core::{DossierError, DossierResult, ErrorContext};
use std::time::Duration;

/// Build an HTTP client with a descriptive user agent, a fixed timeout and bounded redirects
pub(crate) fn create_http_client(
    user_agent: &str,
    timeout: Duration,
    max_redirects: usize,
) -> DossierResult<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();

    headers.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_str(user_agent).map_err(|e| DossierError::Config {
            message: format!("Invalid user agent: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("http_client").with_operation("create_client"),
        })?,
    );
    headers.insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,application/json;q=0.9,*/*;q=0.8",
        ),
    );

    reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(max_redirects))
        .build()
        .map_err(|e| DossierError::Config {
            message: format!("Failed to create HTTP client: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("http_client").with_operation("create_client"),
        })
}

/// Map a transport-level failure to a typed error
pub(crate) fn transport_error(error: reqwest::Error, component: &str, operation: &str) -> DossierError {
    let context = ErrorContext::new(component).with_operation(operation);
    if error.is_timeout() {
        DossierError::Timeout {
            operation: operation.to_string(),
            duration_ms: 0,
            context: context.with_suggestion("Increase the request timeout"),
        }
    } else {
        DossierError::Network {
            message: error.to_string(),
            source: Some(Box::new(error)),
            context: context.with_suggestion("Check network connectivity and provider status"),
        }
    }
}

/// Turn a non-success HTTP response into a typed error
pub(crate) async fn response_error(
    response: reqwest::Response,
    component: &str,
    operation: &str,
) -> DossierError {
    let status = response.status();
    let url = response.url().clone();
    let retry_after_ms = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs * 1000);

    let body = response.text().await.unwrap_or_default();
    let detail: String = if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string()
    } else {
        body.chars().take(300).collect()
    };
    let message = format!("HTTP {} from {}: {}", status.as_u16(), url, detail);

    let context = ErrorContext::new(component)
        .with_operation(operation)
        .with_metadata("status", &status.as_u16().to_string())
        .with_suggestion(match status.as_u16() {
            401 | 403 => "Check the API key and account permissions",
            404 => "Resource not found or not accessible",
            429 => "Reduce request rate or wait before retrying",
            _ => "Check network connectivity and API status",
        });

    if status.as_u16() == 429 {
        DossierError::RateLimit {
            message,
            retry_after_ms,
            context,
        }
    } else if status.is_server_error() {
        DossierError::Network {
            message,
            source: None,
            context,
        }
    } else {
        DossierError::Http {
            status: status.as_u16(),
            message,
            context,
        }
    }
}
