//! Integration tests for dossier-core infrastructure

use dossier_core::{
    init_logging, retry_async, validation_error, with_timeout, DossierConfig, DossierError,
    ErrorContext, LogFormat, LoggingConfig, RateLimiter, RetryConfig,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_test::{assert_err, assert_ok};

fn fast_retry(max_attempts: usize) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay_ms: 5,
        max_delay_ms: 20,
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

#[tokio::test]
async fn test_retry_recovers_from_network_errors() {
    let attempt_count = Arc::new(AtomicUsize::new(0));

    let result = retry_async(
        || {
            let attempt_count = Arc::clone(&attempt_count);
            async move {
                let count = attempt_count.fetch_add(1, Ordering::SeqCst) + 1;
                if count < 3 {
                    Err(DossierError::Network {
                        message: "connection reset".to_string(),
                        source: None,
                        context: ErrorContext::new("test"),
                    })
                } else {
                    Ok("Success")
                }
            }
        },
        &fast_retry(5),
        "test_operation",
    )
    .await;

    assert_eq!(result.unwrap(), "Success");
    assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_stops_on_unrecoverable_error() {
    let attempt_count = Arc::new(AtomicUsize::new(0));

    let result: Result<(), _> = retry_async(
        || {
            let attempt_count = Arc::clone(&attempt_count);
            async move {
                attempt_count.fetch_add(1, Ordering::SeqCst);
                Err(validation_error!("bad query", "query", "test"))
            }
        },
        &fast_retry(5),
        "test_operation",
    )
    .await;

    assert_err!(result);
    assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_single_attempt_config_never_retries() {
    let attempt_count = Arc::new(AtomicUsize::new(0));

    let result: Result<(), _> = retry_async(
        || {
            let attempt_count = Arc::clone(&attempt_count);
            async move {
                attempt_count.fetch_add(1, Ordering::SeqCst);
                Err(DossierError::Timeout {
                    operation: "search".to_string(),
                    duration_ms: 10,
                    context: ErrorContext::new("test"),
                })
            }
        },
        &RetryConfig::default().with_max_attempts(1),
        "test_operation",
    )
    .await;

    assert!(result.is_err());
    assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_timeout_mechanism() {
    let quick_operation = async {
        sleep(Duration::from_millis(10)).await;
        "Success"
    };

    let result = with_timeout(quick_operation, Duration::from_millis(200), "quick_test").await;
    assert_eq!(result.unwrap(), "Success");

    let slow_operation = async {
        sleep(Duration::from_millis(200)).await;
        "Should not reach here"
    };

    let result = with_timeout(slow_operation, Duration::from_millis(50), "slow_test").await;

    match result.unwrap_err() {
        DossierError::Timeout {
            operation,
            duration_ms,
            ..
        } => {
            assert_eq!(operation, "slow_test");
            assert_eq!(duration_ms, 50);
        }
        other => panic!("Expected Timeout error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rate_limiter_caps_concurrency() {
    let limiter = RateLimiter::new(2);
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let tasks = (0..8).map(|_| {
        let limiter = limiter.clone();
        let in_flight = Arc::clone(&in_flight);
        let peak = Arc::clone(&peak);
        tokio::spawn(async move {
            let _guard = limiter.acquire().await.unwrap();
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(10)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
        })
    });

    for task in futures::future::join_all(tasks).await {
        task.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(limiter.available_permits(), 2);
}

#[tokio::test]
async fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dossier.toml");

    let mut config = DossierConfig::default();
    config.research.max_steps = 3;
    config
        .coverage
        .keywords
        .insert("leadership".to_string(), vec!["ceo".to_string()]);
    config.save_to_file(&path).unwrap();

    let loaded = DossierConfig::from_file(&path).unwrap();
    assert_eq!(loaded.research.max_steps, 3);
    assert_eq!(loaded.coverage.keywords["leadership"], vec!["ceo"]);
    assert_eq!(loaded.fetch.max_text_chars, 60_000);
}

#[tokio::test]
async fn test_config_validation() {
    let mut config = DossierConfig::default();
    assert_ok!(config.validate());

    config.research.queries_per_step = 0;
    match config.validate().unwrap_err() {
        DossierError::Config { message, .. } => {
            assert!(message.contains("queries_per_step"));
        }
        other => panic!("Expected Config error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_config_file_is_config_error() {
    let result = DossierConfig::from_file("/definitely/not/here/dossier.toml");
    assert!(matches!(result, Err(DossierError::Config { .. })));
}

#[tokio::test]
async fn test_logging_initialization() {
    let config = LoggingConfig {
        level: "debug".to_string(),
        format: LogFormat::Compact,
        include_location: false,
        include_thread: false,
        log_file_path: None,
        enable_performance_monitoring: false,
        filter_directives: vec!["dossier_core=debug".to_string()],
    };

    // A subscriber may already be installed by another test in this process,
    // so only the first call is guaranteed to succeed.
    let _ = init_logging(&config);
}
