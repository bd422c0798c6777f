//! Progress channel
//!
//! A fire-and-forget sink for structured status events. Emitting never blocks and never
//! fails the operation that emits; delivery is at-most-once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Stage identifiers carried by [`ProgressEvent::stage`]
pub mod stages {
    pub const SEEDING_START: &str = "seeding_start";
    pub const SEARCH_START: &str = "search_start";
    pub const SEARCH_RESULT: &str = "search_result";
    pub const SEARCH_FAILED: &str = "search_failed";
    pub const EXTRACT_START: &str = "extract_start";
    pub const EXTRACT_SUCCESS: &str = "extract_success";
    pub const EXTRACT_FAILED: &str = "extract_failed";
    pub const STEP_COVERAGE: &str = "step_coverage";
    pub const PLANNING_FAILED: &str = "planning_failed";
    pub const TERMINATED: &str = "terminated";

    pub const ENRICHMENT_START: &str = "enrichment_start";
    pub const CATEGORY_START: &str = "category_start";
    pub const BATCH_START: &str = "batch_start";
    pub const EXTRACTING: &str = "extracting";
    pub const EXTRACTED: &str = "extracted";
    pub const EXTRACTION_ERROR: &str = "extraction_error";
    pub const CATEGORY_COMPLETE: &str = "category_complete";
    pub const ENRICHMENT_COMPLETE: &str = "enrichment_complete";
}

/// One structured status event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub run_id: String,
    pub stage: String,
    pub message: String,
    pub payload: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// Destination for progress events
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Broadcast hub shared by every run; consumers filter by run id
#[derive(Debug, Clone)]
pub struct ProgressHub {
    sender: broadcast::Sender<ProgressEvent>,
}

impl ProgressHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to the events of a single run
    pub fn subscribe_run(&self, run_id: impl Into<String>) -> RunSubscription {
        RunSubscription {
            run_id: run_id.into(),
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ProgressSink for ProgressHub {
    fn emit(&self, event: ProgressEvent) {
        // No subscribers is not an error for the emitter.
        let _ = self.sender.send(event);
    }
}

/// Receiver filtered to one run id
pub struct RunSubscription {
    run_id: String,
    receiver: broadcast::Receiver<ProgressEvent>,
}

impl RunSubscription {
    /// Next event for this run; `None` once the hub is dropped.
    /// Lagged events are skipped.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.run_id == self.run_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, run_id = %self.run_id, "Progress subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Run-scoped handle used by the loop, extractor and batcher to emit events
#[derive(Clone)]
pub struct ProgressReporter {
    run_id: String,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressReporter {
    pub fn new(run_id: impl Into<String>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            run_id: run_id.into(),
            sink,
        }
    }

    /// Reporter that discards events
    pub fn disabled() -> Self {
        Self::new("", Arc::new(NoopProgress))
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Emit an event. Non-object payloads are wrapped under `"value"`.
    pub fn emit(&self, stage: &str, message: impl Into<String>, payload: Value) {
        let payload = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };

        self.sink.emit(ProgressEvent {
            run_id: self.run_id.clone(),
            stage: stage.to_string(),
            message: message.into(),
            payload,
            timestamp: Utc::now(),
        });
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("run_id", &self.run_id)
            .finish()
    }
}
