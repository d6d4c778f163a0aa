//! Fire-and-forget telemetry events

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Events emitted by the conversation manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    ContextCondensed {
        conversation_id: String,
        is_automatic: bool,
        prev_context_tokens: usize,
        new_context_tokens: usize,
        cost: f64,
    },
    ContextTruncated {
        conversation_id: String,
        truncation_id: String,
        messages_removed: usize,
        prev_context_tokens: usize,
        new_context_tokens: usize,
    },
    CondensationFailed {
        conversation_id: String,
        is_automatic: bool,
        error: String,
    },
}

/// Destination for telemetry events
///
/// Emission is infallible from the caller's point of view; sinks log
/// and swallow their own failures.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// Sink that writes each event to the log as one JSON line
#[derive(Debug, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, event: TelemetryEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(target: "telemetry", %payload, "Telemetry event"),
            Err(error) => warn!("Failed to serialize telemetry event: {}", error),
        }
    }
}

/// Sink that drops every event
#[derive(Debug, Default)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn emit(&self, _event: TelemetryEvent) {}
}
