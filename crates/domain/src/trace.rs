use serde::Serialize;

/// Structured trace events emitted across all StreetGPT crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionCreated {
        session_id: String,
        language: String,
        has_claim: bool,
        is_new: bool,
    },
    LlmRequest {
        model: String,
        mode: String,
        attempt: u32,
        duration_ms: u64,
        fragments: u64,
    },
    LlmAttemptFailed {
        model: String,
        attempt: u32,
        reason: String,
    },
    /// Reasoning-enabled request failed; same attempt retried in
    /// conventional streaming mode.
    ModeFallback {
        model: String,
        reason: String,
    },
    /// Primary model exhausted its retry budget; switching to the backup.
    ModelFallback {
        from_model: String,
        to_model: String,
        reason: String,
    },
    TurnPersisted {
        session_id: String,
        new_messages: usize,
        prompt_tokens: u64,
        completion_tokens: u64,
    },
    TurnFailed {
        session_id: String,
        reason: String,
    },
    SessionClosed {
        session_id: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sg_event");
    }
}
