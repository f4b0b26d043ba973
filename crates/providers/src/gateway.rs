//! Model gateway: bounded retry and backup-model fallback around a
//! [`ChatBackend`].
//!
//! Policy, applied uniformly regardless of failure cause:
//!
//! 1. Up to `max_attempts` (default 2) attempts against the primary
//!    model, with randomized exponential backoff between attempts,
//!    clamped to the configured 2–5 s window.
//! 2. Within one attempt on a reasoning-capable model, the
//!    reasoning-enabled request shape is tried first; any failure falls
//!    back to the conventional streaming shape inside the same attempt.
//!    Which shape succeeded is visible only in the diagnostic error log.
//! 3. After the primary exhausts its budget, the backup model gets the
//!    same bounded-retry treatment once. Both exhausted ⇒ the failure is
//!    fatal for this turn.
//!
//! Every caught failure is recorded on [`TurnEffects::errors`] before
//! retry, fallback, or propagation, so post-hoc audit survives a
//! user-invisible recovery.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use rand::Rng;

use sg_domain::config::{BackendMode, LlmConfig, ModelConfig};
use sg_domain::error::{Error, Result};
use sg_domain::message::ChatMessage;
use sg_domain::stream::StreamEvent;
use sg_domain::trace::TraceEvent;

use crate::traits::{ChatBackend, ChatRequest};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn effects
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Session-scoped accounting accumulated across one gateway call.
#[derive(Debug, Default)]
pub struct TurnEffects {
    /// Streamed fragments received, across all attempts. A proxy for
    /// completion tokens — not an exact count, and it includes fragments
    /// from attempts that later failed mid-stream.
    pub fragments: u64,
    /// The model that produced the final reply.
    pub last_model: Option<String>,
    /// Textual descriptions of every caught failure, in order.
    pub errors: Vec<String>,
}

impl TurnEffects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(error = %message, "gateway failure recorded");
        self.errors.push(message);
    }

    /// The error log delta for this call, formatted for the session
    /// document's concatenating `error_messages` field.
    pub fn error_log(&self) -> String {
        if self.errors.is_empty() {
            String::new()
        } else {
            let mut log = self.errors.join("; ");
            log.push_str("; ");
            log
        }
    }
}

/// Outcome of one attempt against one model. Retry logic is a match on
/// this value, never exception-style control flow.
enum Attempt {
    Complete(String),
    Recoverable(String),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Gateway
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Delivers a transcript to the backend and returns the full assistant
/// reply, streaming fragments to a caller-supplied sink as they arrive.
pub struct ModelGateway {
    backend: Arc<dyn ChatBackend>,
    llm: LlmConfig,
}

impl ModelGateway {
    pub fn new(backend: Arc<dyn ChatBackend>, llm: LlmConfig) -> Self {
        Self { backend, llm }
    }

    /// Run one complete gateway call for the given outbound transcript.
    ///
    /// `sink` receives fragments as they arrive; after a mid-stream
    /// failure and retry it receives the retried reply from the start, so
    /// renderers must treat the sink as replace-from-scratch per attempt.
    /// On success the returned string equals the concatenation of the
    /// successful attempt's fragments.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        effects: &mut TurnEffects,
        sink: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String> {
        let mut candidates = vec![&self.llm.primary];
        if self.llm.backup.name != self.llm.primary.name {
            candidates.push(&self.llm.backup);
        }

        for (idx, model) in candidates.iter().enumerate() {
            if idx > 0 {
                TraceEvent::ModelFallback {
                    from_model: self.llm.primary.name.clone(),
                    to_model: model.name.clone(),
                    reason: "primary model exhausted its retry budget".into(),
                }
                .emit();
            }

            if let Some(text) = self.run_model(model, messages, effects, sink).await {
                effects.last_model = Some(model.name.clone());
                return Ok(text);
            }
        }

        Err(Error::Backend {
            backend: self.backend.backend_id().to_string(),
            message: "all models exhausted their retry budgets".into(),
        })
    }

    /// Bounded-retry cycle for one model. `None` means the budget is
    /// exhausted.
    async fn run_model(
        &self,
        model: &ModelConfig,
        messages: &[ChatMessage],
        effects: &mut TurnEffects,
        sink: &mut (dyn FnMut(&str) + Send),
    ) -> Option<String> {
        for attempt in 1..=self.llm.max_attempts.max(1) {
            if attempt > 1 {
                tokio::time::sleep(backoff_delay(
                    attempt,
                    self.llm.backoff_min_secs,
                    self.llm.backoff_max_secs,
                ))
                .await;
            }

            let started = Instant::now();
            match self.attempt_once(model, messages, effects, sink).await {
                Attempt::Complete(text) => {
                    TraceEvent::LlmRequest {
                        model: model.name.clone(),
                        mode: format!("{:?}", model.mode).to_lowercase(),
                        attempt,
                        duration_ms: started.elapsed().as_millis() as u64,
                        fragments: effects.fragments,
                    }
                    .emit();
                    return Some(text);
                }
                Attempt::Recoverable(reason) => {
                    TraceEvent::LlmAttemptFailed {
                        model: model.name.clone(),
                        attempt,
                        reason: reason.clone(),
                    }
                    .emit();
                    effects.record_error(format!(
                        "{} attempt {}/{}: {}",
                        model.name, attempt, self.llm.max_attempts, reason
                    ));
                }
            }
        }
        None
    }

    /// One attempt: reasoning-enabled shape first when the model
    /// supports it, conventional streaming otherwise or as the in-attempt
    /// fallback.
    async fn attempt_once(
        &self,
        model: &ModelConfig,
        messages: &[ChatMessage],
        effects: &mut TurnEffects,
        sink: &mut (dyn FnMut(&str) + Send),
    ) -> Attempt {
        if model.mode == BackendMode::Reasoning {
            match self.drain_stream(model, true, messages, effects, sink).await {
                Ok(text) => return Attempt::Complete(text),
                Err(e) => {
                    TraceEvent::ModeFallback {
                        model: model.name.clone(),
                        reason: e.to_string(),
                    }
                    .emit();
                    effects.record_error(format!("{} reasoning mode: {}", model.name, e));
                }
            }
        }

        match self.drain_stream(model, false, messages, effects, sink).await {
            Ok(text) => Attempt::Complete(text),
            Err(e) => Attempt::Recoverable(e.to_string()),
        }
    }

    /// Send one request and drain its stream into a full reply.
    async fn drain_stream(
        &self,
        model: &ModelConfig,
        reasoning: bool,
        messages: &[ChatMessage],
        effects: &mut TurnEffects,
        sink: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String> {
        let req = ChatRequest {
            model: model.name.clone(),
            reasoning,
            messages: messages.to_vec(),
        };

        let mut stream = self.backend.chat_stream(req).await?;
        let mut full = String::new();

        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::Token { text } => {
                    effects.fragments += 1;
                    sink(&text);
                    full.push_str(&text);
                }
                StreamEvent::Done { .. } => break,
                StreamEvent::Error { message } => {
                    return Err(Error::Backend {
                        backend: self.backend.backend_id().to_string(),
                        message,
                    });
                }
            }
        }

        Ok(full)
    }
}

/// Randomized exponential backoff: the window doubles per attempt but is
/// clamped to `[min_secs, max_secs]`, and the actual delay is drawn
/// uniformly from `[min_secs, window]`.
fn backoff_delay(attempt: u32, min_secs: u64, max_secs: u64) -> Duration {
    let min_ms = min_secs.saturating_mul(1000);
    let window_ms = min_ms
        .saturating_mul(1u64 << attempt.saturating_sub(2).min(16))
        .min(max_secs.saturating_mul(1000))
        .max(min_ms);
    let ms = rand::thread_rng().gen_range(min_ms..=window_ms);
    Duration::from_millis(ms)
}
