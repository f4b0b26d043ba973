//! OpenAI-compatible backend adapter.
//!
//! Speaks the chat-completions wire format over SSE. Two request shapes
//! are supported: the conventional streaming call, and the
//! reasoning-enabled call that adds a low-effort reasoning control for
//! model families that accept it ([`ChatRequest::reasoning`]).

use serde_json::Value;

use sg_domain::config::LlmConfig;
use sg_domain::error::{Error, Result};
use sg_domain::message::ChatMessage;
use sg_domain::stream::{BoxStream, StreamEvent, Usage};

use crate::sse::response_stream;
use crate::traits::{ChatBackend, ChatRequest};
use crate::util::{api_key_from_env, from_reqwest};

/// Adapter for any endpoint following the OpenAI chat-completions
/// contract. Constructed once per process and shared across sessions;
/// connection pooling lives inside the `reqwest::Client`.
pub struct OpenAiCompatBackend {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatBackend {
    /// Build the adapter from the LLM config, resolving the API key from
    /// the configured environment variable.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = api_key_from_env(&cfg.api_key_env)?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn build_body(req: &ChatRequest) -> Value {
        let messages: Vec<Value> = req
            .messages
            .iter()
            .map(|m: &ChatMessage| {
                serde_json::json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": req.model,
            "messages": messages,
            "stream": true,
            "stream_options": {"include_usage": true},
        });
        if req.reasoning {
            body["reasoning_effort"] = Value::String("low".into());
        }
        body
    }
}

#[async_trait::async_trait]
impl ChatBackend for OpenAiCompatBackend {
    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::build_body(&req);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Backend {
                backend: "openai_compat".into(),
                message: format!("HTTP {status}: {detail}"),
            });
        }

        Ok(response_stream(response, parse_sse_data))
    }

    fn backend_id(&self) -> &str {
        "openai_compat"
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE payload parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_sse_data(data: &str) -> Option<Result<StreamEvent>> {
    if data.trim() == "[DONE]" {
        return None;
    }

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return Some(Err(Error::Json(e))),
    };

    // The final chunk under stream_options.include_usage has an empty
    // choices array and carries usage only.
    if let Some(usage) = v.get("usage").and_then(parse_usage) {
        return Some(Ok(StreamEvent::Done {
            usage: Some(usage),
            finish_reason: None,
        }));
    }

    let choice = v.get("choices").and_then(|c| c.as_array())?.first()?;
    let text = choice
        .get("delta")
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())?;
    if text.is_empty() {
        return None;
    }

    Some(Ok(StreamEvent::Token {
        text: text.to_string(),
    }))
}

fn parse_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
