use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub access: AccessConfig,
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults
    /// for missing keys.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from file if it exists, otherwise return defaults.
    pub fn load_or_default(path: &str) -> Self {
        Self::load(path).unwrap_or_default()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible endpoint.
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Env var holding the API key.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    /// Model queried first for every turn.
    #[serde(default = "d_primary")]
    pub primary: ModelConfig,
    /// Model substituted after the primary exhausts its retry budget.
    #[serde(default = "d_backup")]
    pub backup: ModelConfig,
    /// Attempts per model before giving up on it.
    #[serde(default = "d_2")]
    pub max_attempts: u32,
    /// Randomized backoff window between attempts, in seconds.
    #[serde(default = "d_2u64")]
    pub backoff_min_secs: u64,
    #[serde(default = "d_5u64")]
    pub backoff_max_secs: u64,
    /// Per-request HTTP timeout.
    #[serde(default = "d_120u64")]
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            api_key_env: d_api_key_env(),
            primary: d_primary(),
            backup: d_backup(),
            max_attempts: d_2(),
            backoff_min_secs: d_2u64(),
            backoff_max_secs: d_5u64(),
            request_timeout_secs: d_120u64(),
        }
    }
}

/// One selectable model plus its calling convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    /// Which request shape the backend expects for this model. Resolved
    /// once at configuration time — request-building code only ever
    /// branches on this tag, never on the model name.
    #[serde(default)]
    pub mode: BackendMode,
}

/// Calling convention for a model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    /// Reasoning-enabled request (adds a low-effort reasoning control).
    Reasoning,
    /// Conventional streaming chat completion.
    #[default]
    Streaming,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Prompt templates
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The two-level instruction table: has-claim vs no-claim on the
/// outside, language on the inside. Values are opaque template strings
/// supplied by configuration; the with-claim templates may reference
/// `{claim}` and `{credence}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PromptsConfig {
    #[serde(default)]
    pub with_claim: HashMap<String, String>,
    #[serde(default)]
    pub without_claim: HashMap<String, String>,
    /// Localized canned greetings emitted as the first assistant turn.
    #[serde(default)]
    pub openings: HashMap<String, String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one JSON document per session.
    #[serde(default = "d_state_dir")]
    pub state_dir: String,
    /// Provenance tag written into every session document.
    #[serde(default = "d_app_name")]
    pub app_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_dir: d_state_dir(),
            app_name: d_app_name(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Access token
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The single shared access token participants must present at session
/// start. A token set directly in config wins over the env var.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "d_token_env")]
    pub token_env: String,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            token: None,
            token_env: d_token_env(),
        }
    }
}

impl AccessConfig {
    /// Resolve the expected access token.
    pub fn resolve(&self) -> Result<String> {
        if let Some(ref token) = self.token {
            return Ok(token.clone());
        }
        std::env::var(&self.token_env).map_err(|_| {
            Error::Auth(format!(
                "environment variable '{}' not set or not valid UTF-8",
                self.token_env
            ))
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// serde default helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn d_primary() -> ModelConfig {
    ModelConfig {
        name: "gpt-5".into(),
        mode: BackendMode::Reasoning,
    }
}
fn d_backup() -> ModelConfig {
    ModelConfig {
        name: "gpt-4o".into(),
        mode: BackendMode::Streaming,
    }
}
fn d_2() -> u32 {
    2
}
fn d_2u64() -> u64 {
    2
}
fn d_5u64() -> u64 {
    5
}
fn d_120u64() -> u64 {
    120
}
fn d_state_dir() -> String {
    "./state/sessions".into()
}
fn d_app_name() -> String {
    "streetgpt".into()
}
fn d_token_env() -> String {
    "SG_ACCESS_TOKEN".into()
}
