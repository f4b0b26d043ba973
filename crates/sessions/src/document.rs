use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sg_domain::message::ChatMessage;

/// The unit of persistence: one conversation session.
///
/// `messages` is append-only in chat order. `active` flips to `false`
/// exactly once and never back. The token counters are running totals,
/// monotonically non-decreasing; `error_messages` concatenates, every
/// other diagnostic field carries latest-value semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDocument {
    pub session_id: String,
    pub app_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Pre-supplied belief statement; `None` means the agent elicits one.
    #[serde(default)]
    pub claim: Option<String>,
    /// Pre-supplied confidence scale value associated with `claim`.
    #[serde(default)]
    pub credence: Option<i64>,
    pub language: String,
    /// The fully resolved instruction text sent to the backend.
    pub system_message: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub active: bool,
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub last_model: Option<String>,
    #[serde(default)]
    pub error_messages: String,
    /// Access token presented at session start, recorded for audit.
    #[serde(default)]
    pub password_used: String,
}

/// Scalar updates applied together with one transcript append.
///
/// `error_messages` here is the delta to concatenate onto the stored
/// field, not a replacement.
#[derive(Debug, Clone)]
pub struct TurnUpdate {
    pub active: bool,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub last_model: Option<String>,
    pub error_messages: String,
    pub system_message: String,
    pub password_used: String,
}
