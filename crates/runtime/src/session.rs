//! Session initiation parameters.

use std::collections::HashMap;

/// Claim value meaning "no claim supplied" — the agent elicits one
/// interactively instead.
pub const NO_CLAIM_SENTINEL: &str = "na";

/// Parameters consumed once at session start, arriving as a
/// query-string-like map from the participant-facing surface.
#[derive(Debug, Clone)]
pub struct SessionParams {
    /// The shared access token presented by the participant.
    pub password: String,
    /// Pre-supplied belief statement, already stripped of the sentinel.
    pub claim: Option<String>,
    /// Pre-supplied confidence value; 0 means "none supplied".
    pub credence: Option<i64>,
    /// Pre-assigned session identifier; generated when absent.
    pub id: Option<String>,
    /// Lowercased language selector, defaulting to english.
    pub language: String,
}

impl SessionParams {
    /// Apply the initiation defaults: `claim` defaults to the sentinel
    /// (⇒ none), `credence` to 0 (⇒ none), `language` to english.
    pub fn from_query(query: &HashMap<String, String>) -> Self {
        let password = query.get("password").cloned().unwrap_or_default();

        let claim = query
            .get("claim")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case(NO_CLAIM_SENTINEL))
            .map(str::to_owned);

        let credence = query
            .get("credence")
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|c| *c != 0);

        let id = query.get("id").cloned().filter(|s| !s.is_empty());

        let language = query
            .get("language")
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "english".to_string());

        Self {
            password,
            claim,
            credence,
            id,
            language,
        }
    }
}
