//! The per-session state machine.
//!
//! One [`TurnController`] per session, driven by one external event:
//! "participant submitted non-empty text". The controller owns the
//! session document as an explicit value — every step reads and mutates
//! the same struct under single-writer discipline, and `&mut self` on
//! the turn entry point makes turns strictly ordered by construction:
//! turn N's persistence has completed (or failed) before turn N+1 can
//! start.

use std::sync::Arc;

use chrono::Utc;

use sg_domain::config::Config;
use sg_domain::error::{Error, Result};
use sg_domain::message::ChatMessage;
use sg_domain::trace::TraceEvent;
use sg_providers::{ModelGateway, TurnEffects};
use sg_sessions::{new_session_id, SessionDocument, SessionStore, TurnUpdate};

use crate::prompts::SystemMessageResolver;
use crate::session::SessionParams;
use crate::tokens::TokenEstimator;

/// The literal word whose presence in an assistant reply ends the
/// session. Matched case-insensitively as a substring of generated
/// prose — a deliberate protocol choice carried over from the study
/// design: the agent itself signals closing in natural language. Known
/// to be fragile (an incidental "goodbye" closes early; a differently
/// phrased farewell does not close at all) and preserved exactly as-is.
pub const TERMINATION_TOKEN: &str = "goodbye";

/// Where a session is in its lifecycle. `Closed` is irreversible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Active,
    Closed,
}

/// Drives one conversation session from first contact to goodbye.
pub struct TurnController {
    store: Arc<SessionStore>,
    gateway: Arc<ModelGateway>,
    estimator: Arc<TokenEstimator>,
    session: SessionDocument,
    phase: SessionPhase,
    /// Messages up to this index are durably stored. A failed turn
    /// leaves its user message above the watermark; the next successful
    /// turn persists it along with its own messages.
    persisted_len: usize,
    /// Error log not yet written to the store.
    pending_errors: String,
}

impl TurnController {
    /// First contact: authorize, assign identity, resolve the system
    /// message, emit the canned opening greeting (no backend call), and
    /// durably create the session document.
    ///
    /// A wrong access token refuses the session before any state is
    /// created anywhere. A failed creation write is fatal for session
    /// start.
    pub fn start(
        store: Arc<SessionStore>,
        gateway: Arc<ModelGateway>,
        estimator: Arc<TokenEstimator>,
        config: &Config,
        params: SessionParams,
    ) -> Result<Self> {
        let expected = config.access.resolve()?;
        if params.password != expected {
            return Err(Error::Auth("invalid access token".into()));
        }

        let resolver = SystemMessageResolver::new(config.prompts.clone());
        let system_message = resolver.resolve(
            params.claim.as_deref(),
            params.credence.unwrap_or(0),
            &params.language,
        );
        let opening = resolver.opening_message(&params.language);

        let session_id = params.id.clone().unwrap_or_else(new_session_id);
        let now = Utc::now();
        let session = SessionDocument {
            session_id,
            app_name: config.store.app_name.clone(),
            created_at: now,
            updated_at: now,
            claim: params.claim,
            credence: params.credence,
            language: params.language,
            system_message,
            messages: vec![ChatMessage::assistant(opening)],
            active: true,
            prompt_tokens: 0,
            completion_tokens: 0,
            last_model: None,
            error_messages: String::new(),
            password_used: params.password,
        };

        // A pre-assigned id may name a session that already exists; the
        // stored document wins then — its transcript and running
        // counters carry on, never the fresh zeroed ones.
        let session = if store.create_if_absent(session.clone())? {
            session
        } else {
            store
                .get(&session.session_id)
                .ok_or_else(|| Error::Store(format!("unknown session: {}", session.session_id)))?
        };

        let phase = if session.active {
            SessionPhase::Active
        } else {
            SessionPhase::Closed
        };
        let persisted_len = session.messages.len();

        Ok(Self {
            store,
            gateway,
            estimator,
            session,
            phase,
            persisted_len,
            pending_errors: String::new(),
        })
    }

    /// One complete turn, re-entrant once per user submission.
    ///
    /// Streams the assistant reply's fragments to `sink` as they arrive
    /// and returns the full reply. On gateway exhaustion the user
    /// message stays on the in-memory transcript, nothing is persisted
    /// for the half-turn, and the error surfaces to the caller — the
    /// participant may resubmit; the controller never resubmits itself.
    pub async fn handle_user_message(
        &mut self,
        text: &str,
        sink: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String> {
        if self.phase == SessionPhase::Closed {
            return Err(Error::SessionClosed(self.session.session_id.clone()));
        }
        if text.trim().is_empty() {
            return Err(Error::Other("empty user message".into()));
        }

        self.session.messages.push(ChatMessage::user(text));

        // System message first, then the full history in chat order.
        let mut outbound = Vec::with_capacity(self.session.messages.len() + 1);
        outbound.push(ChatMessage::system(self.session.system_message.clone()));
        outbound.extend(self.session.messages.iter().cloned());

        let mut effects = TurnEffects::new();
        let reply = match self.gateway.complete(&outbound, &mut effects, sink).await {
            Ok(reply) => reply,
            Err(e) => {
                // Keep the audit trail in memory for the next
                // successful persistence; the turn itself is aborted.
                self.pending_errors.push_str(&effects.error_log());
                TraceEvent::TurnFailed {
                    session_id: self.session.session_id.clone(),
                    reason: e.to_string(),
                }
                .emit();
                return Err(e);
            }
        };

        self.session.messages.push(ChatMessage::assistant(&reply));

        // The prompt estimate covers the transcript actually sent —
        // the tokens consumed to produce this reply, not the reply.
        self.session.prompt_tokens += self.estimator.estimate(&outbound);
        self.session.completion_tokens += effects.fragments;
        self.session.last_model = effects.last_model.clone();

        // The agent signals closing inside its own generated prose.
        if reply.to_lowercase().contains(TERMINATION_TOKEN) {
            self.session.active = false;
            self.phase = SessionPhase::Closed;
            TraceEvent::SessionClosed {
                session_id: self.session.session_id.clone(),
            }
            .emit();
        }

        self.persist_turn(effects)?;
        Ok(reply)
    }

    /// Persist everything above the watermark plus this turn's scalar
    /// updates, as one atomic store write.
    fn persist_turn(&mut self, effects: TurnEffects) -> Result<()> {
        let mut error_delta = std::mem::take(&mut self.pending_errors);
        error_delta.push_str(&effects.error_log());

        let new_messages = &self.session.messages[self.persisted_len..];
        let update = TurnUpdate {
            active: self.session.active,
            prompt_tokens: self.session.prompt_tokens,
            completion_tokens: self.session.completion_tokens,
            last_model: self.session.last_model.clone(),
            error_messages: error_delta.clone(),
            system_message: self.session.system_message.clone(),
            password_used: self.session.password_used.clone(),
        };

        if let Err(e) = self
            .store
            .append_turns(&self.session.session_id, new_messages, update)
        {
            // The delta stays buffered for the next write that lands.
            self.pending_errors = error_delta;
            return Err(e);
        }

        // Re-sync the working copy so timestamps and the concatenated
        // error log match what was durably written.
        if let Some(stored) = self.store.get(&self.session.session_id) {
            self.session = stored;
        }
        self.persisted_len = self.session.messages.len();
        Ok(())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Accessors
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    pub fn session(&self) -> &SessionDocument {
        &self.session
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    /// The greeting shown before the first user submission.
    pub fn opening_message(&self) -> &str {
        self.session
            .messages
            .first()
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}
