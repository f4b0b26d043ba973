//! End-to-end session lifecycle: authorization at start, the canned
//! opening, full turns against a scripted backend, goodbye closure, and
//! failed-turn persistence semantics.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use sg_domain::config::{AccessConfig, BackendMode, Config};
use sg_domain::error::{Error, Result};
use sg_domain::message::{ChatMessage, Role};
use sg_domain::stream::{BoxStream, StreamEvent};
use sg_providers::{ChatBackend, ChatRequest, ModelGateway};
use sg_runtime::prompts::DEFAULT_OPENING;
use sg_runtime::{SessionParams, SessionPhase, TokenEstimator, TurnController};
use sg_sessions::{SessionDocument, SessionStore};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum Step {
    Fail(&'static str),
    Reply(&'static [&'static str]),
}

struct ScriptedBackend {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<u32>,
}

impl ScriptedBackend {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            calls: Mutex::new(0),
        })
    }

    fn call_count(&self) -> u32 {
        *self.calls.lock()
    }
}

#[async_trait::async_trait]
impl ChatBackend for ScriptedBackend {
    async fn chat_stream(
        &self,
        _req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        *self.calls.lock() += 1;

        let step = self
            .steps
            .lock()
            .pop_front()
            .unwrap_or(Step::Fail("script exhausted"));

        match step {
            Step::Fail(msg) => Err(Error::Http(msg.into())),
            Step::Reply(tokens) => {
                let mut events: Vec<Result<StreamEvent>> = tokens
                    .iter()
                    .map(|t| {
                        Ok(StreamEvent::Token {
                            text: (*t).to_string(),
                        })
                    })
                    .collect();
                events.push(Ok(StreamEvent::Done {
                    usage: None,
                    finish_reason: Some("stop".into()),
                }));
                Ok(Box::pin(futures_util::stream::iter(events)))
            }
        }
    }

    fn backend_id(&self) -> &str {
        "scripted"
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const TOKEN: &str = "letmein";

fn test_config() -> Config {
    let mut config = Config::default();
    config.access = AccessConfig {
        token: Some(TOKEN.into()),
        ..Default::default()
    };
    // Streaming on both models keeps the scripted call counts
    // one-request-per-attempt with no mode fallback in the way.
    config.llm.primary.mode = BackendMode::Streaming;
    config.llm.backup.mode = BackendMode::Streaming;
    config
}

fn params(password: &str) -> SessionParams {
    SessionParams {
        password: password.into(),
        claim: None,
        credence: None,
        id: None,
        language: "english".into(),
    }
}

struct Harness {
    _dir: TempDir,
    store: Arc<SessionStore>,
    backend: Arc<ScriptedBackend>,
    config: Config,
}

impl Harness {
    fn new(steps: Vec<Step>) -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SessionStore::open(dir.path()).unwrap());
        Self {
            _dir: dir,
            store,
            backend: ScriptedBackend::new(steps),
            config: test_config(),
        }
    }

    fn start(&self, params: SessionParams) -> sg_domain::error::Result<TurnController> {
        let gateway = Arc::new(ModelGateway::new(
            self.backend.clone(),
            self.config.llm.clone(),
        ));
        let estimator = Arc::new(TokenEstimator::new().unwrap());
        TurnController::start(
            self.store.clone(),
            gateway,
            estimator,
            &self.config,
            params,
        )
    }
}

fn sink() -> impl FnMut(&str) + Send {
    |_: &str| {}
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn wrong_password_creates_nothing() {
    let h = Harness::new(vec![]);
    let err = h.start(params("wrong")).err().unwrap();
    assert!(matches!(err, Error::Auth(_)));
    assert!(h.store.list().is_empty());
}

#[tokio::test]
async fn start_emits_opening_and_persists_document() {
    let h = Harness::new(vec![]);
    let ctrl = h.start(params(TOKEN)).unwrap();

    assert_eq!(ctrl.opening_message(), DEFAULT_OPENING);
    assert!(ctrl.is_active());

    let doc = h.store.get(ctrl.session_id()).unwrap();
    assert!(doc.active);
    assert_eq!(doc.messages.len(), 1);
    assert_eq!(doc.messages[0].role, Role::Assistant);
    assert_eq!(doc.messages[0].content, DEFAULT_OPENING);
    assert_eq!(doc.prompt_tokens, 0);
    assert_eq!(doc.completion_tokens, 0);
    assert!(doc.claim.is_none());
}

#[tokio::test]
async fn full_turn_persists_transcript_and_counters() {
    let h = Harness::new(vec![Step::Reply(&["Nice ", "to ", "meet ", "you."])]);
    let mut ctrl = h.start(params(TOKEN)).unwrap();

    let mut streamed = String::new();
    let reply = ctrl
        .handle_user_message("My name is Alice.", &mut |frag: &str| {
            streamed.push_str(frag)
        })
        .await
        .unwrap();

    assert_eq!(reply, "Nice to meet you.");
    assert_eq!(streamed, reply);
    assert!(ctrl.is_active());

    let doc = h.store.get(ctrl.session_id()).unwrap();
    assert_eq!(doc.messages.len(), 3);
    assert_eq!(doc.messages[1].role, Role::User);
    assert_eq!(doc.messages[1].content, "My name is Alice.");
    assert_eq!(doc.messages[2].role, Role::Assistant);
    assert_eq!(doc.messages[2].content, "Nice to meet you.");
    // Prompt estimate covers system message + transcript sent; the
    // fragment count stands in for completion tokens.
    assert!(doc.prompt_tokens > 0);
    assert_eq!(doc.completion_tokens, 4);
    assert!(doc.last_model.is_some());
    assert!(doc.error_messages.is_empty());
}

#[tokio::test]
async fn goodbye_in_reply_closes_the_session() {
    let h = Harness::new(vec![Step::Reply(&["Thank you. ", "Goodbye, Alice!"])]);
    let mut ctrl = h.start(params(TOKEN)).unwrap();

    ctrl.handle_user_message("I have to go now.", &mut sink())
        .await
        .unwrap();

    assert_eq!(ctrl.phase(), SessionPhase::Closed);
    assert!(!ctrl.is_active());
    let doc = h.store.get(ctrl.session_id()).unwrap();
    assert!(!doc.active);
}

#[tokio::test]
async fn closed_session_rejects_input_without_a_backend_call() {
    let h = Harness::new(vec![Step::Reply(&["goodbye"])]);
    let mut ctrl = h.start(params(TOKEN)).unwrap();
    ctrl.handle_user_message("bye", &mut sink()).await.unwrap();
    assert_eq!(h.backend.call_count(), 1);

    let err = ctrl
        .handle_user_message("wait, one more thing", &mut sink())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SessionClosed(_)));
    assert_eq!(h.backend.call_count(), 1);
}

#[tokio::test]
async fn empty_input_is_rejected_before_any_work() {
    let h = Harness::new(vec![]);
    let mut ctrl = h.start(params(TOKEN)).unwrap();

    assert!(ctrl.handle_user_message("   ", &mut sink()).await.is_err());
    assert_eq!(h.backend.call_count(), 0);
    assert_eq!(h.store.get(ctrl.session_id()).unwrap().messages.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_turn_persists_nothing_until_resubmission() {
    // Primary and backup each get max_attempts=2 tries: 4 failures
    // exhaust the turn, then a resubmission succeeds on the first try.
    let h = Harness::new(vec![
        Step::Fail("upstream 500"),
        Step::Fail("upstream 500"),
        Step::Fail("upstream 500"),
        Step::Fail("upstream 500"),
        Step::Reply(&["Welcome ", "back."]),
    ]);
    let mut ctrl = h.start(params(TOKEN)).unwrap();

    let err = ctrl
        .handle_user_message("hello?", &mut sink())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Backend { .. }));

    // Nothing from the failed half-turn reached the store.
    let doc = h.store.get(ctrl.session_id()).unwrap();
    assert_eq!(doc.messages.len(), 1);
    assert!(doc.error_messages.is_empty());

    // The stranded user message rides along with the next good turn,
    // and the buffered error log lands in the same write.
    let reply = ctrl
        .handle_user_message("hello again?", &mut sink())
        .await
        .unwrap();
    assert_eq!(reply, "Welcome back.");

    let doc = h.store.get(ctrl.session_id()).unwrap();
    assert_eq!(doc.messages.len(), 4);
    assert_eq!(doc.messages[1].content, "hello?");
    assert_eq!(doc.messages[2].content, "hello again?");
    assert_eq!(doc.messages[3].content, "Welcome back.");
    assert!(doc.error_messages.contains("upstream 500"));
    assert!(doc.error_messages.ends_with("; "));
}

fn seeded_document(session_id: &str, active: bool) -> SessionDocument {
    let now = chrono::Utc::now();
    SessionDocument {
        session_id: session_id.into(),
        app_name: "streetgpt".into(),
        created_at: now,
        updated_at: now,
        claim: None,
        credence: None,
        language: "english".into(),
        system_message: "Keep your answers brief.".into(),
        messages: vec![
            ChatMessage::assistant("hello"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("how can I help?"),
        ],
        active,
        prompt_tokens: 500,
        completion_tokens: 40,
        last_model: Some("primary-before".into()),
        error_messages: String::new(),
        password_used: TOKEN.into(),
    }
}

#[tokio::test]
async fn resuming_an_existing_session_adopts_the_stored_document() {
    let h = Harness::new(vec![Step::Reply(&["Still ", "here."])]);
    h.store
        .create_if_absent(seeded_document("resume-me", true))
        .unwrap();

    let mut p = params(TOKEN);
    p.id = Some("resume-me".into());
    let mut ctrl = h.start(p).unwrap();

    // The stored transcript carried over, not a fresh opening-only one.
    assert_eq!(ctrl.session().messages.len(), 3);
    assert_eq!(ctrl.session().prompt_tokens, 500);

    ctrl.handle_user_message("still there?", &mut sink())
        .await
        .unwrap();

    let doc = h.store.get("resume-me").unwrap();
    assert_eq!(doc.messages.len(), 5);
    assert_eq!(doc.messages[0].content, "hello");
    assert_eq!(doc.messages[3].content, "still there?");
    // Running totals keep growing from the stored values.
    assert!(doc.prompt_tokens > 500);
    assert_eq!(doc.completion_tokens, 42);
}

#[tokio::test]
async fn resuming_a_closed_session_stays_closed() {
    let h = Harness::new(vec![]);
    h.store
        .create_if_absent(seeded_document("closed-one", false))
        .unwrap();

    let mut p = params(TOKEN);
    p.id = Some("closed-one".into());
    let mut ctrl = h.start(p).unwrap();

    assert_eq!(ctrl.phase(), SessionPhase::Closed);
    let err = ctrl
        .handle_user_message("anyone?", &mut sink())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SessionClosed(_)));
    assert_eq!(h.backend.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_persist_keeps_the_buffered_error_log() {
    let h = Harness::new(vec![
        Step::Fail("upstream 500"),
        Step::Fail("upstream 500"),
        Step::Fail("upstream 500"),
        Step::Fail("upstream 500"),
        Step::Reply(&["ok"]),
        Step::Reply(&["done"]),
    ]);
    let mut ctrl = h.start(params(TOKEN)).unwrap();

    // Exhausted turn buffers its error log in memory.
    ctrl.handle_user_message("one", &mut sink())
        .await
        .unwrap_err();

    // Next turn succeeds at the gateway but the store write fails.
    std::fs::remove_dir_all(h._dir.path()).unwrap();
    assert!(ctrl.handle_user_message("two", &mut sink()).await.is_err());

    // Once writes land again, the buffered log reaches the document.
    std::fs::create_dir_all(h._dir.path()).unwrap();
    let reply = ctrl
        .handle_user_message("three", &mut sink())
        .await
        .unwrap();
    assert_eq!(reply, "done");

    let doc = h.store.get(ctrl.session_id()).unwrap();
    assert!(doc.error_messages.contains("upstream 500"));
    assert_eq!(doc.messages.len(), 6);
}

#[tokio::test]
async fn supplied_claim_and_id_flow_into_the_document() {
    let h = Harness::new(vec![]);
    let mut p = params(TOKEN);
    p.claim = Some("the earth is flat".into());
    p.credence = Some(70);
    p.id = Some("fixed-session-id".into());
    let ctrl = h.start(p).unwrap();

    assert_eq!(ctrl.session_id(), "fixed-session-id");
    let doc = h.store.get("fixed-session-id").unwrap();
    assert_eq!(doc.claim.as_deref(), Some("the earth is flat"));
    assert_eq!(doc.credence, Some(70));
    assert!(doc.system_message.contains("the earth is flat"));
    assert!(doc.system_message.contains("70"));
}
