//! Durable session store.
//!
//! One JSON document per session under the configured state directory,
//! fronted by an in-memory write-through cache. Creation is idempotent
//! (`create_if_absent`); per-turn writes replace the whole document via
//! temp file + atomic rename, so a crash can never leave the transcript
//! and the counters inconsistent with each other for that write.
//!
//! Documents for distinct sessions are fully independent — concurrent
//! writers across different session IDs never interfere.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;

use sg_domain::error::{Error, Result};
use sg_domain::message::ChatMessage;
use sg_domain::trace::TraceEvent;

use crate::document::{SessionDocument, TurnUpdate};

/// Document store keyed by session ID.
pub struct SessionStore {
    dir: PathBuf,
    docs: RwLock<HashMap<String, SessionDocument>>,
}

impl SessionStore {
    /// Open the store at `dir`, creating the directory if needed and
    /// loading any existing session documents into the cache.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(Error::Io)?;

        let mut docs = HashMap::new();
        for entry in std::fs::read_dir(dir).map_err(Error::Io)? {
            let path = entry.map_err(Error::Io)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_doc(&path) {
                Ok(doc) => {
                    docs.insert(doc.session_id.clone(), doc);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "skipping unreadable session document"
                    );
                }
            }
        }

        tracing::info!(
            sessions = docs.len(),
            path = %dir.display(),
            "session store opened"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            docs: RwLock::new(docs),
        })
    }

    /// Upsert-on-create keyed on `session_id`.
    ///
    /// If a document with this ID already exists the call is a silent
    /// no-op — existing fields are never overwritten — and `false` is
    /// returned. Two racing creations for the same ID resolve to exactly
    /// one stored document.
    pub fn create_if_absent(&self, doc: SessionDocument) -> Result<bool> {
        // Fast path: already known.
        {
            let docs = self.docs.read();
            if docs.contains_key(&doc.session_id) {
                return Ok(false);
            }
        }

        let mut docs = self.docs.write();
        // Re-check under the write lock: another creator may have won.
        if docs.contains_key(&doc.session_id) {
            return Ok(false);
        }
        // A document on disk that never made it into the cache also
        // counts as existing.
        let path = self.doc_path(&doc.session_id);
        if path.exists() {
            if let Ok(existing) = load_doc(&path) {
                docs.insert(existing.session_id.clone(), existing);
            }
            return Ok(false);
        }

        self.write_doc(&path, &doc)?;

        TraceEvent::SessionCreated {
            session_id: doc.session_id.clone(),
            language: doc.language.clone(),
            has_claim: doc.claim.is_some(),
            is_new: true,
        }
        .emit();

        docs.insert(doc.session_id.clone(), doc);
        Ok(true)
    }

    /// Append `new_messages` to the session's transcript and apply the
    /// scalar updates from the same turn, as one atomic write.
    ///
    /// Order-preserving, no truncation; `error_messages` concatenates
    /// onto the stored value, every other scalar takes the caller's
    /// latest value. The cache is only updated after the disk write
    /// succeeds.
    pub fn append_turns(
        &self,
        session_id: &str,
        new_messages: &[ChatMessage],
        update: TurnUpdate,
    ) -> Result<()> {
        let mut docs = self.docs.write();
        let doc = docs
            .get_mut(session_id)
            .ok_or_else(|| Error::Store(format!("unknown session: {session_id}")))?;

        let mut updated = doc.clone();
        updated.messages.extend(new_messages.iter().cloned());
        updated.updated_at = Utc::now();
        updated.active = update.active;
        updated.prompt_tokens = update.prompt_tokens;
        updated.completion_tokens = update.completion_tokens;
        updated.last_model = update.last_model;
        updated.error_messages.push_str(&update.error_messages);
        updated.system_message = update.system_message;
        updated.password_used = update.password_used;

        self.write_doc(&self.doc_path(session_id), &updated)?;

        TraceEvent::TurnPersisted {
            session_id: session_id.to_owned(),
            new_messages: new_messages.len(),
            prompt_tokens: updated.prompt_tokens,
            completion_tokens: updated.completion_tokens,
        }
        .emit();

        *doc = updated;
        Ok(())
    }

    /// Look up a session document.
    pub fn get(&self, session_id: &str) -> Option<SessionDocument> {
        self.docs.read().get(session_id).cloned()
    }

    /// All stored session IDs.
    pub fn list(&self) -> Vec<String> {
        self.docs.read().keys().cloned().collect()
    }

    // ── Private helpers ───────────────────────────────────────────────

    fn doc_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    /// Write a document durably: temp file in the same directory, fsync,
    /// then atomic rename over the target path.
    fn write_doc(&self, path: &Path, doc: &SessionDocument) -> Result<()> {
        let json = serde_json::to_string_pretty(doc)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(Error::Io)?;
        tmp.write_all(json.as_bytes()).map_err(Error::Io)?;
        tmp.as_file().sync_all().map_err(Error::Io)?;
        tmp.persist(path)
            .map_err(|e| Error::Store(format!("persisting {}: {}", path.display(), e)))?;
        Ok(())
    }
}

fn load_doc(path: &Path) -> Result<SessionDocument> {
    let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
    Ok(serde_json::from_str(&raw)?)
}
