//! Transcript size estimation.

use tiktoken_rs::{cl100k_base, CoreBPE};

use sg_domain::error::{Error, Result};
use sg_domain::message::ChatMessage;

/// Estimates the size, in model tokens, of an ordered message sequence.
///
/// The estimate concatenates all `content` fields in order, each
/// followed by a line separator, and counts tokens under the fixed
/// `cl100k_base` subword encoding. It ignores role markers and the
/// per-message framing overhead the real backend adds, so it is an
/// approximation — deterministic and monotonic, but never equal to
/// backend-reported usage.
pub struct TokenEstimator {
    bpe: CoreBPE,
}

impl TokenEstimator {
    /// Load the encoding. Done once per process; the estimator is cheap
    /// to share afterwards.
    pub fn new() -> Result<Self> {
        let bpe = cl100k_base()
            .map_err(|e| Error::Other(format!("loading cl100k_base encoding: {e}")))?;
        Ok(Self { bpe })
    }

    /// Token count of the concatenated contents. Empty input yields 0.
    pub fn estimate(&self, messages: &[ChatMessage]) -> u64 {
        if messages.is_empty() {
            return 0;
        }
        let mut text = String::new();
        for m in messages {
            text.push_str(&m.content);
            text.push('\n');
        }
        self.bpe.encode_with_special_tokens(&text).len() as u64
    }
}
