use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for backend streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events emitted while a backend reply streams in.
///
/// The consumption contract: the concatenation of all `Token` fragments
/// equals the final reply text. Fragment boundaries carry no meaning —
/// callers may render fragments as they arrive but must not split on them.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A text fragment.
    #[serde(rename = "token")]
    Token { text: String },

    /// Stream is finished.
    #[serde(rename = "done")]
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },

    /// An error occurred mid-stream.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Token usage as reported by the backend, when it reports one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
