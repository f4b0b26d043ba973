use sg_domain::error::Result;
use sg_domain::message::ChatMessage;
use sg_domain::stream::{BoxStream, StreamEvent};

/// One outbound transcript delivery: system message first, then the
/// full message history in chat order.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model identifier as the backend knows it.
    pub model: String,
    /// Use the reasoning-enabled request shape for this call.
    pub reasoning: bool,
    pub messages: Vec<ChatMessage>,
}

/// Trait every backend adapter must implement.
///
/// The returned stream yields text fragments whose concatenation is the
/// complete assistant reply, terminated by a `Done` event.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// A unique identifier for this backend instance.
    fn backend_id(&self) -> &str;
}
