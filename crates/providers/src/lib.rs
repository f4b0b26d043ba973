//! Language-model backend access for StreetGPT.
//!
//! [`traits::ChatBackend`] is the seam: one adapter speaks the
//! OpenAI-compatible wire format, and [`gateway::ModelGateway`] wraps any
//! backend in the bounded-retry / backup-model policy the turn
//! controller relies on.

pub mod gateway;
pub mod openai_compat;
pub mod traits;
pub(crate) mod sse;
pub(crate) mod util;

// Re-exports for convenience.
pub use gateway::{ModelGateway, TurnEffects};
pub use openai_compat::OpenAiCompatBackend;
pub use traits::{ChatBackend, ChatRequest};
