//! The conversation runtime: session initiation and the per-turn state
//! machine.
//!
//! A [`turn::TurnController`] owns one session end to end — it assigns
//! the durable identity, resolves the governing instruction text, drives
//! each user/assistant exchange through the model gateway, detects the
//! termination phrase, and persists every completed turn exactly once.

pub mod prompts;
pub mod session;
pub mod telemetry;
pub mod tokens;
pub mod turn;

pub use prompts::SystemMessageResolver;
pub use session::SessionParams;
pub use tokens::TokenEstimator;
pub use turn::{SessionPhase, TurnController, TERMINATION_TOKEN};
