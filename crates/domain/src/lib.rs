//! Shared types for the StreetGPT conversation core.
//!
//! Everything the other crates agree on lives here: the error taxonomy,
//! the configuration tree, chat messages, streaming events, and
//! structured trace events.

pub mod config;
pub mod error;
pub mod message;
pub mod stream;
pub mod trace;
