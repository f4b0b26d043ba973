//! Session identity and persistence for StreetGPT.
//!
//! One conversation session = one durable JSON document, keyed by an
//! opaque session ID assigned at first contact. The store guarantees
//! at-most-one logical creation per ID and atomic per-turn appends.

pub mod document;
pub mod identity;
pub mod store;

pub use document::{SessionDocument, TurnUpdate};
pub use identity::{new_session_id, SESSION_ID_LEN};
pub use store::SessionStore;
