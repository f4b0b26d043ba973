//! Session identifier generation.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of a generated session identifier.
pub const SESSION_ID_LEN: usize = 16;

/// Produce a fresh opaque session identifier: a fixed-length string
/// drawn from the alphanumeric alphabet.
///
/// Each call is independent; at 16 characters over 62 symbols the
/// collision probability is negligible for the expected session volume
/// (tens of thousands). No persistence side effect — uniqueness is
/// ultimately enforced by the store.
pub fn new_session_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}
