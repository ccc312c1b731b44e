//! Opaque lock token used to authorize item removal
//!
//! A token is stamped onto an item when the item joins a stream. Removal
//! presents the token back; a mismatch means the caller's view of the item
//! is stale (the item was already removed, or it never joined this stream).
//! The comparison is the only admission control on removal - there is no
//! lock object and nothing ever blocks on it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque per-item authorization stamp
///
/// Tokens are unique within a stream for the lifetime of the stream.
/// Callers never mint tokens themselves; they only carry one from
/// `Item::lock_token` to `Item::remove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockToken(u64);

impl LockToken {
    /// Construct from a raw stamp value (stream-internal use)
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw stamp value
    pub fn into_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lock-{:016x}", self.0)
    }
}
