//! Shared identifier types used across the msgstore crates.

mod lock_token;
mod transaction_id;

pub use lock_token::LockToken;
pub use transaction_id::TransactionId;
