//! Transactional ordered item stream with non-locking cursors
//!
//! The persistence/ordering core behind a message-queue backing store: an
//! ordered collection of items mutated under transactional control and
//! traversed by cursors that never take possession of the entries they
//! pass over.
//!
//! - Items are ordered by `(priority desc, sequence asc)`; the order is
//!   the same for every observer.
//! - Adds and removes run under a [`Transaction`]: auto-commit (final per
//!   operation) or local (batched behind explicit commit/rollback).
//! - A [`NonLockingCursor`] remembers only a resumption key, so it stays
//!   valid across arbitrary interleavings of add/remove/commit/rollback
//!   and recovers when the stream empties and refills.
//! - Removal is authorized by an optimistic [`LockToken`] comparison; the
//!   first committed remove wins and nothing ever blocks.

pub mod config;
pub mod cursor;
pub mod error;
pub mod filter;
pub mod item;
pub mod order;
pub mod stream;
pub mod transaction;

pub use config::StreamConfig;
pub use cursor::NonLockingCursor;
pub use error::{Error, Result};
pub use filter::Filter;
pub use item::{Item, ItemId};
pub use msgstore_common::{LockToken, TransactionId};
pub use order::OrderKey;
pub use stream::{ItemStream, StreamStats};
pub use transaction::{Transaction, TransactionKind};
