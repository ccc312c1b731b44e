//! The ordered item stream
//!
//! The stream owns every entry (committed-visible plus tentative adds under
//! open transactions) and is the only assigner of sequence numbers and lock
//! tokens. All structural mutation goes through a single `RwLock`; cursors
//! take the read side only, so traversal never blocks a concurrent writer
//! for longer than the map operation itself.
//!
//! Visibility rule: an entry is committed-visible iff its add has committed
//! and no remove of it has committed. A tentative (uncommitted) remove does
//! not hide an entry - only committed state is authoritative for what a
//! cursor returns.

use crate::config::StreamConfig;
use crate::cursor::NonLockingCursor;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::item::{Binding, Item, ItemId};
use crate::order::OrderKey;
use crate::transaction::{Effect, Transaction};
use msgstore_common::{LockToken, TransactionId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Visibility state of an entry in the stream index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryState {
    /// Add has committed; visible to cursors
    Available,
    /// Added under an open local transaction; hidden until that commits
    Adding(TransactionId),
}

/// One slot in the stream index
pub(crate) struct Entry {
    pub(crate) item: Item,
    pub(crate) token: LockToken,
    pub(crate) state: EntryState,
}

impl Entry {
    pub(crate) fn is_visible(&self) -> bool {
        self.state == EntryState::Available
    }
}

pub(crate) struct StreamState {
    /// Ordered index; the `OrderKey` ordering is the one global order
    pub(crate) entries: BTreeMap<OrderKey, Entry>,
    /// Identity lookup for removal and transaction resolution
    pub(crate) ids: HashMap<ItemId, OrderKey>,
    next_item_id: u64,
    next_sequence: u64,
    next_token: u64,
    /// Bumped by `empty()`; outstanding cursors check it and fail
    pub(crate) epoch: u64,
    pub(crate) open: bool,
    visible: usize,
    total_added: u64,
    total_removed: u64,
}

impl StreamState {
    fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            ids: HashMap::new(),
            next_item_id: 1,
            next_sequence: 1,
            next_token: 1,
            epoch: 0,
            open: true,
            visible: 0,
            total_added: 0,
            total_removed: 0,
        }
    }

    /// Apply one committed effect. Called with the state write lock held
    /// for the whole transaction, so multi-effect commits appear atomic.
    pub(crate) fn apply_committed(&mut self, txn_id: TransactionId, effect: &Effect) {
        match effect {
            Effect::Add { id, .. } => {
                if let Some(key) = self.ids.get(id).copied()
                    && let Some(entry) = self.entries.get_mut(&key)
                    && !entry.is_visible()
                {
                    entry.state = EntryState::Available;
                    self.visible += 1;
                    self.total_added += 1;
                    tracing::trace!(txn = %txn_id, item = %id, "tentative add committed");
                }
            }
            Effect::Remove { id, token, .. } => {
                let Some(key) = self.ids.get(id).copied() else {
                    // A competing remove committed first; first committed
                    // remove wins and this effect is dropped.
                    tracing::debug!(txn = %txn_id, item = %id, "remove effect dropped, item already gone");
                    return;
                };
                let matches = self
                    .entries
                    .get(&key)
                    .is_some_and(|entry| entry.token == *token);
                if !matches {
                    tracing::warn!(txn = %txn_id, item = %id, "remove effect dropped, token mismatch");
                    return;
                }
                self.delete(key, *id);
                tracing::trace!(txn = %txn_id, item = %id, "tentative remove committed");
            }
        }
    }

    /// Undo one tentative add. Remove effects have nothing to undo.
    pub(crate) fn discard_tentative_add(&mut self, txn_id: TransactionId, id: ItemId) {
        let Some(key) = self.ids.get(&id).copied() else {
            return;
        };
        let tentative = self
            .entries
            .get(&key)
            .is_some_and(|entry| !entry.is_visible());
        if tentative {
            self.ids.remove(&id);
            if let Some(entry) = self.entries.remove(&key) {
                // Release the item so the caller can construct a fresh add
                entry.item.clear_binding();
            }
            tracing::trace!(txn = %txn_id, item = %id, "tentative add rolled back");
        }
    }

    fn delete(&mut self, key: OrderKey, id: ItemId) {
        if let Some(entry) = self.entries.remove(&key) {
            if entry.is_visible() {
                self.visible -= 1;
            }
            self.total_removed += 1;
            // The item is no longer a member; handles see it detached
            entry.item.clear_binding();
        }
        self.ids.remove(&id);
    }
}

pub(crate) struct StreamInner {
    pub(crate) state: RwLock<StreamState>,
    config: StreamConfig,
}

impl StreamInner {
    /// Remove an item under `tx`, authorized by `token`.
    ///
    /// Auto-commit: validated and final immediately. Local: validated
    /// against committed state now, recorded as a deferred effect; the
    /// entry stays visible until the transaction commits.
    pub(crate) fn remove_item(
        self: &Arc<Self>,
        tx: &Transaction,
        id: ItemId,
        token: LockToken,
    ) -> Result<()> {
        // Lock order everywhere: transaction mutex, then stream state
        let mut tx_inner = tx.lock_active()?;

        if tx.is_auto_commit() {
            let mut st = self.state.write();
            let key = validate_removal(&st, tx.id(), id, token)?;
            st.delete(key, id);
            tracing::debug!(txn = %tx.id(), item = %id, "item removed (auto-commit)");
            return Ok(());
        }

        {
            let st = self.state.read();
            validate_removal(&st, tx.id(), id, token)?;
        }
        tx_inner.record(Effect::Remove {
            stream: self.clone(),
            id,
            token,
        });
        tracing::trace!(txn = %tx.id(), item = %id, "tentative remove recorded");
        Ok(())
    }
}

/// Check that `token` authorizes removing `id`, returning the entry's key.
///
/// An entry still tentative under a different transaction is not removable:
/// its add has not committed, so no other caller can legitimately hold its
/// token yet.
fn validate_removal(
    st: &StreamState,
    txn_id: TransactionId,
    id: ItemId,
    token: LockToken,
) -> Result<OrderKey> {
    let Some(key) = st.ids.get(&id).copied() else {
        return Err(Error::AuthorizationFailure(format!(
            "{id} is not in the stream (already removed?)"
        )));
    };
    let Some(entry) = st.entries.get(&key) else {
        return Err(Error::AuthorizationFailure(format!(
            "{id} is not in the stream (already removed?)"
        )));
    };
    if entry.token != token {
        return Err(Error::AuthorizationFailure(format!(
            "stale lock token {token} for {id}"
        )));
    }
    match entry.state {
        EntryState::Available => Ok(key),
        EntryState::Adding(owner) if owner == txn_id => Ok(key),
        EntryState::Adding(_) => Err(Error::AuthorizationFailure(format!(
            "{id} has not been committed by its adding transaction"
        ))),
    }
}

/// Counters describing a stream's current and cumulative contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamStats {
    /// Committed-visible entries
    pub available: usize,
    /// Tentative adds under open transactions
    pub adding: usize,
    /// Committed adds over the stream's lifetime
    pub total_added: u64,
    /// Committed removes over the stream's lifetime
    pub total_removed: u64,
}

/// Ordered, transactionally-mutable collection of items
///
/// Cheap to clone; all clones share the same interior. The stream is safe
/// under true parallel mutation: producers, consumers, and cursors may all
/// operate concurrently from independent threads.
#[derive(Clone)]
pub struct ItemStream {
    inner: Arc<StreamInner>,
}

impl ItemStream {
    /// An unbounded open stream
    pub fn new() -> Self {
        Self::with_config(StreamConfig::default())
    }

    /// A stream with explicit configuration
    pub fn with_config(config: StreamConfig) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                state: RwLock::new(StreamState::new()),
                config,
            }),
        }
    }

    /// Add a detached item to the stream under `tx`
    ///
    /// Assigns the item its identity, sequence number, and lock token, and
    /// inserts it at its place in the `(priority desc, sequence asc)`
    /// order. Under auto-commit the item is visible to cursors on return;
    /// under a local transaction it stays hidden until commit and is
    /// discarded by rollback.
    ///
    /// Errors: [`Error::CapacityExceeded`] if the stream is closed or full,
    /// [`Error::AlreadyAdded`] if the item already belongs to a stream,
    /// [`Error::TransactionComplete`] if `tx` has already resolved.
    pub fn add_item(&self, item: &Item, tx: &Transaction) -> Result<()> {
        let mut tx_inner = tx.lock_active()?;
        let mut st = self.inner.state.write();

        if !st.open {
            return Err(Error::CapacityExceeded("stream is closed".to_string()));
        }
        if let Some(max) = self.inner.config.max_items
            && st.entries.len() >= max
        {
            return Err(Error::CapacityExceeded(format!(
                "stream holds {} entries (max {max})",
                st.entries.len()
            )));
        }

        let mut binding = item.binding_write();
        if binding.is_some() {
            return Err(Error::AlreadyAdded(
                "item is already a member of a stream".to_string(),
            ));
        }

        let id = ItemId::new(st.next_item_id);
        st.next_item_id += 1;
        let sequence = st.next_sequence;
        st.next_sequence += 1;
        let token = LockToken::from_raw(st.next_token);
        st.next_token += 1;
        let key = OrderKey::new(item.priority(), sequence);

        *binding = Some(Binding {
            id,
            sequence,
            token,
            stream: Arc::downgrade(&self.inner),
        });
        drop(binding);

        let state = if tx.is_auto_commit() {
            st.visible += 1;
            st.total_added += 1;
            EntryState::Available
        } else {
            tx_inner.record(Effect::Add {
                stream: self.inner.clone(),
                id,
            });
            EntryState::Adding(tx.id())
        };
        st.entries.insert(
            key,
            Entry {
                item: item.clone(),
                token,
                state,
            },
        );
        st.ids.insert(id, key);

        tracing::debug!(
            txn = %tx.id(),
            item = %id,
            priority = key.priority,
            sequence = key.sequence,
            tentative = !tx.is_auto_commit(),
            "item added"
        );
        Ok(())
    }

    /// A cursor positioned before the first item, bound to `filter`
    ///
    /// A `None` filter matches everything. The cursor never reserves the
    /// items it yields; many cursors and removers may reference one item
    /// concurrently.
    pub fn new_nonlocking_cursor(&self, filter: Option<Arc<dyn Filter>>) -> NonLockingCursor {
        let epoch = self.inner.state.read().epoch;
        NonLockingCursor::new(self.inner.clone(), filter, epoch)
    }

    /// Administrative reset between operational cycles
    ///
    /// Drops every entry and invalidates outstanding cursors (their next
    /// call fails with [`Error::StreamUnavailable`]). Not safe to run while
    /// transactions holding tentative effects against this stream are still
    /// being resolved; their surviving effects are dropped.
    pub fn empty(&self) {
        let mut st = self.inner.state.write();
        for entry in st.entries.values() {
            entry.item.clear_binding();
        }
        st.entries.clear();
        st.ids.clear();
        st.visible = 0;
        st.epoch += 1;
        tracing::debug!(epoch = st.epoch, "stream emptied");
    }

    /// Close the stream: further adds fail with
    /// [`Error::CapacityExceeded`], cursor calls with
    /// [`Error::StreamUnavailable`]. Existing contents are kept.
    pub fn close(&self) {
        let mut st = self.inner.state.write();
        st.open = false;
        tracing::debug!("stream closed");
    }

    /// Whether the stream accepts insertions
    pub fn is_open(&self) -> bool {
        self.inner.state.read().open
    }

    /// Number of committed-visible items
    pub fn len(&self) -> usize {
        self.inner.state.read().visible
    }

    /// Whether no committed-visible items exist
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current and cumulative counters
    pub fn stats(&self) -> StreamStats {
        let st = self.inner.state.read();
        StreamStats {
            available: st.visible,
            adding: st.entries.len() - st.visible,
            total_added: st.total_added,
            total_removed: st.total_removed,
        }
    }
}

impl Default for ItemStream {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ItemStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.inner.state.read();
        f.debug_struct("ItemStream")
            .field("entries", &st.entries.len())
            .field("visible", &st.visible)
            .field("open", &st.open)
            .field("epoch", &st.epoch)
            .finish()
    }
}
