//! Items: the orderable, removable units held by a stream
//!
//! An [`Item`] is a cheap handle over shared data. It is created detached,
//! joins exactly one stream via [`ItemStream::add_item`], and is thereafter
//! identified by a stable [`ItemId`]. Handles returned by cursors refer to
//! the same shared data as the handle the producer added, so the `marked`
//! scratch flag is visible through every handle.
//!
//! [`ItemStream::add_item`]: crate::stream::ItemStream::add_item

use crate::error::{Error, Result};
use crate::order::OrderKey;
use crate::stream::StreamInner;
use crate::transaction::Transaction;
use msgstore_common::LockToken;
use parking_lot::{RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Stable item identity, unique within a stream for the item's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(u64);

impl ItemId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw identity value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item-{}", self.0)
    }
}

/// Membership record stamped onto an item when it joins a stream
#[derive(Clone)]
pub(crate) struct Binding {
    pub(crate) id: ItemId,
    pub(crate) sequence: u64,
    pub(crate) token: LockToken,
    pub(crate) stream: Weak<StreamInner>,
}

struct ItemData {
    payload: Vec<u8>,
    priority: i32,
    /// Caller scratch flag, never interpreted by the store
    marked: AtomicBool,
    /// Set at add, cleared if the adding transaction rolls back
    binding: RwLock<Option<Binding>>,
}

/// Handle to an item's shared data
///
/// Clones refer to the same underlying item; equality is identity.
#[derive(Clone)]
pub struct Item {
    data: Arc<ItemData>,
}

impl Item {
    /// Create a detached item carrying an opaque payload
    ///
    /// Larger `priority` sorts earlier in traversal order. The item holds
    /// no sequence, identity, or lock token until it is added to a stream.
    pub fn new(payload: impl Into<Vec<u8>>, priority: i32) -> Self {
        Self {
            data: Arc::new(ItemData {
                payload: payload.into(),
                priority,
                marked: AtomicBool::new(false),
                binding: RwLock::new(None),
            }),
        }
    }

    /// The opaque payload supplied at creation
    pub fn payload(&self) -> &[u8] {
        &self.data.payload
    }

    /// Traversal priority; larger sorts earlier
    pub fn priority(&self) -> i32 {
        self.data.priority
    }

    /// Stream-assigned identity, `None` while detached
    pub fn id(&self) -> Option<ItemId> {
        self.data.binding.read().as_ref().map(|b| b.id)
    }

    /// Stream-assigned insertion sequence, `None` while detached
    pub fn sequence(&self) -> Option<u64> {
        self.data.binding.read().as_ref().map(|b| b.sequence)
    }

    /// Current lock token, required to authorize removal
    ///
    /// `None` while the item is detached, including after a removal of this
    /// item commits. A removal presenting a token captured before that
    /// commit fails with [`Error::AuthorizationFailure`].
    pub fn lock_token(&self) -> Option<LockToken> {
        self.data.binding.read().as_ref().map(|b| b.token)
    }

    /// Ordering key within the stream, `None` while detached
    pub fn order_key(&self) -> Option<OrderKey> {
        self.data
            .binding
            .read()
            .as_ref()
            .map(|b| OrderKey::new(self.data.priority, b.sequence))
    }

    /// Read the caller scratch flag
    pub fn is_marked(&self) -> bool {
        self.data.marked.load(Ordering::Relaxed)
    }

    /// Set the caller scratch flag; visible through every handle
    pub fn set_marked(&self, marked: bool) {
        self.data.marked.store(marked, Ordering::Relaxed);
    }

    /// Remove this item from its stream under `tx`, authorized by `token`
    ///
    /// Under auto-commit the removal is final immediately; under a local
    /// transaction it is a deferred effect that takes hold at commit and
    /// vanishes at rollback. The item stays visible to cursors until the
    /// removal commits.
    ///
    /// Fails with [`Error::AuthorizationFailure`] if the token does not
    /// match the stream's current record of the item - the item was already
    /// removed, or the handle is stale.
    pub fn remove(&self, tx: &Transaction, token: LockToken) -> Result<()> {
        let binding = self.data.binding.read().clone();
        let Some(binding) = binding else {
            return Err(Error::AuthorizationFailure(
                "item is not a member of any stream".to_string(),
            ));
        };
        let Some(stream) = binding.stream.upgrade() else {
            return Err(Error::StreamUnavailable(
                "owning stream no longer exists".to_string(),
            ));
        };
        stream.remove_item(tx, binding.id, token)
    }

    pub(crate) fn binding_write(&self) -> RwLockWriteGuard<'_, Option<Binding>> {
        self.data.binding.write()
    }

    pub(crate) fn clear_binding(&self) {
        *self.data.binding.write() = None;
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl Eq for Item {}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("id", &self.id())
            .field("priority", &self.priority())
            .field("sequence", &self.sequence())
            .field("marked", &self.is_marked())
            .finish()
    }
}
