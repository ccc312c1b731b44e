//! Transactions: units of atomicity for add and remove
//!
//! A local transaction is a deferred-effect log. Operations validate
//! eagerly but record their effect instead of mutating visible state;
//! `commit` applies the log atomically and `rollback` simply discards it,
//! so no partially-applied mutation ever needs undoing. An auto-commit
//! transaction has an empty log: every operation under it is final on
//! return and there is no explicit finalize call.

use crate::error::{Error, Result};
use crate::item::ItemId;
use crate::stream::{StreamInner, StreamState};
use msgstore_common::{LockToken, TransactionId};
use parking_lot::{Mutex, MutexGuard, RwLockWriteGuard};
use std::fmt;
use std::sync::Arc;

/// Transaction variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    /// Every operation is final immediately upon return
    AutoCommit,
    /// Operations batch until an explicit `commit` or `rollback`
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Active,
    Committed,
    RolledBack,
}

/// One deferred effect recorded under a local transaction
pub(crate) enum Effect {
    Add {
        stream: Arc<StreamInner>,
        id: ItemId,
    },
    Remove {
        stream: Arc<StreamInner>,
        id: ItemId,
        token: LockToken,
    },
}

impl Effect {
    pub(crate) fn stream(&self) -> &Arc<StreamInner> {
        match self {
            Effect::Add { stream, .. } => stream,
            Effect::Remove { stream, .. } => stream,
        }
    }
}

pub(crate) struct TxInner {
    state: TxState,
    effects: Vec<Effect>,
}

impl TxInner {
    pub(crate) fn record(&mut self, effect: Effect) {
        self.effects.push(effect);
    }
}

/// Unit of atomicity for add/remove operations
///
/// Shareable across threads (`Send + Sync`); operations under one
/// transaction serialize on its internal mutex.
pub struct Transaction {
    id: TransactionId,
    kind: TransactionKind,
    inner: Mutex<TxInner>,
}

impl Transaction {
    /// A transaction whose every operation commits immediately
    pub fn auto_commit() -> Self {
        Self::with_kind(TransactionKind::AutoCommit)
    }

    /// A transaction batching operations behind explicit commit/rollback
    pub fn local() -> Self {
        Self::with_kind(TransactionKind::Local)
    }

    fn with_kind(kind: TransactionKind) -> Self {
        Self {
            id: TransactionId::new(),
            kind,
            inner: Mutex::new(TxInner {
                state: TxState::Active,
                effects: Vec::new(),
            }),
        }
    }

    /// This transaction's identifier
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// The transaction variant
    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub(crate) fn is_auto_commit(&self) -> bool {
        self.kind == TransactionKind::AutoCommit
    }

    /// Whether further operations may run under this transaction
    pub fn is_active(&self) -> bool {
        self.inner.lock().state == TxState::Active
    }

    /// Lock the effect log, failing if the transaction already resolved
    pub(crate) fn lock_active(&self) -> Result<MutexGuard<'_, TxInner>> {
        let inner = self.inner.lock();
        match inner.state {
            TxState::Active => Ok(inner),
            TxState::Committed => Err(Error::TransactionComplete(format!(
                "transaction {} already committed",
                self.id
            ))),
            TxState::RolledBack => Err(Error::TransactionComplete(format!(
                "transaction {} already rolled back",
                self.id
            ))),
        }
    }

    /// Apply every recorded effect atomically and terminate the transaction
    ///
    /// All involved streams are write-locked for the duration (in stable
    /// address order, so concurrent multi-stream commits cannot deadlock),
    /// so observers see either none or all of this transaction's effects.
    pub fn commit(&self) -> Result<()> {
        let effects = self.resolve(TxState::Committed)?;

        let mut streams: Vec<Arc<StreamInner>> = Vec::new();
        for effect in &effects {
            let stream = effect.stream();
            if !streams.iter().any(|known| Arc::ptr_eq(known, stream)) {
                streams.push(Arc::clone(stream));
            }
        }
        streams.sort_by_key(|stream| Arc::as_ptr(stream) as usize);

        let mut guards: Vec<(*const StreamInner, RwLockWriteGuard<'_, StreamState>)> = streams
            .iter()
            .map(|stream| (Arc::as_ptr(stream), stream.state.write()))
            .collect();

        for effect in &effects {
            let ptr = Arc::as_ptr(effect.stream());
            if let Some(slot) = guards.iter_mut().find(|slot| slot.0 == ptr) {
                slot.1.apply_committed(self.id, effect);
            }
        }
        drop(guards);

        tracing::debug!(txn = %self.id, effects = effects.len(), "local transaction committed");
        Ok(())
    }

    /// Discard every recorded effect and terminate the transaction
    ///
    /// Tentative adds are deleted from their streams (they were never
    /// visible, so observers see nothing change); tentative removes have
    /// no state to undo.
    pub fn rollback(&self) -> Result<()> {
        let effects = self.resolve(TxState::RolledBack)?;

        for effect in effects.iter().rev() {
            if let Effect::Add { stream, id } = effect {
                let mut st = stream.state.write();
                st.discard_tentative_add(self.id, *id);
            }
        }

        tracing::debug!(txn = %self.id, effects = effects.len(), "local transaction rolled back");
        Ok(())
    }

    /// Transition to a terminal state, taking the effect log
    fn resolve(&self, target: TxState) -> Result<Vec<Effect>> {
        if self.kind == TransactionKind::AutoCommit {
            return Err(Error::TransactionComplete(
                "auto-commit transactions resolve implicitly per operation".to_string(),
            ));
        }
        let mut inner = self.lock_active()?;
        inner.state = target;
        Ok(std::mem::take(&mut inner.effects))
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.inner.lock().state)
            .finish()
    }
}
