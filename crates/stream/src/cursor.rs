//! Non-locking cursor over an item stream
//!
//! A cursor holds nothing but a resumption key: the `(priority, sequence)`
//! ordering key of the last item it yielded, as a plain value. Structural
//! changes to the stream can never dangle it, and the cursor reserves
//! nothing - the same item may be referenced by any number of cursors and
//! removers at once.
//!
//! There is no terminal state. A call that finds nothing leaves the
//! resumption key where it was, so an item added later that sorts after the
//! key is found by the very next call.

use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::item::Item;
use crate::order::OrderKey;
use crate::stream::StreamInner;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

/// Stateful traversal object bound to one stream and one optional filter
///
/// Owned by a single caller; advancement takes `&mut self`. Multiple
/// cursors over one stream are fine, each from its own owner.
pub struct NonLockingCursor {
    stream: Arc<StreamInner>,
    filter: Option<Arc<dyn Filter>>,
    /// Ordering key of the last yielded item; `None` = before the start
    position: Option<OrderKey>,
    /// Stream epoch at creation; a mismatch means the stream was reset
    epoch: u64,
}

impl NonLockingCursor {
    pub(crate) fn new(
        stream: Arc<StreamInner>,
        filter: Option<Arc<dyn Filter>>,
        epoch: u64,
    ) -> Self {
        Self {
            stream,
            filter,
            position: None,
            epoch,
        }
    }

    /// Yield the next committed-visible item after the resumption key
    ///
    /// Scans the stream's current committed-visible items for the least
    /// one, in `(priority desc, sequence asc)` order, that is strictly
    /// after the resumption key and matches the filter. On a hit the
    /// resumption key advances to that item's key. On a miss the key stays
    /// put and `Ok(None)` is returned - the cursor will re-scan from the
    /// same position next call, so it recovers from the stream emptying
    /// and refilling.
    ///
    /// Fails with [`Error::StreamUnavailable`] iff the stream was closed
    /// or reset since this cursor was created.
    pub fn next(&mut self) -> Result<Option<Item>> {
        let stream = Arc::clone(&self.stream);
        let st = stream.state.read();

        if !st.open {
            return Err(Error::StreamUnavailable(
                "stream was closed while the cursor was outstanding".to_string(),
            ));
        }
        if st.epoch != self.epoch {
            return Err(Error::StreamUnavailable(
                "stream was reset while the cursor was outstanding".to_string(),
            ));
        }

        let lower = match self.position {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        for (key, entry) in st.entries.range((lower, Bound::Unbounded)) {
            if !entry.is_visible() {
                continue;
            }
            if let Some(filter) = &self.filter
                && !filter.matches(&entry.item)
            {
                continue;
            }
            self.position = Some(*key);
            tracing::trace!(
                priority = key.priority,
                sequence = key.sequence,
                "cursor yielded item"
            );
            return Ok(Some(entry.item.clone()));
        }

        Ok(None)
    }

    /// The resumption key: ordering position of the last yielded item
    pub fn position(&self) -> Option<OrderKey> {
        self.position
    }
}

impl fmt::Debug for NonLockingCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonLockingCursor")
            .field("position", &self.position)
            .field("epoch", &self.epoch)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}
