//! Cursor filters
//!
//! A filter restricts which items a cursor yields. It never affects the
//! stream's order and must be a pure predicate: filters are evaluated while
//! the stream's internal lock is held, so a filter must not call back into
//! the stream or its items' `remove`.

use crate::item::Item;

/// Predicate over items, used by a cursor to select what it yields
pub trait Filter: Send + Sync {
    /// Whether the cursor should yield this item
    fn matches(&self, item: &Item) -> bool;
}

impl<F> Filter for F
where
    F: Fn(&Item) -> bool + Send + Sync,
{
    fn matches(&self, item: &Item) -> bool {
        self(item)
    }
}
