//! Stream configuration

/// Configuration for an [`ItemStream`](crate::stream::ItemStream)
#[derive(Debug, Clone, Default)]
pub struct StreamConfig {
    /// Maximum number of entries the stream will hold, counting both
    /// committed-visible items and tentative adds under open transactions.
    /// `None` means unbounded.
    pub max_items: Option<usize>,
}

impl StreamConfig {
    /// Config with a capacity bound
    pub fn with_max_items(max_items: usize) -> Self {
        Self {
            max_items: Some(max_items),
        }
    }
}
