//! Batcher: contiguous partitioning of the queue for transmission.

use crate::error::CoreError;

/// Split an ordered sequence into contiguous groups of at most `batch_size`.
///
/// Input order is preserved within and across groups; only the last group
/// may be smaller. An empty input yields no groups.
pub fn partition<T>(items: &[T], batch_size: usize) -> Result<Vec<&[T]>, CoreError> {
    if batch_size == 0 {
        return Err(CoreError::InvalidBatchSize(batch_size));
    }
    Ok(items.chunks(batch_size).collect())
}
