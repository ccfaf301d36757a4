//! Retry and dead-letter policy.
//!
//! Every failed transmission of a queue item bumps its attempt count. Below
//! the ceiling the item stays queued and its record is marked `error`; at the
//! ceiling the record becomes `failed` and the item is dead-lettered: it stays
//! in the queue but is skipped by every later pass until someone resets it.
//!
//! A record with a later queued mutation keeps its `pending` state; the
//! failure only counts against the stale item.

use tasksync_core::QueueItem;
use tasksync_store::{Store, StoreError};

/// What happened to an item after a failure was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureVerdict {
    /// The item will be retried on the next pass.
    Retry { attempts: u32 },
    /// The item reached the ceiling and will not be attempted again.
    DeadLettered { attempts: u32 },
}

impl FailureVerdict {
    pub fn attempts(&self) -> u32 {
        match self {
            FailureVerdict::Retry { attempts } | FailureVerdict::DeadLettered { attempts } => {
                *attempts
            }
        }
    }
}

/// Bounded retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Classify an item by its attempt count after a failure.
    pub fn classify(&self, attempts: u32) -> FailureVerdict {
        if attempts >= self.max_attempts {
            FailureVerdict::DeadLettered { attempts }
        } else {
            FailureVerdict::Retry { attempts }
        }
    }

    /// Whether a pass should transmit this item.
    pub fn should_attempt(&self, item: &QueueItem) -> bool {
        !item.is_dead_lettered(self.max_attempts)
    }

    /// Record a failed transmission of `item`.
    ///
    /// Increments the attempt count, stores `error` as the item's last error
    /// and moves the record to `error` or `failed`, unless a later mutation
    /// of the record is already queued.
    pub async fn on_item_failure<S: Store + ?Sized>(
        &self,
        store: &S,
        item: &QueueItem,
        error: &str,
    ) -> Result<FailureVerdict, StoreError> {
        let recorded = store.record_failure(&item.id, error, self.max_attempts).await?;
        let verdict = self.classify(recorded.attempts);

        if recorded.is_superseded() {
            tracing::debug!(
                record = %item.record_id,
                item = %item.id,
                attempts = recorded.attempts,
                "newer mutation queued, record state kept"
            );
        }

        match verdict {
            FailureVerdict::Retry { attempts } => {
                tracing::debug!(record = %item.record_id, attempts, "item will be retried");
            }
            FailureVerdict::DeadLettered { attempts } => {
                tracing::warn!(
                    record = %item.record_id,
                    item = %item.id,
                    attempts,
                    error,
                    "retry ceiling reached, item dead-lettered"
                );
            }
        }

        Ok(verdict)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
