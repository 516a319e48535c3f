use async_trait::async_trait;

use crate::error::NotificationResult;
use crate::models::{EnqueueOutcome, NewQueuedEmail, QueueStats, QueuedEmail};

/// Persistence for the email queue
///
/// Every transition out of `pending` into `processing` goes through
/// [`QueueRepository::mark_processing`], which must be a single conditional
/// update so concurrent workers race on the store rather than in memory.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Insert a pending row unless an identical pending/processing one exists
    async fn enqueue(&self, input: NewQueuedEmail) -> NotificationResult<EnqueueOutcome>;

    /// Get a row by ID
    async fn get(&self, id: i64) -> NotificationResult<Option<QueuedEmail>>;

    /// Oldest pending rows first, at most `limit`
    async fn get_pending(&self, limit: u64) -> NotificationResult<Vec<QueuedEmail>>;

    /// Claim rows that are still pending; returns how many this caller won
    async fn mark_processing(&self, ids: &[i64]) -> NotificationResult<u64>;

    async fn mark_sent(&self, id: i64) -> NotificationResult<bool>;

    /// Record a failed send; retries until the policy ceiling, then fails the row
    async fn mark_failed(&self, id: i64, error: &str) -> NotificationResult<bool>;

    /// Return abandoned processing rows to pending
    async fn reset_stuck_records(&self) -> NotificationResult<u64>;

    /// Delete sent and failed rows past the retention window
    async fn cleanup_old_records(&self) -> NotificationResult<u64>;

    async fn stats(&self) -> NotificationResult<QueueStats>;
}
