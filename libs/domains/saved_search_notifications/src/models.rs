//! Data models for the saved-search notification queue.

use chrono::{DateTime, TimeDelta, Utc};
use sea_orm::sea_query::StringLen;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use validator::Validate;

// ============================================================================
// Queue row status
// ============================================================================

/// Persisted status column of a queued email.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Waiting to be claimed by a batch run.
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Claimed by a batch run, send in flight.
    #[sea_orm(string_value = "processing")]
    Processing,
    /// Delivered to the mail transport.
    #[sea_orm(string_value = "sent")]
    Sent,
    /// Gave up after the retry ceiling.
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Sent => "sent",
            QueueStatus::Failed => "failed",
        }
    }

    /// Sent and failed rows never change again and are eligible for cleanup.
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Sent | QueueStatus::Failed)
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Delivery state machine
// ============================================================================

/// Lifecycle of a queued email, derived from its row.
///
/// ```text
/// Pending ──claim──▶ Processing ──send ok──▶ Sent
///    ▲                   │
///    └──fail (< max)─────┤
///    └──stuck recovery───┤
///                        └──fail (>= max)──▶ Failed
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeliveryState {
    Pending {
        attempts: i32,
        last_error: Option<String>,
    },
    Processing {
        claimed_at: DateTime<Utc>,
        attempts: i32,
    },
    Sent {
        at: DateTime<Utc>,
    },
    Failed {
        attempts: i32,
        last_error: String,
        at: DateTime<Utc>,
    },
}

impl DeliveryState {
    /// State after one more failed send.
    ///
    /// `attempts` is the count recorded before this failure. Reaching
    /// `max_attempts` freezes the row as failed; anything below returns it to
    /// pending for the next batch run.
    pub fn after_failure(
        attempts: i32,
        error: impl Into<String>,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> Self {
        let attempts = attempts.saturating_add(1);
        let last_error = error.into();

        if attempts >= max_attempts {
            DeliveryState::Failed {
                attempts,
                last_error,
                at: now,
            }
        } else {
            DeliveryState::Pending {
                attempts,
                last_error: Some(last_error),
            }
        }
    }

    pub fn status(&self) -> QueueStatus {
        match self {
            DeliveryState::Pending { .. } => QueueStatus::Pending,
            DeliveryState::Processing { .. } => QueueStatus::Processing,
            DeliveryState::Sent { .. } => QueueStatus::Sent,
            DeliveryState::Failed { .. } => QueueStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

// ============================================================================
// Queue rows
// ============================================================================

/// A row of the email queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedEmail {
    pub id: i64,
    pub recipient_email: String,
    pub recipient_id: i64,
    pub post_id: i64,
    pub saved_search_id: i64,
    pub post_type: String,
    /// Fully rendered subject line.
    pub subject: String,
    /// Fully rendered message body.
    pub message: String,
    pub status: QueueStatus,
    /// Failed send attempts so far.
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    /// Set when a batch run claims the row, cleared when it goes back to pending.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Set on the transition to sent or failed.
    pub processed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl QueuedEmail {
    /// Typed view of the row's status columns.
    pub fn state(&self) -> DeliveryState {
        match self.status {
            QueueStatus::Pending => DeliveryState::Pending {
                attempts: self.attempts,
                last_error: self.error_message.clone(),
            },
            QueueStatus::Processing => DeliveryState::Processing {
                claimed_at: self.claimed_at.unwrap_or(self.created_at),
                attempts: self.attempts,
            },
            QueueStatus::Sent => DeliveryState::Sent {
                at: self.processed_at.unwrap_or(self.created_at),
            },
            QueueStatus::Failed => DeliveryState::Failed {
                attempts: self.attempts,
                last_error: self.error_message.clone().unwrap_or_default(),
                at: self.processed_at.unwrap_or(self.created_at),
            },
        }
    }
}

/// Input for enqueueing a notification.
///
/// Subject and message are final, pre-rendered text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewQueuedEmail {
    #[validate(email)]
    pub recipient_email: String,
    #[validate(range(min = 1))]
    pub recipient_id: i64,
    #[validate(range(min = 1))]
    pub post_id: i64,
    #[validate(range(min = 1))]
    pub saved_search_id: i64,
    #[validate(length(min = 1, max = 64))]
    pub post_type: String,
    #[validate(length(min = 1, max = 998))]
    pub subject: String,
    #[validate(length(min = 1))]
    pub message: String,
}

/// Result of an enqueue call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "id", rename_all = "snake_case")]
pub enum EnqueueOutcome {
    /// A new pending row was inserted.
    Queued(i64),
    /// A pending or processing row for the same recipient, post and search already exists.
    Duplicate,
}

impl EnqueueOutcome {
    pub fn id(&self) -> Option<i64> {
        match self {
            EnqueueOutcome::Queued(id) => Some(*id),
            EnqueueOutcome::Duplicate => None,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, EnqueueOutcome::Duplicate)
    }
}

/// Row counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub sent: u64,
    pub failed: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.sent + self.failed
    }

    pub(crate) fn add(&mut self, status: QueueStatus, count: u64) {
        match status {
            QueueStatus::Pending => self.pending += count,
            QueueStatus::Processing => self.processing += count,
            QueueStatus::Sent => self.sent += count,
            QueueStatus::Failed => self.failed += count,
        }
    }
}

/// Retry ceiling and age thresholds applied by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    /// Failed sends before a row is frozen as failed.
    pub max_attempts: i32,
    /// Age after which a processing row is considered abandoned.
    pub stuck_after: TimeDelta,
    /// How long sent and failed rows are kept.
    pub retention: TimeDelta,
}

impl QueuePolicy {
    pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

    /// Processing rows created before this instant are stuck.
    pub fn stuck_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.stuck_after
    }

    /// Terminal rows processed before this instant are purged.
    pub fn retention_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.retention
    }
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            stuck_after: TimeDelta::minutes(10),
            retention: TimeDelta::days(7),
        }
    }
}

// ============================================================================
// Notification payloads
// ============================================================================

/// A user's saved search, as far as notifications need it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedSearch {
    pub id: i64,
    pub user_id: i64,
    pub user_email: String,
    pub user_name: String,
    pub title: String,
}

/// A newly published post that matched a saved search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedPost {
    pub id: i64,
    pub post_type: String,
    pub title: String,
    pub url: String,
}

/// Event emitted when a new post matches a saved search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedSearchMatch {
    pub saved_search: SavedSearch,
    pub post: MatchedPost,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row(status: QueueStatus) -> QueuedEmail {
        let created_at = Utc::now() - TimeDelta::minutes(30);
        QueuedEmail {
            id: 1,
            recipient_email: "reader@example.com".to_string(),
            recipient_id: 5,
            post_id: 10,
            saved_search_id: 3,
            post_type: "places".to_string(),
            subject: "X".to_string(),
            message: "Y".to_string(),
            status,
            attempts: 0,
            created_at,
            claimed_at: None,
            processed_at: None,
            error_message: None,
        }
    }

    #[test]
    fn test_after_failure_below_ceiling_returns_to_pending() {
        let now = Utc::now();
        let state = DeliveryState::after_failure(1, "smtp timeout", 3, now);
        assert_eq!(
            state,
            DeliveryState::Pending {
                attempts: 2,
                last_error: Some("smtp timeout".to_string()),
            }
        );
        assert!(!state.is_terminal());
    }

    #[test]
    fn test_after_failure_at_ceiling_is_permanent() {
        let now = Utc::now();
        let state = DeliveryState::after_failure(2, "mailbox full", 3, now);
        assert_eq!(
            state,
            DeliveryState::Failed {
                attempts: 3,
                last_error: "mailbox full".to_string(),
                at: now,
            }
        );
        assert_eq!(state.status(), QueueStatus::Failed);
    }

    #[test]
    fn test_after_failure_with_single_attempt_policy() {
        let state = DeliveryState::after_failure(0, "boom", 1, Utc::now());
        assert!(state.is_terminal());
    }

    #[test]
    fn test_processing_state_falls_back_to_created_at() {
        let row = sample_row(QueueStatus::Processing);
        assert_eq!(
            row.state(),
            DeliveryState::Processing {
                claimed_at: row.created_at,
                attempts: 0,
            }
        );
    }

    #[test]
    fn test_pending_state_carries_last_error() {
        let mut row = sample_row(QueueStatus::Pending);
        row.attempts = 1;
        row.error_message = Some("smtp timeout".to_string());

        match row.state() {
            DeliveryState::Pending { attempts, last_error } => {
                assert_eq!(attempts, 1);
                assert_eq!(last_error.as_deref(), Some("smtp timeout"));
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn test_new_queued_email_validation() {
        let valid = NewQueuedEmail {
            recipient_email: "reader@example.com".to_string(),
            recipient_id: 5,
            post_id: 10,
            saved_search_id: 3,
            post_type: "places".to_string(),
            subject: "X".to_string(),
            message: "Y".to_string(),
        };
        assert!(valid.validate().is_ok());

        let invalid = NewQueuedEmail {
            recipient_email: "not-an-address".to_string(),
            subject: String::new(),
            ..valid
        };
        let errors = invalid.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("recipient_email"));
        assert!(fields.contains_key("subject"));
    }

    #[test]
    fn test_queue_stats_total() {
        let mut stats = QueueStats::default();
        stats.add(QueueStatus::Pending, 4);
        stats.add(QueueStatus::Sent, 2);
        stats.add(QueueStatus::Failed, 1);
        assert_eq!(stats.total(), 7);
        assert_eq!(stats.processing, 0);
    }

    #[test]
    fn test_queue_policy_defaults() {
        let policy = QueuePolicy::default();
        let now = Utc::now();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(now - policy.stuck_cutoff(now), TimeDelta::minutes(10));
        assert_eq!(now - policy.retention_cutoff(now), TimeDelta::days(7));
    }

    #[test]
    fn test_enqueue_outcome_serializes_tagged() {
        let json = serde_json::to_value(EnqueueOutcome::Queued(7)).unwrap();
        assert_eq!(json, serde_json::json!({"outcome": "queued", "id": 7}));
        assert!(EnqueueOutcome::Duplicate.is_duplicate());
    }
}
