use async_trait::async_trait;
use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    entity,
    error::NotificationResult,
    models::{
        DeliveryState, EnqueueOutcome, NewQueuedEmail, QueuePolicy, QueueStats, QueueStatus,
        QueuedEmail,
    },
    repository::QueueRepository,
};

/// sea-orm backed queue store
///
/// Runs unchanged against SQLite, which is what the integration tests use.
#[derive(Clone)]
pub struct PgQueueRepository {
    db: DatabaseConnection,
    policy: QueuePolicy,
}

impl PgQueueRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self::with_policy(db, QueuePolicy::default())
    }

    pub fn with_policy(db: DatabaseConnection, policy: QueuePolicy) -> Self {
        Self { db, policy }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn policy(&self) -> &QueuePolicy {
        &self.policy
    }
}

#[async_trait]
impl QueueRepository for PgQueueRepository {
    #[instrument(
        skip(self, input),
        fields(
            recipient_id = input.recipient_id,
            post_id = input.post_id,
            saved_search_id = input.saved_search_id
        )
    )]
    async fn enqueue(&self, input: NewQueuedEmail) -> NotificationResult<EnqueueOutcome> {
        let txn = self.db.begin().await?;

        let existing = entity::Entity::find()
            .filter(entity::Column::RecipientId.eq(input.recipient_id))
            .filter(entity::Column::PostId.eq(input.post_id))
            .filter(entity::Column::SavedSearchId.eq(input.saved_search_id))
            .filter(entity::Column::Status.is_in([QueueStatus::Pending, QueueStatus::Processing]))
            .one(&txn)
            .await?;

        if let Some(existing) = existing {
            txn.rollback().await?;
            debug!(existing_id = existing.id, "Notification already queued");
            return Ok(EnqueueOutcome::Duplicate);
        }

        let active_model: entity::ActiveModel = input.into();
        let model = active_model.insert(&txn).await?;
        txn.commit().await?;

        info!(email_id = model.id, "Queued saved search email");
        Ok(EnqueueOutcome::Queued(model.id))
    }

    async fn get(&self, id: i64) -> NotificationResult<Option<QueuedEmail>> {
        let model = entity::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn get_pending(&self, limit: u64) -> NotificationResult<Vec<QueuedEmail>> {
        let models = entity::Entity::find()
            .filter(entity::Column::Status.eq(QueueStatus::Pending))
            .order_by_asc(entity::Column::CreatedAt)
            .order_by_asc(entity::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, ids), fields(requested = ids.len()))]
    async fn mark_processing(&self, ids: &[i64]) -> NotificationResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let now: DateTimeWithTimeZone = Utc::now().into();

        // Compare-and-swap on status: rows another worker already claimed are skipped
        let result = entity::Entity::update_many()
            .col_expr(entity::Column::Status, Expr::value(QueueStatus::Processing))
            .col_expr(entity::Column::ClaimedAt, Expr::value(now))
            .filter(entity::Column::Id.is_in(ids.iter().copied()))
            .filter(entity::Column::Status.eq(QueueStatus::Pending))
            .exec(&self.db)
            .await?;

        debug!(claimed = result.rows_affected, "Claimed queue rows");
        Ok(result.rows_affected)
    }

    #[instrument(skip(self))]
    async fn mark_sent(&self, id: i64) -> NotificationResult<bool> {
        let now: DateTimeWithTimeZone = Utc::now().into();

        let result = entity::Entity::update_many()
            .col_expr(entity::Column::Status, Expr::value(QueueStatus::Sent))
            .col_expr(entity::Column::ProcessedAt, Expr::value(now))
            .filter(entity::Column::Id.eq(id))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    #[instrument(skip(self, error))]
    async fn mark_failed(&self, id: i64, error: &str) -> NotificationResult<bool> {
        let txn = self.db.begin().await?;

        let Some(model) = entity::Entity::find_by_id(id).one(&txn).await? else {
            txn.rollback().await?;
            warn!(email_id = id, "Cannot mark unknown queue row as failed");
            return Ok(false);
        };

        let next = DeliveryState::after_failure(
            model.attempts,
            error,
            self.policy.max_attempts,
            Utc::now(),
        );

        let mut active_model: entity::ActiveModel = model.into();
        active_model.apply_state(&next);
        active_model.update(&txn).await?;
        txn.commit().await?;

        match &next {
            DeliveryState::Failed { attempts, .. } => {
                warn!(email_id = id, attempts, error, "Giving up on saved search email");
            }
            DeliveryState::Pending { attempts, .. } => {
                info!(email_id = id, attempts, error, "Saved search email will be retried");
            }
            _ => {}
        }

        Ok(true)
    }

    #[instrument(skip(self))]
    async fn reset_stuck_records(&self) -> NotificationResult<u64> {
        let cutoff: DateTimeWithTimeZone = self.policy.stuck_cutoff(Utc::now()).into();

        let result = entity::Entity::update_many()
            .col_expr(entity::Column::Status, Expr::value(QueueStatus::Pending))
            .col_expr(
                entity::Column::ClaimedAt,
                Expr::value(Option::<DateTimeWithTimeZone>::None),
            )
            .filter(entity::Column::Status.eq(QueueStatus::Processing))
            .filter(entity::Column::CreatedAt.lt(cutoff))
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            warn!(reset = result.rows_affected, "Reset stuck queue rows to pending");
        }

        Ok(result.rows_affected)
    }

    #[instrument(skip(self))]
    async fn cleanup_old_records(&self) -> NotificationResult<u64> {
        let cutoff: DateTimeWithTimeZone = self.policy.retention_cutoff(Utc::now()).into();

        let result = entity::Entity::delete_many()
            .filter(entity::Column::Status.is_in([QueueStatus::Sent, QueueStatus::Failed]))
            .filter(entity::Column::ProcessedAt.lt(cutoff))
            .exec(&self.db)
            .await?;

        info!(deleted = result.rows_affected, "Purged old queue rows");
        Ok(result.rows_affected)
    }

    async fn stats(&self) -> NotificationResult<QueueStats> {
        let rows: Vec<(QueueStatus, i64)> = entity::Entity::find()
            .select_only()
            .column(entity::Column::Status)
            .column_as(Expr::from(Func::count(Expr::col(entity::Column::Id))), "count")
            .group_by(entity::Column::Status)
            .into_tuple()
            .all(&self.db)
            .await?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            stats.add(status, count.max(0) as u64);
        }

        Ok(stats)
    }
}
