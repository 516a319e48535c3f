use crate::models::{DeliveryState, NewQueuedEmail, QueueStatus, QueuedEmail};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::entity::prelude::*;

/// Sea-ORM Entity for the saved_search_email_queue table
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "saved_search_email_queue")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub recipient_email: String,
    pub recipient_id: i64,
    pub post_id: i64,
    pub saved_search_id: i64,
    pub post_type: String,
    #[sea_orm(column_type = "Text")]
    pub subject: String,
    #[sea_orm(column_type = "Text")]
    pub message: String,
    pub status: QueueStatus,
    pub attempts: i32,
    pub created_at: DateTimeWithTimeZone,
    pub claimed_at: Option<DateTimeWithTimeZone>,
    pub processed_at: Option<DateTimeWithTimeZone>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    /// Write a delivery state onto the status columns.
    pub fn apply_state(&mut self, state: &DeliveryState) {
        self.status = Set(state.status());

        match state {
            DeliveryState::Pending {
                attempts,
                last_error,
            } => {
                self.attempts = Set(*attempts);
                self.error_message = Set(last_error.clone());
                self.claimed_at = Set(None);
                self.processed_at = Set(None);
            }
            DeliveryState::Processing {
                claimed_at,
                attempts,
            } => {
                self.attempts = Set(*attempts);
                self.claimed_at = Set(Some((*claimed_at).into()));
            }
            DeliveryState::Sent { at } => {
                self.processed_at = Set(Some((*at).into()));
            }
            DeliveryState::Failed {
                attempts,
                last_error,
                at,
            } => {
                self.attempts = Set(*attempts);
                self.error_message = Set(Some(last_error.clone()));
                self.processed_at = Set(Some((*at).into()));
            }
        }
    }
}

// Conversion from Sea-ORM Model to domain QueuedEmail
impl From<Model> for QueuedEmail {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            recipient_email: model.recipient_email,
            recipient_id: model.recipient_id,
            post_id: model.post_id,
            saved_search_id: model.saved_search_id,
            post_type: model.post_type,
            subject: model.subject,
            message: model.message,
            status: model.status,
            attempts: model.attempts,
            created_at: model.created_at.into(),
            claimed_at: model.claimed_at.map(Into::into),
            processed_at: model.processed_at.map(Into::into),
            error_message: model.error_message,
        }
    }
}

// New rows always start pending with no attempts
impl From<NewQueuedEmail> for ActiveModel {
    fn from(input: NewQueuedEmail) -> Self {
        ActiveModel {
            id: NotSet,
            recipient_email: Set(input.recipient_email),
            recipient_id: Set(input.recipient_id),
            post_id: Set(input.post_id),
            saved_search_id: Set(input.saved_search_id),
            post_type: Set(input.post_type),
            subject: Set(input.subject),
            message: Set(input.message),
            status: Set(QueueStatus::Pending),
            attempts: Set(0),
            created_at: Set(chrono::Utc::now().into()),
            claimed_at: Set(None),
            processed_at: Set(None),
            error_message: Set(None),
        }
    }
}
