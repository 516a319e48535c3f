//! Error types for the saved-search notification queue.

use thiserror::Error;

/// Result type for queue operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur while queueing or delivering notifications.
///
/// Duplicate enqueues and lost claim races are not errors; they are reported
/// through [`EnqueueOutcome`](crate::models::EnqueueOutcome) and
/// [`SkipReason`](crate::processor::SkipReason).
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Email provider error.
    #[error("Email provider error: {0}")]
    ProviderError(String),

    /// The provider answered but did not accept the message.
    #[error("Email rejected by {provider}")]
    Rejected { provider: &'static str },

    /// Template rendering error.
    #[error("Template rendering error: {0}")]
    TemplateError(String),

    /// Database error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Scheduler error.
    #[error("Scheduler error: {0}")]
    SchedulerError(String),

    /// Notification payload failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for NotificationError {
    fn from(err: sea_orm::DbErr) -> Self {
        NotificationError::DatabaseError(err.to_string())
    }
}

impl From<handlebars::RenderError> for NotificationError {
    fn from(err: handlebars::RenderError) -> Self {
        NotificationError::TemplateError(err.to_string())
    }
}

impl From<handlebars::TemplateError> for NotificationError {
    fn from(err: handlebars::TemplateError) -> Self {
        NotificationError::TemplateError(err.to_string())
    }
}

impl From<tokio_cron_scheduler::JobSchedulerError> for NotificationError {
    fn from(err: tokio_cron_scheduler::JobSchedulerError) -> Self {
        NotificationError::SchedulerError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for NotificationError {
    fn from(err: validator::ValidationErrors) -> Self {
        NotificationError::Validation(err.to_string())
    }
}

impl From<core_config::ConfigError> for NotificationError {
    fn from(err: core_config::ConfigError) -> Self {
        NotificationError::ConfigError(err.to_string())
    }
}
