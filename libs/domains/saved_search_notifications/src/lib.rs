//! Saved Search Notifications Domain
//!
//! Batched email delivery for saved-search matches.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ SavedSearchNotifier  │  ← Renders a match, queues it (or sends now)
//! └──────────┬───────────┘
//!            │
//! ┌──────────▼───────────┐
//! │   QueueRepository    │  ← saved_search_email_queue table
//! └──────────┬───────────┘
//!            │
//! ┌──────────▼───────────┐
//! │    QueueScheduler    │  ← batch hook every N minutes, cleanup daily
//! └──────────┬───────────┘
//!            │
//! ┌──────────▼───────────┐
//! │    BatchProcessor    │  ← recover, fetch, claim, send
//! └──────────┬───────────┘
//!            │
//! ┌──────────▼───────────┐
//! │    Email Provider    │  ← SMTP, mock
//! └──────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_saved_search_notifications::{
//!     BatchProcessor, EnvSettingsSource, PgQueueRepository, QueueScheduler,
//!     providers::SmtpProvider,
//! };
//!
//! let processor = BatchProcessor::new(PgQueueRepository::new(db), SmtpProvider::from_env()?);
//! let scheduler = QueueScheduler::new(processor, Arc::new(EnvSettingsSource::new())).await?;
//! scheduler.reconcile().await?;
//! scheduler.start().await?;
//! ```

pub mod entity;
pub mod error;
pub mod metrics;
pub mod models;
pub mod notifier;
pub mod postgres;
pub mod processor;
pub mod providers;
pub mod repository;
pub mod scheduler;
pub mod settings;
pub mod templates;

// Re-export commonly used types
pub use error::{NotificationError, NotificationResult};
pub use models::{
    DeliveryState, EnqueueOutcome, MatchedPost, NewQueuedEmail, QueuePolicy, QueueStats,
    QueueStatus, QueuedEmail, SavedSearch, SavedSearchMatch,
};
pub use notifier::{NotifyOutcome, SavedSearchNotifier};
pub use postgres::PgQueueRepository;
pub use processor::{BatchProcessor, BatchReport, DeliveryFailure, SkipReason};
pub use providers::{EmailContent, EmailProvider, MockProvider, SentEmail, SmtpProvider};
pub use repository::QueueRepository;
pub use scheduler::{Hook, QueueScheduler};
pub use settings::{BatchSettings, EnvSettingsSource, MemorySettingsSource, SettingsSource};
pub use templates::TemplateEngine;
