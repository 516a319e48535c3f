//! Email provider implementations.
//!
//! This module contains the `EmailProvider` trait and the transports the
//! worker can deliver through.

mod mock;
mod smtp;

pub use mock::{MockOutcome, MockProvider};
pub use smtp::{SmtpConfig, SmtpProvider};

use crate::error::NotificationResult;
use async_trait::async_trait;

/// Represents a sent email with provider-specific message ID.
#[derive(Debug, Clone)]
pub struct SentEmail {
    /// Provider-specific message ID for tracking.
    pub message_id: Option<String>,
    /// Whether the email was accepted for delivery.
    pub accepted: bool,
}

/// Email content ready for sending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmailContent {
    /// Recipient email address.
    pub to_email: String,
    /// Recipient name, may be empty.
    pub to_name: String,
    /// Email subject.
    pub subject: String,
    /// HTML body content.
    pub html_body: String,
    /// Plain text alternative; HTML-only when empty.
    pub text_body: String,
}

impl EmailContent {
    /// HTML-only message without a display name.
    pub fn html(
        to_email: impl Into<String>,
        subject: impl Into<String>,
        html_body: impl Into<String>,
    ) -> Self {
        Self {
            to_email: to_email.into(),
            subject: subject.into(),
            html_body: html_body.into(),
            ..Self::default()
        }
    }
}

/// Trait for email sending providers.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Send an email.
    async fn send(&self, email: &EmailContent) -> NotificationResult<SentEmail>;

    /// Get the provider name for logging.
    fn name(&self) -> &'static str;

    /// Check if the provider is healthy/configured.
    async fn health_check(&self) -> NotificationResult<bool>;
}
