//! In-memory email provider for tests and local runs

use super::{EmailContent, EmailProvider, SentEmail};
use crate::error::{NotificationError, NotificationResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// What the mock does with a single send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    /// Record the email and accept it
    Accept,
    /// Answer without accepting the message
    Reject,
    /// Return a provider error with this message
    Fail(String),
    /// Panic with this message
    Panic(String),
}

/// Mock email provider that captures sent emails
///
/// Outcomes queued with [`MockProvider::then`] are consumed one per send;
/// once the script is empty every send gets the fallback outcome.
#[derive(Clone)]
pub struct MockProvider {
    sent_emails: Arc<Mutex<Vec<EmailContent>>>,
    script: Arc<Mutex<VecDeque<MockOutcome>>>,
    fallback: MockOutcome,
}

impl MockProvider {
    /// Create a new mock provider that accepts everything
    pub fn new() -> Self {
        Self::with_fallback(MockOutcome::Accept)
    }

    /// Create a mock provider that always fails
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_fallback(MockOutcome::Fail(message.into()))
    }

    fn with_fallback(fallback: MockOutcome) -> Self {
        Self {
            sent_emails: Arc::new(Mutex::new(Vec::new())),
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback,
        }
    }

    /// Queue the outcome of the next unscripted send
    pub async fn then(&self, outcome: MockOutcome) -> &Self {
        self.script.lock().await.push_back(outcome);
        self
    }

    /// Get all accepted emails
    pub async fn sent_emails(&self) -> Vec<EmailContent> {
        self.sent_emails.lock().await.clone()
    }

    /// Get the count of accepted emails
    pub async fn sent_count(&self) -> usize {
        self.sent_emails.lock().await.len()
    }

    /// Check if an email was sent to a specific address
    pub async fn was_sent_to(&self, email: &str) -> bool {
        self.sent_emails
            .lock()
            .await
            .iter()
            .any(|e| e.to_email == email)
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmailProvider for MockProvider {
    async fn send(&self, email: &EmailContent) -> NotificationResult<SentEmail> {
        let outcome = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match outcome {
            MockOutcome::Accept => {
                let mut sent = self.sent_emails.lock().await;
                sent.push(email.clone());
                info!(to = %email.to_email, subject = %email.subject, "Mock email sent");

                Ok(SentEmail {
                    message_id: Some(format!("mock-{}", sent.len())),
                    accepted: true,
                })
            }
            MockOutcome::Reject => Ok(SentEmail {
                message_id: None,
                accepted: false,
            }),
            MockOutcome::Fail(message) => Err(NotificationError::ProviderError(message)),
            MockOutcome::Panic(message) => panic!("{message}"),
        }
    }

    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn health_check(&self) -> NotificationResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_provider_records_sent_emails() {
        let provider = MockProvider::new();
        let email = EmailContent::html("reader@example.com", "New match", "<p>Hi</p>");

        let result = provider.send(&email).await.unwrap();

        assert!(result.accepted);
        assert_eq!(result.message_id.as_deref(), Some("mock-1"));
        assert!(provider.was_sent_to("reader@example.com").await);
    }

    #[tokio::test]
    async fn test_mock_provider_script_then_fallback() {
        let provider = MockProvider::new();
        provider
            .then(MockOutcome::Fail("smtp timeout".to_string()))
            .await
            .then(MockOutcome::Reject)
            .await;
        let email = EmailContent::html("reader@example.com", "New match", "<p>Hi</p>");

        assert!(provider.send(&email).await.is_err());
        assert!(!provider.send(&email).await.unwrap().accepted);
        assert!(provider.send(&email).await.unwrap().accepted);
        assert_eq!(provider.sent_count().await, 1);
    }

    #[tokio::test]
    async fn test_failing_mock_provider() {
        let provider = MockProvider::failing("connection refused");
        let email = EmailContent::html("reader@example.com", "New match", "<p>Hi</p>");

        let err = provider.send(&email).await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(provider.sent_count().await, 0);
    }
}
