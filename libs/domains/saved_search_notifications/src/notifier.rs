//! Entry point for saved-search match events.
//!
//! With batching enabled a match is rendered and queued for the next batch
//! run; otherwise it is sent right away through the provider.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::error::{NotificationError, NotificationResult};
use crate::models::{EnqueueOutcome, NewQueuedEmail, SavedSearchMatch};
use crate::providers::{EmailContent, EmailProvider};
use crate::repository::QueueRepository;
use crate::settings::SettingsSource;
use crate::templates::{TemplateEngine, fallback_html};

/// What happened to a match notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotifyOutcome {
    Queued { id: i64 },
    /// Same recipient, post and search already waiting in the queue
    Duplicate,
    SentImmediately { message_id: Option<String> },
}

pub struct SavedSearchNotifier<R: QueueRepository, P: EmailProvider> {
    repository: Arc<R>,
    provider: Arc<P>,
    templates: Arc<TemplateEngine>,
    settings: Arc<dyn SettingsSource>,
}

impl<R: QueueRepository, P: EmailProvider> SavedSearchNotifier<R, P> {
    pub fn new(
        repository: Arc<R>,
        provider: Arc<P>,
        templates: Arc<TemplateEngine>,
        settings: Arc<dyn SettingsSource>,
    ) -> Self {
        Self {
            repository,
            provider,
            templates,
            settings,
        }
    }

    #[instrument(
        skip(self, event),
        fields(saved_search_id = event.saved_search.id, post_id = event.post.id)
    )]
    pub async fn notify(&self, event: &SavedSearchMatch) -> NotificationResult<NotifyOutcome> {
        let rendered = self.templates.render_match(event)?;

        let input = NewQueuedEmail {
            recipient_email: event.saved_search.user_email.clone(),
            recipient_id: event.saved_search.user_id,
            post_id: event.post.id,
            saved_search_id: event.saved_search.id,
            post_type: event.post.post_type.clone(),
            subject: rendered.subject,
            message: rendered.message,
        };
        input.validate()?;

        if self.settings.batch_settings().enabled {
            return match self.repository.enqueue(input).await? {
                EnqueueOutcome::Queued(id) => Ok(NotifyOutcome::Queued { id }),
                EnqueueOutcome::Duplicate => Ok(NotifyOutcome::Duplicate),
            };
        }

        self.send_now(input, &event.saved_search.user_name).await
    }

    async fn send_now(
        &self,
        input: NewQueuedEmail,
        to_name: &str,
    ) -> NotificationResult<NotifyOutcome> {
        let html_body = self
            .templates
            .wrap_message(&input.subject, &input.message)
            .unwrap_or_else(|e| {
                warn!(error = %e, "Layout failed, using plain envelope");
                fallback_html(&input.message)
            });

        let content = EmailContent {
            to_email: input.recipient_email,
            to_name: to_name.to_string(),
            subject: input.subject,
            html_body,
            text_body: String::new(),
        };

        let sent = self.provider.send(&content).await?;
        if !sent.accepted {
            return Err(NotificationError::Rejected {
                provider: self.provider.name(),
            });
        }

        info!(
            to = %content.to_email,
            message_id = ?sent.message_id,
            "Saved search email sent immediately"
        );
        Ok(NotifyOutcome::SentImmediately {
            message_id: sent.message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchedPost, SavedSearch};
    use crate::providers::{MockOutcome, MockProvider};
    use crate::repository::MockQueueRepository;
    use crate::settings::{BatchSettings, MemorySettingsSource};

    fn event(email: &str) -> SavedSearchMatch {
        SavedSearchMatch {
            saved_search: SavedSearch {
                id: 3,
                user_id: 5,
                user_email: email.to_string(),
                user_name: "Ada".to_string(),
                title: "Lofts".to_string(),
            },
            post: MatchedPost {
                id: 10,
                post_type: "places".to_string(),
                title: "Sunny loft".to_string(),
                url: "https://example.com/places/sunny-loft".to_string(),
            },
        }
    }

    fn notifier(
        repo: MockQueueRepository,
        provider: MockProvider,
        batching: bool,
    ) -> SavedSearchNotifier<MockQueueRepository, MockProvider> {
        let settings = BatchSettings {
            enabled: batching,
            ..BatchSettings::default()
        };
        SavedSearchNotifier::new(
            Arc::new(repo),
            Arc::new(provider),
            Arc::new(TemplateEngine::new().unwrap()),
            Arc::new(MemorySettingsSource::from_batch_settings(settings)),
        )
    }

    #[tokio::test]
    async fn test_batching_enabled_enqueues_rendered_email() {
        let mut repo = MockQueueRepository::new();
        repo.expect_enqueue()
            .withf(|input| {
                input.recipient_id == 5
                    && input.post_id == 10
                    && input.saved_search_id == 3
                    && input.subject.contains("Sunny loft")
                    && input.message.contains("https://example.com/places/sunny-loft")
            })
            .times(1)
            .returning(|_| Ok(EnqueueOutcome::Queued(1)));

        let notifier = notifier(repo, MockProvider::new(), true);
        let outcome = notifier.notify(&event("reader@example.com")).await.unwrap();

        assert_eq!(outcome, NotifyOutcome::Queued { id: 1 });
    }

    #[tokio::test]
    async fn test_duplicate_is_not_an_error() {
        let mut repo = MockQueueRepository::new();
        repo.expect_enqueue().returning(|_| Ok(EnqueueOutcome::Duplicate));

        let notifier = notifier(repo, MockProvider::new(), true);
        let outcome = notifier.notify(&event("reader@example.com")).await.unwrap();

        assert_eq!(outcome, NotifyOutcome::Duplicate);
    }

    #[tokio::test]
    async fn test_batching_disabled_sends_immediately() {
        let notifier = notifier(MockQueueRepository::new(), MockProvider::new(), false);
        let outcome = notifier.notify(&event("reader@example.com")).await.unwrap();

        assert_eq!(
            outcome,
            NotifyOutcome::SentImmediately {
                message_id: Some("mock-1".to_string())
            }
        );
        let sent = notifier.provider.sent_emails().await;
        assert_eq!(sent[0].to_name, "Ada");
        assert!(sent[0].html_body.starts_with("<!DOCTYPE html>"));
    }

    #[tokio::test]
    async fn test_immediate_rejection_is_an_error() {
        let provider = MockProvider::new();
        provider.then(MockOutcome::Reject).await;

        let notifier = notifier(MockQueueRepository::new(), provider, false);
        let err = notifier.notify(&event("reader@example.com")).await.unwrap_err();

        assert!(matches!(err, NotificationError::Rejected { provider: "Mock" }));
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_rejected_before_queueing() {
        // No enqueue expectation: reaching the store would panic
        let notifier = notifier(MockQueueRepository::new(), MockProvider::new(), true);
        let err = notifier.notify(&event("not-an-email")).await.unwrap_err();

        assert!(matches!(err, NotificationError::Validation(_)));
    }
}
