//! Batch processor for the email queue.
//!
//! One [`BatchProcessor::run`] is one scheduled tick: recover stuck rows, fetch
//! the oldest pending rows, claim them, then send each one independently.

use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::error::NotificationResult;
use crate::metrics::QueueMetrics;
use crate::models::{QueueStats, QueuedEmail};
use crate::providers::{EmailContent, EmailProvider, SentEmail};
use crate::repository::QueueRepository;
use crate::settings::{BatchSettings, SettingsSource};
use crate::templates::{TemplateEngine, fallback_html};

/// Why a run did no delivery work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Batching is switched off
    Disabled,
    /// Nothing pending
    Empty,
    /// Another worker claimed every fetched row first
    LostRace,
    /// The store failed before anything was claimed
    StoreUnavailable,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Disabled => "disabled",
            SkipReason::Empty => "empty",
            SkipReason::LostRace => "lost_race",
            SkipReason::StoreUnavailable => "store_unavailable",
        }
    }
}

/// Summary of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Stuck rows returned to pending
    pub recovered: u64,
    pub fetched: usize,
    /// Rows this run won in the claim
    pub claimed: u64,
    pub sent: usize,
    pub failed: usize,
    pub skipped: Option<SkipReason>,
}

impl BatchReport {
    fn skip(mut self, reason: SkipReason) -> Self {
        self.skipped = Some(reason);
        self
    }
}

/// Why a single send did not go through
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryFailure {
    #[error("{0}")]
    Provider(String),

    #[error("rejected by {provider}")]
    Rejected { provider: &'static str },

    #[error("panic during send: {0}")]
    Panicked(String),
}

impl DeliveryFailure {
    fn metric_reason(&self) -> &'static str {
        match self {
            DeliveryFailure::Provider(_) => "error",
            DeliveryFailure::Rejected { .. } => "rejected",
            DeliveryFailure::Panicked(_) => "panic",
        }
    }
}

/// Drains the queue through an email provider.
pub struct BatchProcessor<R: QueueRepository, P: EmailProvider> {
    repository: Arc<R>,
    provider: Arc<P>,
    templates: Option<Arc<TemplateEngine>>,
    metrics: QueueMetrics,
}

impl<R: QueueRepository, P: EmailProvider> BatchProcessor<R, P> {
    pub fn new(repository: R, provider: P) -> Self {
        Self::with_arcs(Arc::new(repository), Arc::new(provider))
    }

    /// Create a processor sharing already Arc-wrapped dependencies.
    pub fn with_arcs(repository: Arc<R>, provider: Arc<P>) -> Self {
        let metrics = QueueMetrics::new(provider.name());
        Self {
            repository,
            provider,
            templates: None,
            metrics,
        }
    }

    /// Wrap messages with the engine's HTML layout before sending.
    pub fn with_templates(mut self, templates: Arc<TemplateEngine>) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Load settings fresh from `source` and run once.
    pub async fn run_scheduled(&self, source: &dyn SettingsSource) -> BatchReport {
        let settings = source.batch_settings();
        self.run(&settings).await
    }

    /// Process one batch. Never fails; problems are logged and reported.
    #[instrument(skip(self, settings), fields(batch_size = settings.batch_size))]
    pub async fn run(&self, settings: &BatchSettings) -> BatchReport {
        let report = BatchReport::default();

        // Checked even when scheduled: a tick can fire after batching was switched off
        if !settings.enabled {
            debug!("Batching disabled, skipping run");
            return self.skipped(report, SkipReason::Disabled);
        }

        let started = Instant::now();
        let report = self.process(settings, report).await;

        match report.skipped {
            Some(reason) => self.metrics.batch_skipped(reason),
            None => {
                self.metrics.batch_completed(started.elapsed());
                info!(
                    fetched = report.fetched,
                    claimed = report.claimed,
                    sent = report.sent,
                    failed = report.failed,
                    recovered = report.recovered,
                    "Batch run completed"
                );
            }
        }

        report
    }

    async fn process(&self, settings: &BatchSettings, mut report: BatchReport) -> BatchReport {
        match self.repository.reset_stuck_records().await {
            Ok(recovered) => {
                report.recovered = recovered;
                if recovered > 0 {
                    self.metrics.recovered(recovered);
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to reset stuck rows, skipping run");
                return report.skip(SkipReason::StoreUnavailable);
            }
        }

        let batch = match self.repository.get_pending(settings.batch_size).await {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "Failed to fetch pending rows, skipping run");
                return report.skip(SkipReason::StoreUnavailable);
            }
        };

        report.fetched = batch.len();
        if batch.is_empty() {
            debug!("No pending saved search emails");
            return report.skip(SkipReason::Empty);
        }

        let ids: Vec<i64> = batch.iter().map(|email| email.id).collect();
        report.claimed = match self.repository.mark_processing(&ids).await {
            Ok(claimed) => claimed,
            Err(e) => {
                error!(error = %e, "Failed to claim pending rows, skipping run");
                return report.skip(SkipReason::StoreUnavailable);
            }
        };

        if report.claimed == 0 {
            info!(fetched = report.fetched, "Batch already claimed by another worker");
            self.metrics.claim_lost();
            return report.skip(SkipReason::LostRace);
        }

        // Every fetched row is dispatched, in fetch order
        for email in &batch {
            match self.dispatch(email).await {
                Ok(sent) => {
                    report.sent += 1;
                    self.metrics.email_sent();
                    debug!(
                        email_id = email.id,
                        message_id = ?sent.message_id,
                        "Saved search email sent"
                    );

                    if let Err(e) = self.repository.mark_sent(email.id).await {
                        error!(
                            email_id = email.id,
                            error = %e,
                            "Sent email could not be marked as sent"
                        );
                    }
                }
                Err(failure) => {
                    report.failed += 1;
                    self.metrics.email_failed(failure.metric_reason());
                    warn!(email_id = email.id, error = %failure, "Saved search email failed");

                    let message = failure.to_string();
                    if let Err(e) = self.repository.mark_failed(email.id, &message).await {
                        error!(
                            email_id = email.id,
                            error = %e,
                            "Failed email could not be recorded"
                        );
                    }
                }
            }
        }

        report
    }

    /// Send one row; panics inside the provider become failures.
    async fn dispatch(&self, email: &QueuedEmail) -> Result<SentEmail, DeliveryFailure> {
        let attempt = AssertUnwindSafe(async {
            let content = self.compose(email);
            self.provider.send(&content).await
        })
        .catch_unwind()
        .await;

        match attempt {
            Ok(Ok(sent)) if sent.accepted => Ok(sent),
            Ok(Ok(_)) => Err(DeliveryFailure::Rejected {
                provider: self.provider.name(),
            }),
            Ok(Err(e)) => Err(DeliveryFailure::Provider(e.to_string())),
            Err(payload) => Err(DeliveryFailure::Panicked(panic_message(payload.as_ref()))),
        }
    }

    fn compose(&self, email: &QueuedEmail) -> EmailContent {
        let html_body = match &self.templates {
            Some(templates) => templates
                .wrap_message(&email.subject, &email.message)
                .unwrap_or_else(|e| {
                    warn!(email_id = email.id, error = %e, "Layout failed, using plain envelope");
                    fallback_html(&email.message)
                }),
            None => fallback_html(&email.message),
        };

        EmailContent::html(email.recipient_email.clone(), email.subject.clone(), html_body)
    }

    /// Delete terminal rows past retention; store errors are logged and count as 0.
    pub async fn cleanup(&self) -> u64 {
        match self.repository.cleanup_old_records().await {
            Ok(purged) => {
                self.metrics.purged(purged);
                info!(purged, "Saved search email queue cleanup finished");
                purged
            }
            Err(e) => {
                error!(error = %e, "Saved search email queue cleanup failed");
                0
            }
        }
    }

    /// Current row counts, also published as gauges.
    pub async fn stats(&self) -> NotificationResult<QueueStats> {
        let stats = self.repository.stats().await?;
        self.metrics.record_stats(&stats);
        Ok(stats)
    }

    fn skipped(&self, report: BatchReport, reason: SkipReason) -> BatchReport {
        self.metrics.batch_skipped(reason);
        report.skip(reason)
    }
}

impl<R: QueueRepository, P: EmailProvider> Clone for BatchProcessor<R, P> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            provider: Arc::clone(&self.provider),
            templates: self.templates.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
