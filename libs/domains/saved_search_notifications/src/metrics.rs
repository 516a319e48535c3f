//! Prometheus metrics for the email queue
//!
//! Recorded through the `metrics` facade; they are no-ops until the worker
//! installs a recorder.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

use crate::models::QueueStats;
use crate::processor::SkipReason;

/// Queue metrics helper
#[derive(Clone)]
pub struct QueueMetrics {
    /// Provider name for labeling
    provider: &'static str,
}

impl QueueMetrics {
    pub fn new(provider: &'static str) -> Self {
        Self { provider }
    }

    pub fn email_sent(&self) {
        counter!("saved_search_emails_sent_total", "provider" => self.provider).increment(1);
    }

    /// `reason` is one of `error`, `rejected`, `panic`
    pub fn email_failed(&self, reason: &'static str) {
        counter!(
            "saved_search_emails_failed_total",
            "provider" => self.provider,
            "reason" => reason
        )
        .increment(1);
    }

    pub fn claim_lost(&self) {
        counter!("saved_search_emails_claim_lost_total").increment(1);
    }

    pub fn recovered(&self, rows: u64) {
        counter!("saved_search_emails_recovered_total").increment(rows);
    }

    pub fn purged(&self, rows: u64) {
        counter!("saved_search_emails_purged_total").increment(rows);
    }

    pub fn batch_skipped(&self, reason: SkipReason) {
        counter!("saved_search_batches_skipped_total", "reason" => reason.as_str()).increment(1);
    }

    pub fn batch_completed(&self, duration: Duration) {
        histogram!("saved_search_batch_duration_seconds").record(duration.as_secs_f64());
    }

    /// Publish queue depth per status
    pub fn record_stats(&self, stats: &QueueStats) {
        gauge!("saved_search_queue_rows", "status" => "pending").set(stats.pending as f64);
        gauge!("saved_search_queue_rows", "status" => "processing").set(stats.processing as f64);
        gauge!("saved_search_queue_rows", "status" => "sent").set(stats.sent as f64);
        gauge!("saved_search_queue_rows", "status" => "failed").set(stats.failed as f64);
    }
}
