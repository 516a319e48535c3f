//! Periodic triggers for the batch processor and queue cleanup.
//!
//! Two hooks are kept registered while batching is enabled: the batch run
//! every `batch_interval_minutes`, and the retention cleanup once a day.
//! [`QueueScheduler::reconcile`] brings the registered jobs in line with the
//! current settings and can be called as often as needed.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::NotificationResult;
use crate::processor::BatchProcessor;
use crate::providers::EmailProvider;
use crate::repository::QueueRepository;
use crate::settings::{BatchSettings, SettingsSource};

pub const BATCH_PROCESS_HOOK: &str = "saved_search_batch_process";
pub const QUEUE_CLEANUP_HOOK: &str = "saved_search_queue_cleanup";

/// Cleanup runs daily
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Scheduled hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    BatchProcess,
    QueueCleanup,
}

impl Hook {
    pub fn as_str(&self) -> &'static str {
        match self {
            Hook::BatchProcess => BATCH_PROCESS_HOOK,
            Hook::QueueCleanup => QUEUE_CLEANUP_HOOK,
        }
    }
}

impl std::fmt::Display for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    job_id: Uuid,
    interval: Duration,
}

/// Keeps the batch and cleanup jobs registered according to settings.
pub struct QueueScheduler<R: QueueRepository, P: EmailProvider> {
    scheduler: JobScheduler,
    processor: BatchProcessor<R, P>,
    settings: Arc<dyn SettingsSource>,
    registrations: Mutex<HashMap<Hook, Registration>>,
}

impl<R, P> QueueScheduler<R, P>
where
    R: QueueRepository + 'static,
    P: EmailProvider + 'static,
{
    pub async fn new(
        processor: BatchProcessor<R, P>,
        settings: Arc<dyn SettingsSource>,
    ) -> NotificationResult<Self> {
        Ok(Self {
            scheduler: JobScheduler::new().await?,
            processor,
            settings,
            registrations: Mutex::new(HashMap::new()),
        })
    }

    /// Register or drop hooks to match the current settings.
    ///
    /// Enabled: both hooks are registered, and the batch hook is replaced when
    /// its interval changed. Disabled: both hooks are removed.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> NotificationResult<BatchSettings> {
        let settings = self.settings.batch_settings();

        if settings.enabled {
            self.ensure(Hook::BatchProcess, settings.interval()).await?;
            self.ensure(Hook::QueueCleanup, CLEANUP_INTERVAL).await?;
        } else {
            self.unregister(Hook::BatchProcess).await?;
            self.unregister(Hook::QueueCleanup).await?;
        }

        Ok(settings)
    }

    async fn ensure(&self, hook: Hook, interval: Duration) -> NotificationResult<()> {
        let current = self.registrations.lock().await.get(&hook).copied();

        match current {
            Some(registration) if registration.interval == interval => Ok(()),
            Some(_) => {
                self.unregister(hook).await?;
                self.register_every(hook, interval).await
            }
            None => self.register_every(hook, interval).await,
        }
    }

    pub(crate) async fn register_every(
        &self,
        hook: Hook,
        interval: Duration,
    ) -> NotificationResult<()> {
        let job = self.build_job(hook, interval)?;
        let job_id = self.scheduler.add(job).await?;

        self.registrations
            .lock()
            .await
            .insert(hook, Registration { job_id, interval });

        info!(
            hook = %hook,
            interval_secs = interval.as_secs(),
            %job_id,
            "Registered scheduled hook"
        );
        Ok(())
    }

    fn build_job(&self, hook: Hook, interval: Duration) -> NotificationResult<Job> {
        let processor = self.processor.clone();

        let job = match hook {
            Hook::BatchProcess => {
                let settings = Arc::clone(&self.settings);
                Job::new_repeated_async(interval, move |_uuid, _l| {
                    let processor = processor.clone();
                    let settings = Arc::clone(&settings);

                    Box::pin(async move {
                        processor.run_scheduled(settings.as_ref()).await;
                    })
                })?
            }
            Hook::QueueCleanup => Job::new_repeated_async(interval, move |_uuid, _l| {
                let processor = processor.clone();

                Box::pin(async move {
                    processor.cleanup().await;
                })
            })?,
        };

        Ok(job)
    }

    /// Remove a hook; returns whether it was registered.
    pub async fn unregister(&self, hook: Hook) -> NotificationResult<bool> {
        let Some(registration) = self.registrations.lock().await.remove(&hook) else {
            return Ok(false);
        };

        self.scheduler.remove(&registration.job_id).await?;
        info!(hook = %hook, "Unregistered scheduled hook");
        Ok(true)
    }

    pub async fn is_registered(&self, hook: Hook) -> bool {
        self.registrations.lock().await.contains_key(&hook)
    }

    /// Interval the hook is registered with
    pub async fn interval(&self, hook: Hook) -> Option<Duration> {
        self.registrations
            .lock()
            .await
            .get(&hook)
            .map(|registration| registration.interval)
    }

    /// When the hook fires next, if it is registered
    pub async fn next_run(&self, hook: Hook) -> NotificationResult<Option<DateTime<Utc>>> {
        let Some(registration) = self.registrations.lock().await.get(&hook).copied() else {
            return Ok(None);
        };

        let mut scheduler = self.scheduler.clone();
        Ok(scheduler.next_tick_for_job(registration.job_id).await?)
    }

    pub async fn start(&self) -> NotificationResult<()> {
        self.scheduler.start().await?;
        info!("Queue scheduler started");
        Ok(())
    }

    pub async fn shutdown(&self) -> NotificationResult<()> {
        let mut scheduler = self.scheduler.clone();
        scheduler.shutdown().await?;
        info!("Queue scheduler stopped");
        Ok(())
    }

    pub fn processor(&self) -> &BatchProcessor<R, P> {
        &self.processor
    }
}
