//! Saved-Search Digest Worker
//!
//! A background worker that drains the saved-search email queue.
//!
//! ## Architecture
//!
//! ```text
//! saved_search_email_queue (PostgreSQL)
//!   ↓ (QueueScheduler: batch hook every N minutes, cleanup daily)
//! BatchProcessor<PgQueueRepository, P>
//!   ↓ (recover stuck, fetch, claim, send)
//! EmailProvider (SMTP / mock)
//!   ↓
//! Email Delivery
//! ```
//!
//! ## Features
//!
//! - Claim-based locking, safe to run several replicas
//! - Batch settings re-read every `SETTINGS_REFRESH_SECS`
//! - Graceful shutdown handling
//! - Health, stats and metrics endpoints

pub mod config;
pub mod health;
pub mod metrics;

use config::{ProviderKind, WorkerConfig};
use core_config::{Environment, FromEnv, app_info};
use database::postgres::{PostgresConfig, connect_from_config_with_retry, run_migrations};
use domain_saved_search_notifications::{
    BatchProcessor, EmailProvider, EnvSettingsSource, MockProvider, PgQueueRepository,
    QueueScheduler, SettingsSource, SmtpProvider, TemplateEngine, metrics::QueueMetrics,
};
use eyre::{Result, WrapErr};
use health::HealthState;
use migration::Migrator;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Start the health and admin HTTP server
///
/// Stops accepting connections once `shutdown` flips to true.
async fn start_health_server(
    state: HealthState,
    address: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let listener = TcpListener::bind(&address)
        .await
        .wrap_err_with(|| format!("Failed to bind health server to {}", address))?;

    info!(address = %address, "Health server listening");

    axum::serve(listener, health::router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .wrap_err("Health server failed")?;

    Ok(())
}

/// Run the digest worker
///
/// This is the main entry point for the worker. It:
/// 1. Sets up structured logging and metrics
/// 2. Connects to PostgreSQL and applies migrations
/// 3. Selects the email provider (`EMAIL_PROVIDER`)
/// 4. Registers the scheduled hooks and runs until a shutdown signal
///
/// # Errors
///
/// Returns an error if configuration is invalid, the database is unreachable,
/// migrations fail, or the scheduler cannot start.
pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    metrics::init_metrics()?;

    let app_info = app_info!();
    info!(
        name = %app_info.name,
        version = %app_info.version,
        "Starting saved search digest worker"
    );
    info!("Environment: {:?}", environment);

    let config = WorkerConfig::from_env().wrap_err("Failed to load worker configuration")?;
    let pg_config = PostgresConfig::from_env().wrap_err("Failed to load PostgreSQL configuration")?;

    info!("Connecting to PostgreSQL...");
    let db = connect_from_config_with_retry(pg_config, None)
        .await
        .wrap_err("Failed to connect to PostgreSQL")?;
    info!("Connected to PostgreSQL successfully");

    run_migrations::<Migrator>(&db, &app_info.name)
        .await
        .wrap_err("Failed to run migrations")?;

    let repository = PgQueueRepository::new(db);

    match config.provider {
        ProviderKind::Smtp => {
            info!("Using SMTP provider");
            let provider = SmtpProvider::from_env().wrap_err("Failed to configure SMTP provider")?;
            run_with_provider(config, repository, provider, app_info).await
        }
        ProviderKind::Mock => {
            warn!("Using mock email provider; nothing will be delivered");
            run_with_provider(config, repository, MockProvider::new(), app_info).await
        }
    }
}

async fn run_with_provider<P>(
    config: WorkerConfig,
    repository: PgQueueRepository,
    provider: P,
    app_info: core_config::AppInfo,
) -> Result<()>
where
    P: EmailProvider + 'static,
{
    match provider.health_check().await {
        Ok(true) => info!(provider = provider.name(), "Email provider reachable"),
        Ok(false) => warn!(provider = provider.name(), "Email provider health check failed"),
        Err(e) => warn!(
            provider = provider.name(),
            error = %e,
            "Email provider health check errored"
        ),
    }

    let templates = TemplateEngine::new().wrap_err("Failed to initialize template engine")?;
    let settings: Arc<dyn SettingsSource> = Arc::new(EnvSettingsSource::new());

    let health_state = HealthState::new(
        repository.clone(),
        QueueMetrics::new(provider.name()),
        app_info.name,
        app_info.version,
    );

    let processor = BatchProcessor::new(repository, provider).with_templates(Arc::new(templates));
    let scheduler = QueueScheduler::new(processor, Arc::clone(&settings))
        .await
        .wrap_err("Failed to create scheduler")?;

    let current = scheduler.reconcile().await.wrap_err("Failed to register scheduled hooks")?;
    info!(
        enabled = current.enabled,
        batch_size = current.batch_size,
        interval_minutes = current.batch_interval_minutes,
        "Batch settings loaded"
    );
    scheduler.start().await.wrap_err("Failed to start scheduler")?;

    // Set up a shutdown signal
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let health_address = config.health.address();
    let health_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state, health_address, health_shutdown).await {
            error!(error = %e, "Health server failed");
        }
    });

    let mut refresh = tokio::time::interval(config.settings_refresh);
    refresh.tick().await;

    loop {
        tokio::select! {
            _ = refresh.tick() => {
                if let Err(e) = scheduler.reconcile().await {
                    error!(error = %e, "Failed to reconcile scheduled hooks");
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    scheduler.shutdown().await.wrap_err("Failed to stop scheduler")?;
    info!("Saved search digest worker stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }
}
