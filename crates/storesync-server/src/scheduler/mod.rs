//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the
//! recurring catalog sync job when a service API key is configured.

use std::sync::Arc;

use sqlx::PgPool;
use storesync_core::AppConfig;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::runner::{run_tenant_sync, RunFailure};

/// Builds and starts the background job scheduler.
///
/// The sync job is only registered when `STORESYNC_SERVICE_API_KEY` is set;
/// the key is resolved to a tenant exactly like an HTTP request would be.
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process — dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    pool: PgPool,
    config: Arc<AppConfig>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    if config.service_api_key.is_some() {
        register_sync_job(&scheduler, pool, config).await?;
    } else {
        tracing::info!("STORESYNC_SERVICE_API_KEY not set; scheduled sync disabled");
    }

    scheduler.start().await?;
    Ok(scheduler)
}

/// Register the recurring catalog sync on the configured cron schedule
/// (default `0 0 3 * * *`, nightly at 03:00 UTC).
async fn register_sync_job(
    scheduler: &JobScheduler,
    pool: PgPool,
    config: Arc<AppConfig>,
) -> Result<(), JobSchedulerError> {
    let pool = Arc::new(pool);
    let schedule = config.sync_schedule.clone();

    let job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
        let pool = Arc::clone(&pool);
        let config = Arc::clone(&config);

        Box::pin(async move {
            tracing::info!("scheduler: starting catalog sync run");
            run_scheduled_sync(&pool, &config).await;
            tracing::info!("scheduler: catalog sync run complete");
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

/// Resolve the service key to its tenant and drive one sync run.
/// Every failure is logged and swallowed; the job must never crash.
async fn run_scheduled_sync(pool: &PgPool, config: &AppConfig) {
    let Some(service_key) = config.service_api_key.as_deref() else {
        // The job is only registered when the key is set.
        return;
    };

    let tenant = match storesync_db::resolve_tenant_by_api_key(
        pool,
        &config.api_key_hash_salt,
        service_key,
    )
    .await
    {
        Ok(Some(tenant)) => tenant,
        Ok(None) => {
            tracing::error!("scheduler: service API key does not match an active tenant");
            return;
        }
        Err(e) => {
            tracing::error!(error = %e, "scheduler: tenant lookup failed");
            return;
        }
    };

    match run_tenant_sync(pool, config, tenant.id, "scheduled").await {
        Ok(outcome) => {
            tracing::info!(
                tenant = %tenant.slug,
                processed = outcome.report.products_processed,
                created = outcome.report.items_created,
                updated = outcome.report.items_updated,
                elapsed_ms = outcome.report.elapsed_ms,
                "scheduler: catalog sync succeeded"
            );
        }
        Err(RunFailure::SyncInProgress) => {
            tracing::warn!(tenant = %tenant.slug, "scheduler: sync already in progress; skipped");
        }
        Err(e) => {
            tracing::error!(tenant = %tenant.slug, error = %e, "scheduler: catalog sync failed");
        }
    }
}
