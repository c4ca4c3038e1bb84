//! Shared sync-run orchestration for the API trigger and the scheduler.
//!
//! One entry point owns the whole run lifecycle: record the run in
//! `sync_runs`, resolve the tenant's target database, drive the engine under
//! the configured time ceiling, and close out the bookkeeping row. Callers
//! translate [`RunFailure`] into their own error surface.

use std::time::Duration;

use sqlx::PgPool;
use storesync_core::AppConfig;
use storesync_db::SyncRunRow;
use storesync_engine::{EngineError, SyncOptions, SyncReport};
use thiserror::Error;

/// Why a sync run did not produce a report.
#[derive(Debug, Error)]
pub enum RunFailure {
    #[error("tenant database connection is not configured")]
    TenantNotConfigured,
    #[error("another sync run is already in progress")]
    SyncInProgress,
    #[error("sync run exceeded the {ceiling_secs}s time ceiling")]
    TimedOut { ceiling_secs: u64 },
    #[error("tenant database is unreachable: {0}")]
    TenantUnreachable(sqlx::Error),
    #[error(transparent)]
    Engine(EngineError),
    #[error("control-plane bookkeeping failed: {0}")]
    Control(storesync_db::DbError),
}

/// A finished run: the bookkeeping row as created, plus the engine report.
#[derive(Debug)]
pub struct RunOutcome {
    pub run: SyncRunRow,
    pub report: SyncReport,
}

/// Execute one catalog sync for a tenant with full `sync_runs` bookkeeping.
///
/// The run row is created first so every failure mode after that point is
/// recorded against it. The engine runs under `sync_time_ceiling_secs`; on
/// timeout the engine future is dropped, which rolls back its open
/// transaction, and the tenant pool is closed so the advisory lock goes
/// away with the session.
///
/// # Errors
///
/// Returns [`RunFailure`] describing which stage went wrong; except for
/// bookkeeping-creation failures the run row is already marked `failed`.
pub async fn run_tenant_sync(
    control_pool: &PgPool,
    config: &AppConfig,
    tenant_id: i64,
    trigger_source: &str,
) -> Result<RunOutcome, RunFailure> {
    let run = storesync_db::create_sync_run(control_pool, tenant_id, trigger_source)
        .await
        .map_err(RunFailure::Control)?;
    storesync_db::start_sync_run(control_pool, run.id)
        .await
        .map_err(RunFailure::Control)?;

    let connection = match storesync_db::get_tenant_connection(control_pool, tenant_id).await {
        Ok(Some(row)) => row,
        Ok(None) => return fail(control_pool, run.id, RunFailure::TenantNotConfigured).await,
        Err(e) => return fail(control_pool, run.id, RunFailure::Control(e)).await,
    };

    let tenant_pool = match storesync_db::connect_tenant_pool(
        &connection,
        config.tenant_db_max_connections,
        config.tenant_db_connect_timeout_secs,
    )
    .await
    {
        Ok(pool) => pool,
        Err(e) => return fail(control_pool, run.id, RunFailure::TenantUnreachable(e)).await,
    };

    let options = SyncOptions::from_app_config(config);
    let ceiling = Duration::from_secs(config.sync_time_ceiling_secs);
    let outcome = tokio::time::timeout(
        ceiling,
        storesync_engine::run_catalog_sync(&tenant_pool, &options),
    )
    .await;
    tenant_pool.close().await;

    match outcome {
        Ok(Ok(report)) => {
            complete(control_pool, run.id, &report).await;
            Ok(RunOutcome { run, report })
        }
        Ok(Err(EngineError::SyncInProgress)) => {
            fail(control_pool, run.id, RunFailure::SyncInProgress).await
        }
        Ok(Err(e)) => fail(control_pool, run.id, RunFailure::Engine(e)).await,
        Err(_) => {
            let failure = RunFailure::TimedOut {
                ceiling_secs: config.sync_time_ceiling_secs,
            };
            fail(control_pool, run.id, failure).await
        }
    }
}

/// Mark the run failed with the failure's message, then hand the failure
/// back to the caller. Bookkeeping errors degrade to a warning.
async fn fail(
    control_pool: &PgPool,
    run_id: i64,
    failure: RunFailure,
) -> Result<RunOutcome, RunFailure> {
    if let Err(e) = storesync_db::fail_sync_run(control_pool, run_id, &failure.to_string()).await {
        tracing::warn!(run_id, error = %e, "failed to mark sync run failed");
    }
    Err(failure)
}

async fn complete(control_pool: &PgPool, run_id: i64, report: &SyncReport) {
    let result = storesync_db::complete_sync_run(
        control_pool,
        run_id,
        clamp_count(report.products_processed),
        clamp_count(report.items_created),
        clamp_count(report.items_updated),
    )
    .await;

    if let Err(e) = result {
        tracing::warn!(run_id, error = %e, "failed to mark sync run succeeded");
    }
}

/// Report counters are `u64`; the bookkeeping columns are `INTEGER`.
fn clamp_count(value: u64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
