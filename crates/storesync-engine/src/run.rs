//! Run orchestration: the per-catalog advisory lock, the transactional
//! core, and the post-commit image and housekeeping phases.

use std::time::Instant;

use serde::Serialize;
use sqlx::{Acquire, PgConnection, PgPool};
use storesync_core::AppConfig;
use storesync_db::tenant::orders::delete_stale_draft_orders;

use crate::error::EngineError;
use crate::images;
use crate::reconcile;

/// Advisory lock key serializing synchronization runs. Advisory locks are
/// scoped to the database the session is connected to, so a single constant
/// serializes runs per tenant database without cross-tenant interference.
pub const SYNC_LOCK_KEY: i64 = 0x5354_4f52_4553_594e;

/// Author recorded on created items when the caller does not override it.
const DEFAULT_AUTHOR_ID: i64 = 1;

/// Tunables for one synchronization run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Source rows per batch, and rows per image batch.
    pub batch_size: usize,
    /// Base URL under which attachment files are served.
    pub media_base_url: String,
    /// Author id stamped on created items and attachments.
    pub author_id: i64,
}

impl SyncOptions {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            batch_size: config.sync_batch_size,
            media_base_url: config.media_base_url.clone(),
            author_id: DEFAULT_AUTHOR_ID,
        }
    }
}

/// Counters for one completed run.
#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    pub products_processed: u64,
    pub items_created: u64,
    pub items_updated: u64,
    pub relationships_added: u64,
    pub relationships_removed: u64,
    pub attachments_created: u64,
    pub attachments_reused: u64,
    pub drafts_deleted: u64,
    pub elapsed_ms: u64,
}

/// Run one full catalog synchronization against a tenant database.
///
/// Acquires a single connection, takes the advisory lock, and executes the
/// transactional core (taxonomy, items, attributes, relationships, counts,
/// cache purge) followed by the per-batch image phase and the best-effort
/// draft cleanup. The core is all-or-nothing; the later phases are separate
/// units of failure by design of the schema contract.
///
/// # Errors
///
/// - [`EngineError::SyncInProgress`] if another run holds the lock.
/// - [`EngineError::Db`] on any database failure; the transactional core
///   has rolled back when this is returned.
pub async fn run_catalog_sync(
    pool: &PgPool,
    options: &SyncOptions,
) -> Result<SyncReport, EngineError> {
    let mut conn = pool.acquire().await?;

    if !try_acquire_sync_lock(&mut conn).await? {
        return Err(EngineError::SyncInProgress);
    }

    let result = run_locked(&mut conn, options).await;
    release_sync_lock(&mut conn).await;
    result
}

async fn run_locked(
    conn: &mut PgConnection,
    options: &SyncOptions,
) -> Result<SyncReport, EngineError> {
    let started = Instant::now();

    let mut tx = conn.begin().await?;
    let core = reconcile::reconcile_products(&mut *tx, options).await?;
    tx.commit().await?;

    tracing::info!(
        processed = core.products_processed,
        created = core.items_created,
        updated = core.items_updated,
        relationships_added = core.relationships_added,
        relationships_removed = core.relationships_removed,
        "product reconciliation committed"
    );

    let images = images::attach_catalog_images(&mut *conn, options).await?;

    let mut report = SyncReport {
        products_processed: core.products_processed,
        items_created: core.items_created,
        items_updated: core.items_updated,
        relationships_added: core.relationships_added,
        relationships_removed: core.relationships_removed,
        attachments_created: images.attachments_created,
        attachments_reused: images.attachments_reused,
        drafts_deleted: 0,
        elapsed_ms: 0,
    };

    // Post-commit housekeeping: a failure here never undoes the sync.
    match delete_stale_draft_orders(&mut *conn).await {
        Ok(deleted) => {
            report.drafts_deleted = deleted;
            if deleted > 0 {
                tracing::info!(deleted, "removed stale checkout drafts");
            }
        }
        Err(e) => tracing::warn!(error = %e, "stale draft cleanup failed"),
    }

    report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    Ok(report)
}

async fn try_acquire_sync_lock(conn: &mut PgConnection) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_lock($1)")
        .bind(SYNC_LOCK_KEY)
        .fetch_one(conn)
        .await
}

/// The lock is session-scoped and the session outlives the run when the
/// connection returns to the pool, so release explicitly. When the
/// connection itself has died the server has already dropped the lock, and
/// the failed unlock is only worth a warning.
async fn release_sync_lock(conn: &mut PgConnection) {
    if let Err(e) = sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(SYNC_LOCK_KEY)
        .execute(conn)
        .await
    {
        tracing::warn!(error = %e, "failed to release sync advisory lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_report_is_serializable() {
        let report = SyncReport {
            products_processed: 12,
            items_created: 3,
            items_updated: 9,
            relationships_added: 5,
            relationships_removed: 1,
            attachments_created: 4,
            attachments_reused: 2,
            drafts_deleted: 1,
            elapsed_ms: 250,
        };
        let json = serde_json::to_string(&report).expect("serialize report");
        assert!(json.contains("\"products_processed\":12"));
        assert!(json.contains("\"attachments_reused\":2"));
    }

    #[test]
    fn sync_options_come_from_app_config() {
        let config = AppConfig {
            database_url: "postgres://localhost/control".to_string(),
            env: storesync_core::Environment::Test,
            bind_addr: "127.0.0.1:3000".parse().expect("addr"),
            log_level: "info".to_string(),
            tenants_path: "./config/tenants.yaml".into(),
            api_key_hash_salt: "salt".to_string(),
            service_api_key: None,
            db_max_connections: 10,
            db_min_connections: 1,
            db_acquire_timeout_secs: 10,
            tenant_db_max_connections: 5,
            tenant_db_connect_timeout_secs: 10,
            sync_batch_size: 250,
            sync_time_ceiling_secs: 3600,
            sync_schedule: "0 0 3 * * *".to_string(),
            media_base_url: "https://cdn.acme.test/uploads".to_string(),
            listing_base_url: None,
            listing_timeout_secs: 30,
        };

        let options = SyncOptions::from_app_config(&config);
        assert_eq!(options.batch_size, 250);
        assert_eq!(options.media_base_url, "https://cdn.acme.test/uploads");
        assert_eq!(options.author_id, DEFAULT_AUTHOR_ID);
    }
}
