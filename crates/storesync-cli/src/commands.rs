//! Command handlers for the CLI.
//!
//! These are called from `main` after the control-plane pool is established
//! and migrations have run. `sync` and `orders` resolve the tenant from the
//! supplied API key exactly like the HTTP surface does, then open a pool
//! against that tenant's target database for the actual work.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use storesync_core::AppConfig;
use storesync_db::{SyncRunRow, TenantRow};
use storesync_engine::{EngineError, SyncOptions, SyncReport};

/// Upsert tenants and their connection descriptors from the tenants file.
///
/// Unlike server boot, which tolerates a missing file, an explicit `seed`
/// invocation treats it as an error.
///
/// # Errors
///
/// Returns an error if the tenants file cannot be read or parsed, or if the
/// seeding transaction fails.
pub(crate) async fn run_seed(pool: &PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let file = storesync_core::load_tenants(&config.tenants_path)?;
    if file.tenants.is_empty() {
        println!(
            "tenants file {} contains no tenants; nothing to seed",
            config.tenants_path.display()
        );
        return Ok(());
    }

    let count = storesync_db::seed_tenants(pool, &config.api_key_hash_salt, &file.tenants).await?;
    println!(
        "seeded {count} tenants from {}",
        config.tenants_path.display()
    );
    Ok(())
}

/// Run one catalog sync for the tenant owning `api_key`, with the same
/// bookkeeping the scheduled and HTTP-triggered paths use: a `sync_runs`
/// row is created up front and marked completed or failed at the end.
///
/// # Errors
///
/// Returns an error if the API key does not match an active tenant, the
/// tenant has no connection descriptor, the tenant pool cannot be opened,
/// or the sync itself fails. Engine failures are recorded on the run row
/// before being propagated.
pub(crate) async fn run_sync(
    pool: &PgPool,
    config: &AppConfig,
    api_key: &str,
) -> anyhow::Result<()> {
    let tenant = resolve_tenant(pool, config, api_key).await?;

    let connection = storesync_db::get_tenant_connection(pool, tenant.id)
        .await?
        .ok_or_else(|| {
            anyhow::anyhow!(
                "tenant '{}' has no connection descriptor; run `seed` first",
                tenant.slug
            )
        })?;

    let run = storesync_db::create_sync_run(pool, tenant.id, "cli").await?;
    if let Err(e) = storesync_db::start_sync_run(pool, run.id).await {
        fail_run_best_effort(pool, run.id, &format!("{e:#}")).await;
        return Err(e.into());
    }

    let tenant_pool = match storesync_db::connect_tenant_pool(
        &connection,
        config.tenant_db_max_connections,
        config.tenant_db_connect_timeout_secs,
    )
    .await
    {
        Ok(p) => p,
        Err(e) => {
            fail_run_best_effort(pool, run.id, &format!("tenant database unreachable: {e}")).await;
            return Err(e.into());
        }
    };

    let options = SyncOptions::from_app_config(config);
    let result = storesync_engine::run_catalog_sync(&tenant_pool, &options).await;
    tenant_pool.close().await;

    match result {
        Ok(report) => {
            if let Err(err) = storesync_db::complete_sync_run(
                pool,
                run.id,
                clamp_count(report.products_processed),
                clamp_count(report.items_created),
                clamp_count(report.items_updated),
            )
            .await
            {
                fail_run_best_effort(pool, run.id, &format!("{err:#}")).await;
                return Err(err.into());
            }
            print_sync_report(&tenant, &run, &report)?;
            Ok(())
        }
        Err(EngineError::SyncInProgress) => {
            fail_run_best_effort(pool, run.id, "another sync already holds the lock").await;
            anyhow::bail!(
                "a sync is already running for tenant '{}'; try again later",
                tenant.slug
            );
        }
        Err(e) => {
            fail_run_best_effort(pool, run.id, &format!("{e}")).await;
            Err(e.into())
        }
    }
}

/// Show recent sync runs across all tenants, newest first.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub(crate) async fn run_list_runs(pool: &PgPool, limit: i64) -> anyhow::Result<()> {
    let runs = storesync_db::list_recent_sync_runs(pool, limit).await?;

    if runs.is_empty() {
        println!("no sync runs recorded; run `sync` first");
        return Ok(());
    }

    let header = format!(
        "{:<38}{:<9}{:<11}{:<11}{:<21}{:<11}{:<9}UPDATED",
        "RUN", "TENANT", "TRIGGER", "STATUS", "STARTED", "PROCESSED", "CREATED"
    );
    println!("{header}");
    for run in &runs {
        println!(
            "{:<38}{:<9}{:<11}{:<11}{:<21}{:<11}{:<9}{}",
            run.public_id,
            run.tenant_id,
            run.trigger_source,
            run.status,
            fmt_timestamp(run.started_at),
            run.products_processed,
            run.items_created,
            run.items_updated
        );
        if let Some(ref message) = run.error_message {
            println!("  error: {message}");
        }
    }

    Ok(())
}

/// Print the completed-orders report for the tenant owning `api_key` as a
/// markdown document on stdout.
///
/// # Errors
///
/// Returns an error if the API key does not match an active tenant, the
/// tenant has no connection descriptor, or the reporting query fails.
pub(crate) async fn run_orders(
    pool: &PgPool,
    config: &AppConfig,
    api_key: &str,
) -> anyhow::Result<()> {
    let tenant = resolve_tenant(pool, config, api_key).await?;

    let connection = storesync_db::get_tenant_connection(pool, tenant.id)
        .await?
        .ok_or_else(|| {
            anyhow::anyhow!(
                "tenant '{}' has no connection descriptor; run `seed` first",
                tenant.slug
            )
        })?;

    let tenant_pool = storesync_db::connect_tenant_pool(
        &connection,
        config.tenant_db_max_connections,
        config.tenant_db_connect_timeout_secs,
    )
    .await?;

    let mut conn = tenant_pool.acquire().await?;
    let rows = storesync_db::tenant::orders::fetch_completed_orders(&mut conn).await?;
    drop(conn);
    tenant_pool.close().await;

    if rows.is_empty() {
        println!("no completed orders for tenant '{}'", tenant.slug);
        return Ok(());
    }

    let now = Utc::now().format("%Y-%m-%d %H:%M UTC");
    let order_count = rows
        .iter()
        .map(|r| r.order_id)
        .collect::<std::collections::BTreeSet<i64>>()
        .len();

    println!("# Completed Orders");
    println!();
    println!("**Generated**: {now}");
    println!("**Tenant**: {}", tenant.name);
    println!("**Orders**: {order_count}");
    println!();
    println!("---");

    let mut current_order: Option<i64> = None;
    for row in &rows {
        if current_order != Some(row.order_id) {
            current_order = Some(row.order_id);

            let customer = format_customer(row.first_name.as_deref(), row.last_name.as_deref());
            println!();
            println!("## Order {} \u{2014} {}", row.order_id, customer);
            println!();
            println!(
                "**Date**: {} | **Total**: {} {} | **Email**: {}",
                row.order_date.format("%Y-%m-%d"),
                row.total_amount,
                row.currency,
                row.email.as_deref().unwrap_or("\u{2014}")
            );
            println!();
            println!("| Product | Qty | Unit | Gross | Net |");
            println!("|---------|-----|------|-------|-----|");
        }

        if let Some(ref name) = row.product_name {
            println!(
                "| {} | {} | {} | {} | {} |",
                name.replace('|', "\\|"),
                row.quantity.unwrap_or(0),
                fmt_amount(row.unit_price),
                fmt_amount(row.gross_revenue),
                fmt_amount(row.net_revenue)
            );
        }
    }

    println!();
    println!("---");
    Ok(())
}

async fn resolve_tenant(
    pool: &PgPool,
    config: &AppConfig,
    api_key: &str,
) -> anyhow::Result<TenantRow> {
    storesync_db::resolve_tenant_by_api_key(pool, &config.api_key_hash_salt, api_key)
        .await?
        .ok_or_else(|| anyhow::anyhow!("API key does not match an active tenant"))
}

/// Mark a run failed without letting the bookkeeping error mask the one
/// that put us here.
async fn fail_run_best_effort(pool: &PgPool, run_id: i64, message: &str) {
    if let Err(e) = storesync_db::fail_sync_run(pool, run_id, message).await {
        tracing::warn!(run_id, error = %e, "failed to mark sync run as failed");
    }
}

fn print_sync_report(
    tenant: &TenantRow,
    run: &SyncRunRow,
    report: &SyncReport,
) -> anyhow::Result<()> {
    println!(
        "sync completed for tenant '{}' (run {})",
        tenant.slug, run.public_id
    );
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// Run counters are `u64` in the engine but `INTEGER` in `sync_runs`.
fn clamp_count(value: u64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn fmt_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map_or_else(
        || "\u{2014}".to_string(),
        |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

fn fmt_amount(value: Option<Decimal>) -> String {
    value.map_or_else(|| "\u{2014}".to_string(), |v| v.to_string())
}

fn format_customer(first: Option<&str>, last: Option<&str>) -> String {
    let joined = [first, last]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<&str>>()
        .join(" ");
    if joined.is_empty() {
        "guest".to_string()
    } else {
        joined
    }
}
