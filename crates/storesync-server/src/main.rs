mod api;
mod middleware;
mod runner;
mod scheduler;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(storesync_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = storesync_db::PoolConfig::from_app_config(&config);
    let pool = storesync_db::connect_pool(&config.database_url, pool_config).await?;
    storesync_db::run_migrations(&pool).await?;

    seed_tenants_from_file(&pool, &config).await?;

    let _scheduler = scheduler::build_scheduler(pool.clone(), Arc::clone(&config)).await?;

    let auth = AuthState::new(pool.clone(), &config.api_key_hash_salt);
    let app = build_app(
        AppState {
            pool,
            config: Arc::clone(&config),
        },
        auth,
        default_rate_limit_state(),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Upsert tenants from the YAML file into the control plane at startup.
/// A missing file is tolerated so a fresh deployment can boot before any
/// tenant is onboarded.
async fn seed_tenants_from_file(
    pool: &sqlx::PgPool,
    config: &storesync_core::AppConfig,
) -> anyhow::Result<()> {
    if !config.tenants_path.exists() {
        tracing::warn!(
            path = %config.tenants_path.display(),
            "tenants file missing; no tenants seeded"
        );
        return Ok(());
    }

    let file = storesync_core::load_tenants(&config.tenants_path)?;
    let seeded = storesync_db::seed_tenants(pool, &config.api_key_hash_salt, &file.tenants).await?;
    tracing::info!(count = seeded, "tenants seeded from config");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
