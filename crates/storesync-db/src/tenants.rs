//! Control-plane tenant directory: API-key resolution, connection
//! descriptors, and seeding from the tenants config file.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use storesync_core::auth::hash_api_key;
use storesync_core::tenants::TenantConfig;

use crate::DbError;

/// A row from the `tenants` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TenantRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from the `tenant_connections` table — everything needed to reach
/// one tenant's target database.
#[derive(Clone, sqlx::FromRow)]
pub struct TenantConnectionRow {
    pub tenant_id: i64,
    pub host: String,
    pub port: i32,
    pub database_name: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for TenantConnectionRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantConnectionRow")
            .field("tenant_id", &self.tenant_id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_name", &self.database_name)
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Resolve the active tenant owning the presented API key.
///
/// The key is hashed with the deployment salt and matched against
/// `api_key_hash`; a `None` result is the caller's 401.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn resolve_tenant_by_api_key(
    pool: &PgPool,
    salt: &str,
    api_key: &str,
) -> Result<Option<TenantRow>, DbError> {
    let hash = hash_api_key(api_key, salt);

    let row = sqlx::query_as::<_, TenantRow>(
        "SELECT id, name, slug, is_active, created_at, updated_at \
         FROM tenants \
         WHERE api_key_hash = $1 AND is_active = TRUE",
    )
    .bind(hash)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Fetch the connection descriptor for a tenant, if one is configured.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_tenant_connection(
    pool: &PgPool,
    tenant_id: i64,
) -> Result<Option<TenantConnectionRow>, DbError> {
    let row = sqlx::query_as::<_, TenantConnectionRow>(
        "SELECT tenant_id, host, port, database_name, username, password \
         FROM tenant_connections \
         WHERE tenant_id = $1",
    )
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Build a pool for a tenant's target database from its connection
/// descriptor.
///
/// Options are assembled field-by-field rather than through a URL so that
/// credentials containing URL metacharacters never need escaping. Pools are
/// per-run: callers create one, sync through it, and drop it.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the target database cannot be reached.
pub async fn connect_tenant_pool(
    conn: &TenantConnectionRow,
    max_connections: u32,
    connect_timeout_secs: u64,
) -> Result<PgPool, sqlx::Error> {
    let options = PgConnectOptions::new()
        .host(&conn.host)
        .port(u16::try_from(conn.port).unwrap_or(5432))
        .database(&conn.database_name)
        .username(&conn.username)
        .password(&conn.password);

    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(connect_timeout_secs))
        .connect_with(options)
        .await
}

/// Upsert tenants and their connection descriptors from config.
///
/// Returns the number of tenants processed. All upserts run inside a single
/// transaction; if any operation fails the entire batch is rolled back.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any database operation fails.
pub async fn seed_tenants(
    pool: &PgPool,
    salt: &str,
    tenants: &[TenantConfig],
) -> Result<usize, DbError> {
    let mut tx = pool.begin().await?;
    let mut count = 0usize;

    for tenant in tenants {
        let slug = tenant.slug();
        let key_hash = hash_api_key(&tenant.api_key, salt);

        let tenant_id: i64 = sqlx::query_scalar(
            "INSERT INTO tenants (name, slug, api_key_hash, is_active) \
             VALUES ($1, $2, $3, TRUE) \
             ON CONFLICT (slug) DO UPDATE SET \
                 name = EXCLUDED.name, \
                 api_key_hash = EXCLUDED.api_key_hash, \
                 is_active = TRUE, \
                 updated_at = NOW() \
             RETURNING id",
        )
        .bind(&tenant.name)
        .bind(&slug)
        .bind(&key_hash)
        .fetch_one(&mut *tx)
        .await?;

        let conn = &tenant.connection;
        sqlx::query(
            "INSERT INTO tenant_connections \
                 (tenant_id, host, port, database_name, username, password) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (tenant_id) DO UPDATE SET \
                 host = EXCLUDED.host, \
                 port = EXCLUDED.port, \
                 database_name = EXCLUDED.database_name, \
                 username = EXCLUDED.username, \
                 password = EXCLUDED.password, \
                 updated_at = NOW()",
        )
        .bind(tenant_id)
        .bind(&conn.host)
        .bind(i32::from(conn.port))
        .bind(&conn.database)
        .bind(&conn.username)
        .bind(&conn.password)
        .execute(&mut *tx)
        .await?;

        count += 1;
    }

    tx.commit().await?;
    Ok(count)
}
