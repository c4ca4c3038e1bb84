//! The `site_options` key/value table — only the cached-fragment purge.

use sqlx::PgConnection;
use storesync_core::catalog::CACHED_OPTION_PREFIX;

/// Remove every cached page fragment so storefront pages rebuild against
/// the freshly synced catalog. Runs inside the core transaction.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the delete fails.
pub async fn purge_cached_options(conn: &mut PgConnection) -> Result<u64, sqlx::Error> {
    let pattern = format!("{CACHED_OPTION_PREFIX}%");

    let result = sqlx::query("DELETE FROM site_options WHERE name LIKE $1")
        .bind(pattern)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}
