//! Read access to the `source_products` staging table.

use rust_decimal::Decimal;
use sqlx::PgConnection;

/// A staged catalog row as delivered by the tenant's upstream system.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SourceProductRow {
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub brand: Option<String>,
    /// JSON-encoded ordered list of image URLs, or NULL.
    pub images: Option<String>,
}

/// The subset read by the image phase.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ImageSourceRow {
    pub sku: String,
    pub images: String,
}

/// Rows eligible for sync: non-empty sku and name. Everything else in the
/// staging table is ignored, not an error.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn count_syncable(conn: &mut PgConnection) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM source_products \
         WHERE sku IS NOT NULL AND sku <> '' \
           AND name IS NOT NULL AND name <> ''",
    )
    .fetch_one(conn)
    .await
}

/// One page of syncable rows, ordered by sku for stable batching.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn fetch_syncable_page(
    conn: &mut PgConnection,
    limit: i64,
    offset: i64,
) -> Result<Vec<SourceProductRow>, sqlx::Error> {
    sqlx::query_as::<_, SourceProductRow>(
        "SELECT sku, name, description, price, stock, category, subcategory, brand, images \
         FROM source_products \
         WHERE sku IS NOT NULL AND sku <> '' \
           AND name IS NOT NULL AND name <> '' \
         ORDER BY sku, id \
         LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(conn)
    .await
}

/// One page of rows carrying a usable image list. Empty-ish JSON encodings
/// (`[]`, `null`, `""`) are filtered in SQL so the page rhythm matches the
/// set actually processed.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn fetch_image_page(
    conn: &mut PgConnection,
    limit: i64,
    offset: i64,
) -> Result<Vec<ImageSourceRow>, sqlx::Error> {
    sqlx::query_as::<_, ImageSourceRow>(
        "SELECT sku, images \
         FROM source_products \
         WHERE sku IS NOT NULL AND sku <> '' \
           AND images IS NOT NULL AND images <> '' \
           AND images NOT IN ('[]', 'null', '\"\"') \
         ORDER BY sku, id \
         LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(conn)
    .await
}
