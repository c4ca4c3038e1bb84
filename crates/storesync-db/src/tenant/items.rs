//! Read/write operations for the `catalog_items` table — products and
//! attachments share it, discriminated by `kind`.

use std::collections::HashMap;

use sqlx::PgConnection;
use storesync_core::catalog::{keys, KIND_ATTACHMENT, KIND_PRODUCT, STATUS_PUBLISHED};

/// Input record for a new product item.
#[derive(Debug, Clone)]
pub struct NewProductItem {
    pub title: String,
    pub excerpt: String,
    pub slug: String,
    pub author_id: i64,
}

/// Per-batch title/excerpt refresh for an existing product.
#[derive(Debug, Clone)]
pub struct ProductUpdate {
    pub id: i64,
    pub title: String,
    pub excerpt: String,
}

/// Input record for a new attachment item.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub title: String,
    pub slug: String,
    pub parent_id: i64,
    pub author_id: i64,
    pub media_url: String,
    pub mime_type: String,
}

/// Map every published product's `sku` attribute to its item id.
///
/// Products missing a sku attribute simply do not appear; duplicate sku
/// attributes (legacy data) resolve to the highest item id.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn load_product_ids_by_sku(
    conn: &mut PgConnection,
) -> Result<HashMap<String, i64>, sqlx::Error> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT a.attr_value, i.id \
         FROM catalog_items i \
         JOIN item_attributes a ON a.item_id = i.id AND a.attr_key = $1 \
         WHERE i.kind = $2 AND i.status = $3 AND a.attr_value IS NOT NULL \
         ORDER BY i.id",
    )
    .bind(keys::SKU)
    .bind(KIND_PRODUCT)
    .bind(STATUS_PUBLISHED)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().collect())
}

/// Insert one product row and return its id.
///
/// Inserts stay row-by-row because dependent attribute and relationship
/// writes need the generated id immediately.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the insert fails.
pub async fn insert_product(
    conn: &mut PgConnection,
    item: &NewProductItem,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO catalog_items (kind, status, title, excerpt, slug, author_id) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING id",
    )
    .bind(KIND_PRODUCT)
    .bind(STATUS_PUBLISHED)
    .bind(&item.title)
    .bind(&item.excerpt)
    .bind(&item.slug)
    .bind(item.author_id)
    .fetch_one(conn)
    .await
}

/// Refresh title/excerpt for a batch of existing products in one statement.
///
/// The batch is joined in as parallel UNNEST columns, so one round-trip
/// covers the whole batch regardless of its size.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the update fails.
pub async fn update_products(
    conn: &mut PgConnection,
    updates: &[ProductUpdate],
) -> Result<u64, sqlx::Error> {
    if updates.is_empty() {
        return Ok(0);
    }

    let mut ids: Vec<i64> = Vec::with_capacity(updates.len());
    let mut titles: Vec<String> = Vec::with_capacity(updates.len());
    let mut excerpts: Vec<String> = Vec::with_capacity(updates.len());

    for update in updates {
        ids.push(update.id);
        titles.push(update.title.clone());
        excerpts.push(update.excerpt.clone());
    }

    let result = sqlx::query(
        "UPDATE catalog_items AS i \
         SET title = v.title, excerpt = v.excerpt, modified_at = NOW() \
         FROM (SELECT UNNEST($1::bigint[]) AS id, \
                      UNNEST($2::text[]) AS title, \
                      UNNEST($3::text[]) AS excerpt) AS v \
         WHERE i.id = v.id",
    )
    .bind(&ids)
    .bind(&titles)
    .bind(&excerpts)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// Insert one attachment row and return its id.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the insert fails.
pub async fn insert_attachment(
    conn: &mut PgConnection,
    attachment: &NewAttachment,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO catalog_items \
             (kind, status, title, excerpt, slug, parent_id, author_id, media_url, mime_type) \
         VALUES ($1, $2, $3, '', $4, $5, $6, $7, $8) \
         RETURNING id",
    )
    .bind(KIND_ATTACHMENT)
    .bind(STATUS_PUBLISHED)
    .bind(&attachment.title)
    .bind(&attachment.slug)
    .bind(attachment.parent_id)
    .bind(attachment.author_id)
    .bind(&attachment.media_url)
    .bind(&attachment.mime_type)
    .fetch_one(conn)
    .await
}

/// Map existing attachment slugs to item ids for a candidate slug set.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn load_attachment_ids_by_slug(
    conn: &mut PgConnection,
    slugs: &[String],
) -> Result<HashMap<String, i64>, sqlx::Error> {
    if slugs.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT slug, id \
         FROM catalog_items \
         WHERE kind = $1 AND slug = ANY($2::text[]) \
         ORDER BY id",
    )
    .bind(KIND_ATTACHMENT)
    .bind(slugs)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().collect())
}

/// Resolve published product ids for a sku set via the sku attribute join.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn resolve_product_ids_for_skus(
    conn: &mut PgConnection,
    skus: &[String],
) -> Result<HashMap<String, i64>, sqlx::Error> {
    if skus.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT a.attr_value, i.id \
         FROM catalog_items i \
         JOIN item_attributes a ON a.item_id = i.id AND a.attr_key = $1 \
         WHERE i.kind = $2 AND i.status = $3 AND a.attr_value = ANY($4::text[]) \
         ORDER BY i.id",
    )
    .bind(keys::SKU)
    .bind(KIND_PRODUCT)
    .bind(STATUS_PUBLISHED)
    .bind(skus)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().collect())
}

/// Find a published product by its slug.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn find_product_by_slug(
    conn: &mut PgConnection,
    slug: &str,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT id FROM catalog_items \
         WHERE kind = $1 AND status = $2 AND slug = $3 \
         ORDER BY id \
         LIMIT 1",
    )
    .bind(KIND_PRODUCT)
    .bind(STATUS_PUBLISHED)
    .bind(slug)
    .fetch_optional(conn)
    .await
}

/// Find a published product by exact sku attribute value.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn find_product_by_sku(
    conn: &mut PgConnection,
    sku: &str,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT i.id \
         FROM catalog_items i \
         JOIN item_attributes a ON a.item_id = i.id AND a.attr_key = $1 \
         WHERE i.kind = $2 AND i.status = $3 AND a.attr_value = $4 \
         ORDER BY i.id \
         LIMIT 1",
    )
    .bind(keys::SKU)
    .bind(KIND_PRODUCT)
    .bind(STATUS_PUBLISHED)
    .bind(sku)
    .fetch_optional(conn)
    .await
}

/// Case-insensitive fallback for [`find_product_by_sku`], used by the
/// listing attach flow where filename casing drifts from the catalog.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn find_product_by_sku_ci(
    conn: &mut PgConnection,
    sku: &str,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT i.id \
         FROM catalog_items i \
         JOIN item_attributes a ON a.item_id = i.id AND a.attr_key = $1 \
         WHERE i.kind = $2 AND i.status = $3 AND LOWER(a.attr_value) = LOWER($4) \
         ORDER BY i.id \
         LIMIT 1",
    )
    .bind(keys::SKU)
    .bind(KIND_PRODUCT)
    .bind(STATUS_PUBLISHED)
    .bind(sku)
    .fetch_optional(conn)
    .await
}
