//! Set-based synchronization of taxonomy terms and assignments from the
//! staging table, plus the derived item-count refresh.
//!
//! Term names compare byte-exact end to end: `Shoes` and `shoes` are two
//! different terms, matching how the staging values are matched back when
//! relationships are written.

use std::collections::HashMap;

use sqlx::PgConnection;
use storesync_core::catalog::{KIND_PRODUCT, STATUS_PUBLISHED, VOCABULARY_BRAND, VOCABULARY_CATEGORY};

/// Upsert terms and root assignments for the `category` column, then terms
/// and parented assignments for `subcategory`.
///
/// Subcategories resolve their parent's assignment through exact-name joins;
/// a subcategory whose parent category never materialized is silently left
/// without an assignment (see [`count_subcategories_missing_parent`]).
/// A name already assigned under the vocabulary keeps its first parent —
/// the conflict target is `(term_id, vocabulary)`.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if any statement fails.
pub async fn sync_category_taxonomy(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    // Terms for every distinct category value; refresh slug in place.
    sqlx::query(
        "INSERT INTO taxonomy_terms (name, slug) \
         SELECT DISTINCT category, LOWER(REPLACE(category, ' ', '-')) \
         FROM source_products \
         WHERE category IS NOT NULL AND category <> '' \
         ON CONFLICT (name) DO UPDATE SET slug = EXCLUDED.slug",
    )
    .execute(&mut *conn)
    .await?;

    // Root assignments for categories.
    sqlx::query(
        "INSERT INTO taxonomy_assignments (term_id, vocabulary, description) \
         SELECT DISTINCT t.id, $1, '' \
         FROM taxonomy_terms t \
         JOIN source_products sp ON sp.category = t.name \
         WHERE sp.category IS NOT NULL AND sp.category <> '' \
         ON CONFLICT (term_id, vocabulary) DO NOTHING",
    )
    .bind(VOCABULARY_CATEGORY)
    .execute(&mut *conn)
    .await?;

    // Terms for every distinct subcategory value.
    sqlx::query(
        "INSERT INTO taxonomy_terms (name, slug) \
         SELECT DISTINCT subcategory, LOWER(REPLACE(subcategory, ' ', '-')) \
         FROM source_products \
         WHERE subcategory IS NOT NULL AND subcategory <> '' \
         ON CONFLICT (name) DO UPDATE SET slug = EXCLUDED.slug",
    )
    .execute(&mut *conn)
    .await?;

    // Assignments for subcategories, parented on the category's assignment.
    // Rows whose parent category is absent fall out of the joins.
    sqlx::query(
        "INSERT INTO taxonomy_assignments (term_id, vocabulary, parent_id, description) \
         SELECT DISTINCT ct.id, $1, pa.id, '' \
         FROM source_products sp \
         JOIN taxonomy_terms ct ON ct.name = sp.subcategory \
         JOIN taxonomy_terms pt ON pt.name = sp.category \
         JOIN taxonomy_assignments pa ON pa.term_id = pt.id AND pa.vocabulary = $1 \
         WHERE sp.subcategory IS NOT NULL AND sp.subcategory <> '' \
           AND sp.category IS NOT NULL AND sp.category <> '' \
         ON CONFLICT (term_id, vocabulary) DO NOTHING",
    )
    .bind(VOCABULARY_CATEGORY)
    .execute(conn)
    .await?;

    Ok(())
}

/// Upsert terms and root assignments for the `brand` column.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if any statement fails.
pub async fn sync_brand_taxonomy(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO taxonomy_terms (name, slug) \
         SELECT DISTINCT brand, LOWER(REPLACE(brand, ' ', '-')) \
         FROM source_products \
         WHERE brand IS NOT NULL AND brand <> '' \
         ON CONFLICT (name) DO UPDATE SET slug = EXCLUDED.slug",
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "INSERT INTO taxonomy_assignments (term_id, vocabulary, description) \
         SELECT DISTINCT t.id, $1, '' \
         FROM taxonomy_terms t \
         JOIN source_products sp ON sp.brand = t.name \
         WHERE sp.brand IS NOT NULL AND sp.brand <> '' \
         ON CONFLICT (term_id, vocabulary) DO NOTHING",
    )
    .bind(VOCABULARY_BRAND)
    .execute(conn)
    .await?;

    Ok(())
}

/// Name → assignment id for one vocabulary, loaded once per run after the
/// taxonomy pass. Never cached beyond the run.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn load_term_map(
    conn: &mut PgConnection,
    vocabulary: &str,
) -> Result<HashMap<String, i64>, sqlx::Error> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT t.name, a.id \
         FROM taxonomy_terms t \
         JOIN taxonomy_assignments a ON a.term_id = t.id \
         WHERE a.vocabulary = $1",
    )
    .bind(vocabulary)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().collect())
}

/// Distinct subcategory values that ended the taxonomy pass without a
/// `category` assignment — these cannot be linked to products this run.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn count_subcategories_missing_parent(
    conn: &mut PgConnection,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(DISTINCT sp.subcategory) \
         FROM source_products sp \
         WHERE sp.subcategory IS NOT NULL AND sp.subcategory <> '' \
           AND NOT EXISTS (\
               SELECT 1 \
               FROM taxonomy_terms t \
               JOIN taxonomy_assignments a ON a.term_id = t.id AND a.vocabulary = $1 \
               WHERE t.name = sp.subcategory\
           )",
    )
    .bind(VOCABULARY_CATEGORY)
    .fetch_one(conn)
    .await
}

/// Recompute `item_count` for every category/brand assignment from live
/// relationships to published products. Full recompute, not incremental —
/// the deliberate self-healing pass at the end of each run.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the update fails.
pub async fn update_term_counts(conn: &mut PgConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE taxonomy_assignments AS a \
         SET item_count = sub.cnt \
         FROM (\
             SELECT a2.id, COUNT(i.id) AS cnt \
             FROM taxonomy_assignments a2 \
             LEFT JOIN term_relationships r ON r.assignment_id = a2.id \
             LEFT JOIN catalog_items i ON i.id = r.item_id \
                  AND i.kind = $1 AND i.status = $2 \
             WHERE a2.vocabulary IN ($3, $4) \
             GROUP BY a2.id\
         ) AS sub \
         WHERE a.id = sub.id",
    )
    .bind(KIND_PRODUCT)
    .bind(STATUS_PUBLISHED)
    .bind(VOCABULARY_CATEGORY)
    .bind(VOCABULARY_BRAND)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}
