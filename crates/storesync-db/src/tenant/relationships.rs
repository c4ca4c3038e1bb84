//! Write operations for the `term_relationships` pair table.

use sqlx::PgConnection;
use storesync_core::catalog::{VOCABULARY_BRAND, VOCABULARY_CATEGORY};

/// Every existing (item, assignment) pair for the given items, restricted
/// to the vocabularies the sync owns. Relationships under other
/// vocabularies are invisible to the differ and therefore never deleted.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn load_pairs_for_items(
    conn: &mut PgConnection,
    item_ids: &[i64],
) -> Result<Vec<(i64, i64)>, sqlx::Error> {
    if item_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, (i64, i64)>(
        "SELECT r.item_id, r.assignment_id \
         FROM term_relationships r \
         JOIN taxonomy_assignments a ON a.id = r.assignment_id \
         WHERE r.item_id = ANY($1::bigint[]) \
           AND a.vocabulary IN ($2, $3)",
    )
    .bind(item_ids)
    .bind(VOCABULARY_CATEGORY)
    .bind(VOCABULARY_BRAND)
    .fetch_all(conn)
    .await
}

/// Delete exactly the given pairs — the stale side of the diff.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the delete fails.
pub async fn delete_pairs(
    conn: &mut PgConnection,
    pairs: &[(i64, i64)],
) -> Result<u64, sqlx::Error> {
    if pairs.is_empty() {
        return Ok(0);
    }

    let mut item_ids: Vec<i64> = Vec::with_capacity(pairs.len());
    let mut assignment_ids: Vec<i64> = Vec::with_capacity(pairs.len());
    for (item_id, assignment_id) in pairs {
        item_ids.push(*item_id);
        assignment_ids.push(*assignment_id);
    }

    let result = sqlx::query(
        "DELETE FROM term_relationships r \
         USING (SELECT UNNEST($1::bigint[]) AS item_id, \
                       UNNEST($2::bigint[]) AS assignment_id) v \
         WHERE r.item_id = v.item_id AND r.assignment_id = v.assignment_id",
    )
    .bind(&item_ids)
    .bind(&assignment_ids)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// Insert pairs, suppressing ones that already exist. The pair is the
/// primary key, so re-inserting an unchanged relationship is a no-op.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the insert fails.
pub async fn insert_pairs(
    conn: &mut PgConnection,
    pairs: &[(i64, i64)],
) -> Result<u64, sqlx::Error> {
    if pairs.is_empty() {
        return Ok(0);
    }

    let mut item_ids: Vec<i64> = Vec::with_capacity(pairs.len());
    let mut assignment_ids: Vec<i64> = Vec::with_capacity(pairs.len());
    for (item_id, assignment_id) in pairs {
        item_ids.push(*item_id);
        assignment_ids.push(*assignment_id);
    }

    let result = sqlx::query(
        "INSERT INTO term_relationships (item_id, assignment_id) \
         SELECT * FROM UNNEST($1::bigint[], $2::bigint[]) \
         ON CONFLICT (item_id, assignment_id) DO NOTHING",
    )
    .bind(&item_ids)
    .bind(&assignment_ids)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}
