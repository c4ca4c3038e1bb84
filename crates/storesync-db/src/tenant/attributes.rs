//! Write/read operations for the `item_attributes` table.
//!
//! Two deliberate duplicate-prevention strategies live here. The scalar
//! family is deleted up front and re-inserted plainly ([`delete_for_items`] +
//! [`insert_attributes`]); the single-valued image keys are upserted in place
//! ([`upsert_single_valued`]). Collapsing one strategy into the other changes
//! observable behavior — the gallery accumulates across runs while scalars
//! are rewritten wholesale.

use std::collections::HashMap;

use sqlx::PgConnection;

/// One attribute row queued for insert.
#[derive(Debug, Clone)]
pub struct NewAttribute {
    pub item_id: i64,
    pub key: String,
    pub value: String,
}

impl NewAttribute {
    #[must_use]
    pub fn new(item_id: i64, key: &str, value: impl Into<String>) -> Self {
        Self {
            item_id,
            key: key.to_string(),
            value: value.into(),
        }
    }
}

/// Bulk-insert attribute rows in one UNNEST round-trip.
///
/// Plain insert with no conflict handling: correctness for the scalar
/// family depends on the caller having deleted stale rows first.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the insert fails.
pub async fn insert_attributes(
    conn: &mut PgConnection,
    attrs: &[NewAttribute],
) -> Result<u64, sqlx::Error> {
    if attrs.is_empty() {
        return Ok(0);
    }

    let mut item_ids: Vec<i64> = Vec::with_capacity(attrs.len());
    let mut attr_keys: Vec<String> = Vec::with_capacity(attrs.len());
    let mut attr_values: Vec<String> = Vec::with_capacity(attrs.len());

    for attr in attrs {
        item_ids.push(attr.item_id);
        attr_keys.push(attr.key.clone());
        attr_values.push(attr.value.clone());
    }

    let result = sqlx::query(
        "INSERT INTO item_attributes (item_id, attr_key, attr_value) \
         SELECT * FROM UNNEST($1::bigint[], $2::text[], $3::text[])",
    )
    .bind(&item_ids)
    .bind(&attr_keys)
    .bind(&attr_values)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// Delete the given keys for the given items, ahead of a clean re-insert.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the delete fails.
pub async fn delete_for_items(
    conn: &mut PgConnection,
    item_ids: &[i64],
    attr_keys: &[&str],
) -> Result<u64, sqlx::Error> {
    if item_ids.is_empty() || attr_keys.is_empty() {
        return Ok(0);
    }

    let keys: Vec<String> = attr_keys.iter().map(|k| (*k).to_string()).collect();

    let result = sqlx::query(
        "DELETE FROM item_attributes \
         WHERE item_id = ANY($1::bigint[]) AND attr_key = ANY($2::text[])",
    )
    .bind(item_ids)
    .bind(&keys)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// Upsert one single-valued key for a batch of items: UPDATE the rows that
/// exist, then INSERT the misses. Two round-trips per batch, no unique
/// constraint required on the table.
///
/// Callers must pass at most one value per item id.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if either statement fails.
pub async fn upsert_single_valued(
    conn: &mut PgConnection,
    attr_key: &str,
    values: &[(i64, String)],
) -> Result<(), sqlx::Error> {
    if values.is_empty() {
        return Ok(());
    }

    let mut item_ids: Vec<i64> = Vec::with_capacity(values.len());
    let mut attr_values: Vec<String> = Vec::with_capacity(values.len());

    for (item_id, value) in values {
        item_ids.push(*item_id);
        attr_values.push(value.clone());
    }

    sqlx::query(
        "UPDATE item_attributes AS a \
         SET attr_value = v.attr_value \
         FROM (SELECT UNNEST($2::bigint[]) AS item_id, \
                      UNNEST($3::text[]) AS attr_value) AS v \
         WHERE a.item_id = v.item_id AND a.attr_key = $1",
    )
    .bind(attr_key)
    .bind(&item_ids)
    .bind(&attr_values)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "INSERT INTO item_attributes (item_id, attr_key, attr_value) \
         SELECT v.item_id, $1, v.attr_value \
         FROM (SELECT UNNEST($2::bigint[]) AS item_id, \
                      UNNEST($3::text[]) AS attr_value) AS v \
         WHERE NOT EXISTS (\
             SELECT 1 FROM item_attributes a \
             WHERE a.item_id = v.item_id AND a.attr_key = $1\
         )",
    )
    .bind(attr_key)
    .bind(&item_ids)
    .bind(&attr_values)
    .execute(conn)
    .await?;

    Ok(())
}

/// Current values of one key for a set of items, e.g. existing galleries
/// before a merge.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn load_values_for_items(
    conn: &mut PgConnection,
    attr_key: &str,
    item_ids: &[i64],
) -> Result<HashMap<i64, String>, sqlx::Error> {
    if item_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(i64, Option<String>)> = sqlx::query_as(
        "SELECT item_id, attr_value \
         FROM item_attributes \
         WHERE attr_key = $1 AND item_id = ANY($2::bigint[]) \
         ORDER BY id",
    )
    .bind(attr_key)
    .bind(item_ids)
    .fetch_all(conn)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(item_id, value)| value.map(|v| (item_id, v)))
        .collect())
}
