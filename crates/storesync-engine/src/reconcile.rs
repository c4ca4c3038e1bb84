//! The transactional core of a synchronization run.
//!
//! Everything here executes on one connection inside one transaction:
//! taxonomy upserts, the batched insert/update pass over the staging table,
//! the scalar attribute flush, the relationship diff, the term-count
//! recompute, and the cached-fragment purge. Any error propagates out and
//! the caller rolls the whole transaction back.

use std::collections::HashSet;

use sqlx::PgConnection;
use storesync_core::catalog::{keys, slugify, VOCABULARY_BRAND, VOCABULARY_CATEGORY};
use storesync_db::tenant::attributes::{insert_attributes, NewAttribute};
use storesync_db::tenant::items::{
    insert_product, load_product_ids_by_sku, update_products, NewProductItem, ProductUpdate,
};
use storesync_db::tenant::options::purge_cached_options;
use storesync_db::tenant::source::{count_syncable, fetch_syncable_page};
use storesync_db::tenant::taxonomy::{
    count_subcategories_missing_parent, load_term_map, sync_brand_taxonomy, sync_category_taxonomy,
    update_term_counts,
};

use crate::error::EngineError;
use crate::meta::MetaWriter;
use crate::relationships::RelationshipLedger;
use crate::SyncOptions;

/// Counters produced by the transactional core.
#[derive(Debug, Default)]
pub(crate) struct ReconcileOutcome {
    pub products_processed: u64,
    pub items_created: u64,
    pub items_updated: u64,
    pub relationships_added: u64,
    pub relationships_removed: u64,
}

pub(crate) async fn reconcile_products(
    conn: &mut PgConnection,
    options: &SyncOptions,
) -> Result<ReconcileOutcome, EngineError> {
    // Terms and assignments must exist before anything references them.
    sync_category_taxonomy(&mut *conn).await?;
    sync_brand_taxonomy(&mut *conn).await?;

    let unparented = count_subcategories_missing_parent(&mut *conn).await?;
    if unparented > 0 {
        tracing::warn!(
            count = unparented,
            "subcategories without a parent category were left unassigned"
        );
    }

    // One-shot term maps, rebuilt every run.
    let category_terms = load_term_map(&mut *conn, VOCABULARY_CATEGORY).await?;
    let brand_terms = load_term_map(&mut *conn, VOCABULARY_BRAND).await?;

    let mut known_skus = load_product_ids_by_sku(&mut *conn).await?;
    let total = count_syncable(&mut *conn).await?;
    tracing::info!(
        total,
        existing = known_skus.len(),
        "starting product reconciliation"
    );

    let mut outcome = ReconcileOutcome::default();
    let mut meta = MetaWriter::new();
    let mut ledger = RelationshipLedger::new();
    let mut seen_this_run: HashSet<String> = HashSet::new();

    let limit = i64::try_from(options.batch_size).unwrap_or(i64::MAX);
    let mut offset = 0i64;

    loop {
        let page = fetch_syncable_page(&mut *conn, limit, offset).await?;
        if page.is_empty() {
            break;
        }
        offset += i64::try_from(page.len()).unwrap_or(0);

        let mut updates: Vec<ProductUpdate> = Vec::new();
        let mut created_attrs: Vec<NewAttribute> = Vec::new();

        for row in &page {
            outcome.products_processed += 1;

            // First occurrence of a duplicated SKU wins; later rows in the
            // same run are dropped rather than applied as updates.
            if !seen_this_run.insert(row.sku.clone()) {
                tracing::debug!(sku = %row.sku, "duplicate sku in source set; skipping");
                continue;
            }

            let excerpt = row.description.clone().unwrap_or_default();

            let item_id = if let Some(existing_id) = known_skus.get(&row.sku).copied() {
                updates.push(ProductUpdate {
                    id: existing_id,
                    title: row.name.clone(),
                    excerpt,
                });
                meta.mark_updated(existing_id);
                outcome.items_updated += 1;
                existing_id
            } else {
                let new_id = insert_product(
                    &mut *conn,
                    &NewProductItem {
                        title: row.name.clone(),
                        excerpt,
                        slug: slugify(&row.sku),
                        author_id: options.author_id,
                    },
                )
                .await?;
                known_skus.insert(row.sku.clone(), new_id);
                created_attrs.push(NewAttribute::new(new_id, keys::SKU, row.sku.clone()));
                outcome.items_created += 1;
                new_id
            };

            meta.stage_scalars(item_id, row.price, row.stock);
            ledger.record_product(item_id, row, &category_terms, &brand_terms);
        }

        // One round trip each for the batch's updates and new sku keys.
        update_products(&mut *conn, &updates).await?;
        insert_attributes(&mut *conn, &created_attrs).await?;
    }

    meta.flush(&mut *conn).await?;

    let (added, removed) = ledger.apply(&mut *conn).await?;
    outcome.relationships_added = added;
    outcome.relationships_removed = removed;

    update_term_counts(&mut *conn).await?;
    let purged = purge_cached_options(&mut *conn).await?;
    if purged > 0 {
        tracing::debug!(purged, "dropped cached option fragments");
    }

    Ok(outcome)
}
