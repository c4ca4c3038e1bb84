//! Cleanup ledger for taxonomy relationships.
//!
//! During the batch loop every product records the relationship set implied
//! by its current category/subcategory/brand values. After the last batch
//! the ledger is reconciled against the database in one pass: fetch the
//! existing pairs for every touched item, delete exactly the stale ones,
//! insert exactly the missing ones. Unchanged pairs are never rewritten.

use std::collections::{HashMap, HashSet};

use sqlx::PgConnection;
use storesync_db::tenant::relationships::{delete_pairs, insert_pairs, load_pairs_for_items};
use storesync_db::tenant::source::SourceProductRow;

#[derive(Debug, Default)]
pub(crate) struct RelationshipLedger {
    desired: HashMap<i64, HashSet<i64>>,
}

impl RelationshipLedger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record the desired relationship set for one product. Values without a
    /// term-map entry are dropped here; the taxonomy pass has already logged
    /// how many subcategories could not be assigned.
    pub(crate) fn record_product(
        &mut self,
        item_id: i64,
        row: &SourceProductRow,
        category_terms: &HashMap<String, i64>,
        brand_terms: &HashMap<String, i64>,
    ) {
        let entry = self.desired.entry(item_id).or_default();

        for value in [&row.category, &row.subcategory] {
            if let Some(assignment_id) = value.as_deref().and_then(|v| category_terms.get(v)) {
                entry.insert(*assignment_id);
            }
        }
        if let Some(assignment_id) = row.brand.as_deref().and_then(|v| brand_terms.get(v)) {
            entry.insert(*assignment_id);
        }
    }

    /// Reconcile the ledger against the live pair table. Returns
    /// `(added, removed)` row counts.
    pub(crate) async fn apply(self, conn: &mut PgConnection) -> Result<(u64, u64), sqlx::Error> {
        if self.desired.is_empty() {
            return Ok((0, 0));
        }

        let item_ids: Vec<i64> = self.desired.keys().copied().collect();
        let mut existing: HashMap<i64, HashSet<i64>> = HashMap::new();
        for (item_id, assignment_id) in load_pairs_for_items(&mut *conn, &item_ids).await? {
            existing.entry(item_id).or_default().insert(assignment_id);
        }

        let mut stale: Vec<(i64, i64)> = Vec::new();
        let mut missing: Vec<(i64, i64)> = Vec::new();
        for (item_id, want) in &self.desired {
            let have = existing.remove(item_id).unwrap_or_default();
            for assignment_id in have.difference(want) {
                stale.push((*item_id, *assignment_id));
            }
            for assignment_id in want.difference(&have) {
                missing.push((*item_id, *assignment_id));
            }
        }

        let removed = delete_pairs(&mut *conn, &stale).await?;
        let added = insert_pairs(&mut *conn, &missing).await?;
        Ok((added, removed))
    }
}
