//! Run-scoped accumulator for scalar attribute writes.
//!
//! Scalar attributes are collected across every batch and flushed once,
//! after the item writes settle: first a single delete of the prior scalar
//! rows for every updated item, then plain chunked inserts. The flush order
//! is load-bearing — the insert has no conflict handling, so skipping or
//! reordering the delete accumulates duplicates.

use rust_decimal::Decimal;
use sqlx::PgConnection;
use storesync_core::catalog::{scalar_attributes, SCALAR_ATTRIBUTE_KEYS};
use storesync_db::tenant::attributes::{delete_for_items, insert_attributes, NewAttribute};

/// Rows per INSERT statement when flushing.
const FLUSH_CHUNK: usize = 500;

#[derive(Debug, Default)]
pub(crate) struct MetaWriter {
    rows: Vec<NewAttribute>,
    updated_ids: Vec<i64>,
}

impl MetaWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue the scalar attribute set for one item. `None` values follow the
    /// skip rules in [`scalar_attributes`].
    pub(crate) fn stage_scalars(&mut self, item_id: i64, price: Option<Decimal>, stock: Option<i32>) {
        for (key, value) in scalar_attributes(price, stock) {
            self.rows.push(NewAttribute::new(item_id, key, value));
        }
    }

    /// Mark an item as pre-existing, so its old scalar rows are deleted
    /// before the flush inserts. Newly created items are never marked.
    pub(crate) fn mark_updated(&mut self, item_id: i64) {
        self.updated_ids.push(item_id);
    }

    /// Delete-then-insert all staged rows. Returns the number inserted.
    pub(crate) async fn flush(self, conn: &mut PgConnection) -> Result<u64, sqlx::Error> {
        delete_for_items(&mut *conn, &self.updated_ids, &SCALAR_ATTRIBUTE_KEYS).await?;

        let mut written = 0u64;
        for chunk in self.rows.chunks(FLUSH_CHUNK) {
            written += insert_attributes(&mut *conn, chunk).await?;
        }
        Ok(written)
    }
}
