//! Read side of the order-reporting endpoint plus post-run draft cleanup.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use storesync_core::catalog::{ORDER_STATUS_CHECKOUT_DRAFT, ORDER_STATUS_COMPLETED};

/// One flattened row of the completed-orders reporting join: order,
/// billing address, and (optionally) one line. Orders with no lines still
/// produce a single row with the line columns NULL.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderReportRow {
    pub order_id: i64,
    pub order_date: DateTime<Utc>,
    pub order_updated: DateTime<Utc>,
    pub status: String,
    pub total_amount: Decimal,
    pub currency: String,
    pub customer_id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub address_1: Option<String>,
    pub address_2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub country: Option<String>,
    pub item_id: Option<i64>,
    pub product_name: Option<String>,
    pub quantity: Option<i32>,
    pub gross_revenue: Option<Decimal>,
    pub net_revenue: Option<Decimal>,
    pub coupon_amount: Option<Decimal>,
    /// SQL-computed `gross / quantity` rounded to 2 places.
    pub unit_price: Option<Decimal>,
}

/// All completed orders with billing address and line detail, newest
/// update first. Unit price is computed in SQL so every consumer rounds
/// the same way.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn fetch_completed_orders(
    conn: &mut PgConnection,
) -> Result<Vec<OrderReportRow>, sqlx::Error> {
    sqlx::query_as::<_, OrderReportRow>(
        "SELECT o.id AS order_id, \
                o.created_at AS order_date, \
                o.updated_at AS order_updated, \
                o.status, o.total_amount, o.currency, o.customer_id, \
                ba.first_name, ba.last_name, ba.email, ba.phone, ba.company, \
                ba.address_1, ba.address_2, ba.city, ba.state, ba.postcode, ba.country, \
                l.item_id, ci.title AS product_name, l.quantity, \
                l.gross_revenue, l.net_revenue, l.coupon_amount, \
                CASE WHEN l.quantity > 0 \
                     THEN ROUND(l.gross_revenue / l.quantity, 2) \
                     ELSE l.gross_revenue \
                END AS unit_price \
         FROM orders o \
         JOIN order_addresses ba ON ba.order_id = o.id AND ba.address_type = 'billing' \
         LEFT JOIN order_lines l ON l.order_id = o.id \
         LEFT JOIN catalog_items ci ON ci.id = l.item_id \
         WHERE o.status = $1 \
         ORDER BY o.updated_at DESC, o.id DESC, l.id",
    )
    .bind(ORDER_STATUS_COMPLETED)
    .fetch_all(conn)
    .await
}

/// Delete abandoned checkout drafts with no customer attached. Runs after
/// the sync commits; the caller treats failures as log-only.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the delete fails.
pub async fn delete_stale_draft_orders(conn: &mut PgConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM orders \
         WHERE status = $1 AND customer_id IS NULL",
    )
    .bind(ORDER_STATUS_CHECKOUT_DRAFT)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}
