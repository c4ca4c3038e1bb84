use std::collections::HashSet;

use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use storesync_db::tenant::orders::{fetch_completed_orders, OrderReportRow};

use crate::middleware::{RequestId, TenantIdentity};

use super::{map_tenant_db_error, tenant_pool, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct OrdersReportData {
    orders: Vec<OrderReportItem>,
    totals: ReportTotals,
}

#[derive(Debug, Serialize)]
pub(super) struct ReportTotals {
    order_count: usize,
    total_revenue: Decimal,
    currency: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct OrderReportItem {
    order_id: i64,
    date: DateTime<Utc>,
    status: String,
    total: Decimal,
    currency: String,
    customer: CustomerBlock,
    formatted_address: String,
    items: Vec<OrderLineItem>,
    summary: OrderSummary,
}

#[derive(Debug, Serialize)]
pub(super) struct CustomerBlock {
    customer_id: Option<i64>,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    company: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct OrderLineItem {
    item_id: Option<i64>,
    product_name: Option<String>,
    quantity: i32,
    gross_revenue: Decimal,
    net_revenue: Decimal,
    coupon_amount: Decimal,
    unit_price: Decimal,
}

#[derive(Debug, Serialize)]
pub(super) struct OrderSummary {
    subtotal: Decimal,
    total_discount: Decimal,
    item_count: i64,
    unique_products: usize,
}

pub(super) async fn orders_report(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(tenant): Extension<TenantIdentity>,
) -> Result<Json<ApiResponse<OrdersReportData>>, ApiError> {
    let pool = tenant_pool(&state, tenant.tenant_id, &req_id.0).await?;
    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| map_tenant_db_error(req_id.0.clone(), &e))?;
    let rows = fetch_completed_orders(&mut conn)
        .await
        .map_err(|e| map_tenant_db_error(req_id.0.clone(), &e))?;
    drop(conn);
    pool.close().await;

    Ok(Json(ApiResponse {
        data: build_report(rows),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// Fold the flattened reporting rows into one item per order, preserving
/// the SQL ordering, and compute the report-wide totals.
fn build_report(rows: Vec<OrderReportRow>) -> OrdersReportData {
    let mut grouped: Vec<Vec<OrderReportRow>> = Vec::new();
    for row in rows {
        match grouped.last_mut() {
            Some(chunk) if chunk[0].order_id == row.order_id => chunk.push(row),
            _ => grouped.push(vec![row]),
        }
    }

    let orders: Vec<OrderReportItem> = grouped.into_iter().map(order_item).collect();

    let totals = ReportTotals {
        order_count: orders.len(),
        total_revenue: orders.iter().map(|o| o.total).sum(),
        currency: orders.first().map(|o| o.currency.clone()),
    };

    OrdersReportData { orders, totals }
}

fn order_item(chunk: Vec<OrderReportRow>) -> OrderReportItem {
    let order_id = chunk[0].order_id;
    let date = chunk[0].order_date;
    let status = chunk[0].status.clone();
    let total = chunk[0].total_amount;
    let currency = chunk[0].currency.clone();
    let customer = CustomerBlock {
        customer_id: chunk[0].customer_id,
        first_name: chunk[0].first_name.clone(),
        last_name: chunk[0].last_name.clone(),
        email: chunk[0].email.clone(),
        phone: chunk[0].phone.clone(),
        company: chunk[0].company.clone(),
    };
    let formatted_address = format_address(&chunk[0]);

    let mut items = Vec::new();
    let mut subtotal = Decimal::ZERO;
    let mut total_discount = Decimal::ZERO;
    let mut item_count: i64 = 0;
    let mut product_ids = HashSet::new();

    for row in chunk {
        // Orders without lines still produce one row; its line columns are NULL.
        let Some(quantity) = row.quantity else {
            continue;
        };
        let gross = row.gross_revenue.unwrap_or_default();
        let coupon = row.coupon_amount.unwrap_or_default();

        subtotal += gross;
        total_discount += coupon;
        item_count += i64::from(quantity);
        if let Some(item_id) = row.item_id {
            product_ids.insert(item_id);
        }

        items.push(OrderLineItem {
            item_id: row.item_id,
            product_name: row.product_name,
            quantity,
            gross_revenue: gross,
            net_revenue: row.net_revenue.unwrap_or_default(),
            coupon_amount: coupon,
            unit_price: row.unit_price.unwrap_or_default(),
        });
    }

    OrderReportItem {
        order_id,
        date,
        status,
        total,
        currency,
        customer,
        formatted_address,
        items,
        summary: OrderSummary {
            subtotal,
            total_discount,
            item_count,
            unique_products: product_ids.len(),
        },
    }
}

/// Render the billing address as one line: street parts, city,
/// "state postcode", country. Blank components are dropped.
fn format_address(row: &OrderReportRow) -> String {
    let mut parts: Vec<String> = Vec::new();

    for piece in [&row.address_1, &row.address_2, &row.city] {
        if let Some(value) = piece {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
        }
    }

    let state = row.state.as_deref().unwrap_or("").trim();
    let postcode = row.postcode.as_deref().unwrap_or("").trim();
    let region = match (state.is_empty(), postcode.is_empty()) {
        (false, false) => format!("{state} {postcode}"),
        (false, true) => state.to_string(),
        (true, false) => postcode.to_string(),
        (true, true) => String::new(),
    };
    if !region.is_empty() {
        parts.push(region);
    }

    if let Some(country) = &row.country {
        let trimmed = country.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed.to_string());
        }
    }

    parts.join(", ")
}
