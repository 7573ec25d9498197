use chrono::{DateTime, Utc};
use log::trace;
use serde_json::Value;
use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, Row, SqliteConnection};
use spg_common::Money;

use crate::{
    db_types::{
        LineItem,
        NotificationState,
        OrderAmounts,
        OrderId,
        OrderQueryFilter,
        OrderRecord,
        PaymentInfo,
    },
    traits::PaymentStoreError,
};

fn decode_json_column<T: serde::de::DeserializeOwned>(
    column: &'static str,
    raw: Option<String>,
) -> Result<Option<T>, sqlx::Error> {
    raw.map(|s| serde_json::from_str::<T>(&s))
        .transpose()
        .map_err(|e| sqlx::Error::ColumnDecode { index: column.to_string(), source: Box::new(e) })
}

impl FromRow<'_, SqliteRow> for OrderRecord {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let shipping = decode_json_column::<Value>("shipping", row.try_get("shipping")?)?;
        let line_items = decode_json_column::<Vec<LineItem>>("line_items", row.try_get("line_items")?)?
            .unwrap_or_default();
        Ok(OrderRecord {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            status: row.try_get::<String, _>("status")?.into(),
            amounts: OrderAmounts {
                subtotal: row.try_get("subtotal")?,
                shipping: row.try_get("shipping_total")?,
                tax: row.try_get("tax")?,
                total: row.try_get("total")?,
                currency: row.try_get("currency")?,
            },
            shipping,
            line_items,
            customer_email: row.try_get("customer_email")?,
            payment: PaymentInfo {
                status: row.try_get("payment_status")?,
                mode: row.try_get("payment_mode")?,
                gateway_order_id: row.try_get("gateway_order_id")?,
                gateway_payment_id: row.try_get("gateway_payment_id")?,
                amount: row.try_get::<Option<Money>, _>("payment_amount")?,
                verified_at: row.try_get("payment_verified_at")?,
            },
            notification: NotificationState {
                customer_sent_at: row.try_get("customer_notified_at")?,
                admin_sent_at: row.try_get("admin_notified_at")?,
            },
            source: row.try_get("source")?,
            placed_at: row.try_get("placed_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, PaymentStoreError> {
    Ok(serde_json::to_string(value)?)
}

/// Inserts a new order as the external checkout flow would create it: `Created` status, no payment applied yet.
/// This is not atomic on its own. You can embed this call inside a transaction if you need atomicity, and pass
/// `&mut *tx` as the connection argument.
pub async fn insert_order(order: &OrderRecord, conn: &mut SqliteConnection) -> Result<OrderRecord, PaymentStoreError> {
    let shipping = order.shipping.as_ref().map(encode_json).transpose()?;
    let line_items = encode_json(&order.line_items)?;
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                status,
                currency,
                subtotal,
                shipping_total,
                tax,
                total,
                shipping,
                line_items,
                customer_email,
                payment_status,
                payment_mode,
                gateway_order_id,
                gateway_payment_id,
                payment_amount,
                payment_verified_at,
                source,
                placed_at,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            RETURNING *;
        "#,
    )
    .bind(order.order_id.as_str())
    .bind(order.status.to_string())
    .bind(order.amounts.currency.as_str())
    .bind(order.amounts.subtotal)
    .bind(order.amounts.shipping)
    .bind(order.amounts.tax)
    .bind(order.amounts.total)
    .bind(shipping)
    .bind(line_items)
    .bind(order.customer_email.as_deref())
    .bind(order.payment.status.as_deref())
    .bind(order.payment.mode.as_deref())
    .bind(order.payment.gateway_order_id.as_deref())
    .bind(order.payment.gateway_payment_id.as_deref())
    .bind(order.payment.amount)
    .bind(order.payment.verified_at)
    .bind(order.source.as_deref())
    .bind(order.placed_at)
    .bind(order.created_at)
    .bind(order.updated_at)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

/// Returns the order with the given storefront order id.
pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderRecord>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// Returns the order associated with the given gateway order id.
pub async fn fetch_order_by_gateway_id(
    gateway_order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderRecord>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE gateway_order_id = $1")
        .bind(gateway_order_id)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`.
///
/// Resulting orders are ordered by `created_at` in ascending order.
pub async fn search_orders(
    filter: &OrderQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderRecord>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !filter.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(status) = filter.status {
        where_clause.push("status = ");
        where_clause.push_bind_unseparated(status.to_string());
    }
    if let Some(since) = filter.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = filter.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC");

    trace!("📝️ Executing query: {}", builder.sql());
    let query = builder.build_query_as::<OrderRecord>();
    let orders = query.fetch_all(conn).await?;
    trace!("📝️ Result of search_orders: {:?}", orders.len());
    Ok(orders)
}

/// Writes a merged order back. Only the columns the paid-merge derives are touched; line items, customer address
/// and the notification flags are preserved as-is.
pub async fn update_merged_order(
    merged: &OrderRecord,
    conn: &mut SqliteConnection,
) -> Result<OrderRecord, PaymentStoreError> {
    let shipping = merged.shipping.as_ref().map(encode_json).transpose()?;
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET
                status = $1,
                currency = $2,
                subtotal = $3,
                shipping_total = $4,
                tax = $5,
                total = $6,
                shipping = $7,
                payment_status = $8,
                payment_mode = $9,
                gateway_order_id = $10,
                gateway_payment_id = $11,
                payment_amount = $12,
                payment_verified_at = $13,
                source = $14,
                placed_at = $15,
                updated_at = $16
            WHERE id = $17
            RETURNING *;
        "#,
    )
    .bind(merged.status.to_string())
    .bind(merged.amounts.currency.as_str())
    .bind(merged.amounts.subtotal)
    .bind(merged.amounts.shipping)
    .bind(merged.amounts.tax)
    .bind(merged.amounts.total)
    .bind(shipping)
    .bind(merged.payment.status.as_deref())
    .bind(merged.payment.mode.as_deref())
    .bind(merged.payment.gateway_order_id.as_deref())
    .bind(merged.payment.gateway_payment_id.as_deref())
    .bind(merged.payment.amount)
    .bind(merged.payment.verified_at)
    .bind(merged.source.as_deref())
    .bind(merged.placed_at)
    .bind(merged.updated_at)
    .bind(merged.id)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

/// Merge the notification timestamps into the order. COALESCE gives the set-once semantics: a stored timestamp
/// is never overwritten, and a `NULL` argument leaves the stored value alone.
pub async fn mark_notified(
    order_id: &OrderId,
    customer_sent_at: Option<DateTime<Utc>>,
    admin_sent_at: Option<DateTime<Utc>>,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderRecord>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET
                customer_notified_at = COALESCE(customer_notified_at, $1),
                admin_notified_at = COALESCE(admin_notified_at, $2),
                updated_at = $3
            WHERE order_id = $4
            RETURNING *;
        "#,
    )
    .bind(customer_sent_at)
    .bind(admin_sent_at)
    .bind(Utc::now())
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}
