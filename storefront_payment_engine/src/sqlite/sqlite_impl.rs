//! `SqliteStore` is a concrete implementation of a canonical-store backend for the payment gateway.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements the traits defined in the [`crate::traits`]
//! module. Transactions come straight from the pool: every mutating operation reads its snapshot, derives, and
//! writes inside one `begin()`..`commit()` pair.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{db_url, new_pool, orders};
use crate::{
    db_types::{OrderId, OrderQueryFilter, OrderRecord, OrderStatusType},
    gateway_types::CapturedPayment,
    reconciler::merge_paid_order,
    traits::{CaptureOutcome, PaymentStore, PaymentStoreError},
};

#[derive(Clone)]
pub struct SqliteStore {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteStore ({:?})", self.pool)
    }
}

impl SqliteStore {
    /// Connect to the database given by the `SPG_DATABASE_URL` environment variable, or the default.
    pub async fn new_default() -> Result<Self, PaymentStoreError> {
        let url = db_url();
        Self::new_with_url(&url, 25).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, PaymentStoreError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The URL of the backing store.
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Insert a new order, as the external checkout flow does. Exposed for collaborators and tests; the
    /// reconciler itself never creates orders.
    pub async fn insert_order(&self, order: &OrderRecord) -> Result<OrderRecord, PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::insert_order(order, &mut conn).await?;
        debug!("🗃️ Order [{}] inserted with id {}", order.order_id, order.id);
        Ok(order)
    }
}

impl PaymentStore for SqliteStore {
    async fn fetch_order_by_id(&self, order_id: &OrderId) -> Result<Option<OrderRecord>, PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_gateway_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<OrderRecord>, PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_gateway_id(gateway_order_id, &mut conn).await?;
        Ok(order)
    }

    async fn search_orders(&self, filter: &OrderQueryFilter) -> Result<Vec<OrderRecord>, PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(filter, &mut conn).await?;
        Ok(orders)
    }

    /// In a single atomic transaction: read the order for the capture's gateway order id, re-derive the paid
    /// record from that snapshot, and write it back. Cancelled orders are left untouched.
    async fn apply_payment_capture(&self, capture: &CapturedPayment) -> Result<CaptureOutcome, PaymentStoreError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_by_gateway_id(capture.gateway_order_id.as_str(), &mut tx).await?;
        let Some(order) = order else {
            return Ok(CaptureOutcome::NotFound);
        };
        if order.status == OrderStatusType::Cancelled {
            return Ok(CaptureOutcome::Cancelled(order));
        }
        let was_paid = order.status == OrderStatusType::Paid;
        let merged = merge_paid_order(&order, capture, Utc::now());
        let written = orders::update_merged_order(&merged, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order [{}] merged as paid for gateway order {}", written.order_id, capture.gateway_order_id);
        if was_paid {
            Ok(CaptureOutcome::Reapplied(written))
        } else {
            Ok(CaptureOutcome::Applied(written))
        }
    }

    async fn mark_notified(
        &self,
        order_id: &OrderId,
        customer_sent_at: Option<DateTime<Utc>>,
        admin_sent_at: Option<DateTime<Utc>>,
    ) -> Result<OrderRecord, PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::mark_notified(order_id, customer_sent_at, admin_sent_at, &mut conn)
            .await?
            .ok_or_else(|| PaymentStoreError::OrderNotFound(order_id.clone()))?;
        trace!("🗃️ Notification flags merged for order [{}]", order.order_id);
        Ok(order)
    }

    async fn close(&mut self) -> Result<(), PaymentStoreError> {
        self.pool.close().await;
        Ok(())
    }
}
