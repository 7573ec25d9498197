use log::*;

use crate::{
    db_types::{OrderId, OrderQueryFilter, OrderRecord},
    traits::{PaymentStore, PaymentStoreError},
};

/// `OrdersApi` is the read-side API over the canonical store. The server's cache-backed endpoints use it as
/// their producer: every call recomputes from the store, so cached results can be refreshed idempotently.
pub struct OrdersApi<B> {
    db: B,
}

impl<B> OrdersApi<B>
where B: PaymentStore
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<OrderRecord>, PaymentStoreError> {
        trace!("📖️ Fetching order [{order_id}]");
        self.db.fetch_order_by_id(order_id).await
    }

    pub async fn search(&self, filter: &OrderQueryFilter) -> Result<Vec<OrderRecord>, PaymentStoreError> {
        trace!("📖️ Searching orders with filter {filter}");
        let orders = self.db.search_orders(filter).await?;
        debug!("📖️ Order search [{filter}] returned {} orders", orders.len());
        Ok(orders)
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
