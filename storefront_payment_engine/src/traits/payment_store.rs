use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{OrderId, OrderQueryFilter, OrderRecord},
    gateway_types::CapturedPayment,
};

/// The outcome of applying a captured payment against the canonical store.
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    /// No order exists for the gateway order id. Orders are never created from payment events.
    NotFound,
    /// The order was cancelled by a collaborator; cancellation is absorbing, so nothing was changed.
    Cancelled(OrderRecord),
    /// The merge was applied and the order is now `Paid`.
    Applied(OrderRecord),
    /// The order was already `Paid`; the merge re-ran idempotently and only `updated_at` moved.
    Reapplied(OrderRecord),
}

/// This trait defines the behaviour required of canonical-store backends.
///
/// Every mutating operation runs inside one atomic transaction owned by the backend, and derives its written
/// values from the snapshot read inside that same transaction. That is what makes concurrent webhook deliveries
/// for the same order safe.
#[allow(async_fn_in_trait)]
pub trait PaymentStore: Clone {
    /// Fetch the order with the given storefront order id.
    async fn fetch_order_by_id(&self, order_id: &OrderId) -> Result<Option<OrderRecord>, PaymentStoreError>;

    /// Fetch the order associated with the given gateway order id.
    async fn fetch_order_by_gateway_id(&self, gateway_order_id: &str)
        -> Result<Option<OrderRecord>, PaymentStoreError>;

    /// Fetch orders matching the filter, ordered by creation time ascending.
    async fn search_orders(&self, filter: &OrderQueryFilter) -> Result<Vec<OrderRecord>, PaymentStoreError>;

    /// In a single atomic transaction: read the order for `capture.gateway_order_id`, re-derive the canonical
    /// amounts, shipping shape and placed-at instant from the freshly-read snapshot, and merge the paid state
    /// into the record, preserving unrelated fields.
    ///
    /// The derivation is [`crate::merge_paid_order`]; backends call it between their read and their
    /// conditional write. Reapplying the same capture is a no-op for every observable field except `updated_at`.
    async fn apply_payment_capture(&self, capture: &CapturedPayment) -> Result<CaptureOutcome, PaymentStoreError>;

    /// Merge the notification timestamps into the order. Set-once semantics: a timestamp already present in the
    /// store is never overwritten or cleared, and a `None` argument leaves the stored value alone.
    async fn mark_notified(
        &self,
        order_id: &OrderId,
        customer_sent_at: Option<DateTime<Utc>>,
        admin_sent_at: Option<DateTime<Utc>>,
    ) -> Result<OrderRecord, PaymentStoreError>;

    /// Closes the store connection.
    async fn close(&mut self) -> Result<(), PaymentStoreError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentStoreError {
    #[error("Internal store error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Could not encode stored document: {0}")]
    EncodingError(String),
}

impl From<sqlx::Error> for PaymentStoreError {
    fn from(e: sqlx::Error) -> Self {
        PaymentStoreError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for PaymentStoreError {
    fn from(e: serde_json::Error) -> Self {
        PaymentStoreError::EncodingError(e.to_string())
    }
}
