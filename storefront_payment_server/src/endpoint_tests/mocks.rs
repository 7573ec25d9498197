use chrono::{DateTime, Utc};
use mockall::mock;
use storefront_payment_engine::{
    db_types::{OrderId, OrderQueryFilter, OrderRecord},
    gateway_types::CapturedPayment,
    notifications::{MessageSender, NotificationError, OutboundMessage},
    traits::{CaptureOutcome, PaymentStore, PaymentStoreError},
};

mock! {
    pub Store {}
    impl Clone for Store {
        fn clone(&self) -> Self;
    }
    impl PaymentStore for Store {
        async fn fetch_order_by_id(&self, order_id: &OrderId) -> Result<Option<OrderRecord>, PaymentStoreError>;
        async fn fetch_order_by_gateway_id(&self, gateway_order_id: &str) -> Result<Option<OrderRecord>, PaymentStoreError>;
        async fn search_orders(&self, filter: &OrderQueryFilter) -> Result<Vec<OrderRecord>, PaymentStoreError>;
        async fn apply_payment_capture(&self, capture: &CapturedPayment) -> Result<CaptureOutcome, PaymentStoreError>;
        async fn mark_notified(&self, order_id: &OrderId, customer_sent_at: Option<DateTime<Utc>>, admin_sent_at: Option<DateTime<Utc>>) -> Result<OrderRecord, PaymentStoreError>;
    }
}

mock! {
    pub Sender {}
    impl Clone for Sender {
        fn clone(&self) -> Self;
    }
    impl MessageSender for Sender {
        async fn send(&self, message: OutboundMessage) -> Result<(), NotificationError>;
    }
}
