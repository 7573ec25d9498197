//! Test support: an in-memory [`PaymentStore`], a recording [`MessageSender`], and builders for orders and
//! gateway events.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::Value;
use spg_common::Money;
use tokio::sync::Mutex;

use crate::{
    db_types::{
        LineItem,
        NotificationState,
        OrderAmounts,
        OrderId,
        OrderQueryFilter,
        OrderRecord,
        OrderStatusType,
        PaymentInfo,
    },
    gateway_types::{GatewayEvent, PaymentEventData},
    notifications::{MessageSender, NotificationError, OutboundMessage},
    reconciler::merge_paid_order,
    traits::{CaptureOutcome, PaymentStore, PaymentStoreError},
};

//--------------------------------------    MemoryStore      ---------------------------------------------------------
/// An in-memory [`PaymentStore`] for tests. The mutex plays the role of the transaction: every mutating call
/// reads, derives and writes under one lock acquisition.
#[derive(Clone, Default)]
pub struct MemoryStore {
    orders: Arc<Mutex<HashMap<String, OrderRecord>>>,
    next_id: Arc<AtomicI64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { orders: Arc::new(Mutex::new(HashMap::new())), next_id: Arc::new(AtomicI64::new(1)) }
    }

    /// Insert an order as the external checkout flow would have.
    pub async fn seed(&self, mut order: OrderRecord) {
        if order.id == 0 {
            order.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        }
        self.orders.lock().await.insert(order.order_id.as_str().to_string(), order);
    }

    pub async fn order_count(&self) -> usize {
        self.orders.lock().await.len()
    }
}

impl PaymentStore for MemoryStore {
    async fn fetch_order_by_id(&self, order_id: &OrderId) -> Result<Option<OrderRecord>, PaymentStoreError> {
        Ok(self.orders.lock().await.get(order_id.as_str()).cloned())
    }

    async fn fetch_order_by_gateway_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<OrderRecord>, PaymentStoreError> {
        let orders = self.orders.lock().await;
        Ok(orders.values().find(|o| o.payment.gateway_order_id.as_deref() == Some(gateway_order_id)).cloned())
    }

    async fn search_orders(&self, filter: &OrderQueryFilter) -> Result<Vec<OrderRecord>, PaymentStoreError> {
        let orders = self.orders.lock().await;
        let mut result: Vec<OrderRecord> = orders
            .values()
            .filter(|o| filter.status.map(|s| o.status == s).unwrap_or(true))
            .filter(|o| filter.since.map(|t| o.created_at >= t).unwrap_or(true))
            .filter(|o| filter.until.map(|t| o.created_at <= t).unwrap_or(true))
            .cloned()
            .collect();
        result.sort_by_key(|o| o.created_at);
        Ok(result)
    }

    async fn apply_payment_capture(
        &self,
        capture: &crate::gateway_types::CapturedPayment,
    ) -> Result<CaptureOutcome, PaymentStoreError> {
        let mut orders = self.orders.lock().await;
        let Some(order) =
            orders.values().find(|o| o.payment.gateway_order_id.as_deref() == Some(capture.gateway_order_id.as_str()))
        else {
            return Ok(CaptureOutcome::NotFound);
        };
        let order = order.clone();
        match order.status {
            OrderStatusType::Cancelled => Ok(CaptureOutcome::Cancelled(order)),
            OrderStatusType::Created => {
                let merged = merge_paid_order(&order, capture, Utc::now());
                orders.insert(merged.order_id.as_str().to_string(), merged.clone());
                Ok(CaptureOutcome::Applied(merged))
            },
            OrderStatusType::Paid => {
                let merged = merge_paid_order(&order, capture, Utc::now());
                orders.insert(merged.order_id.as_str().to_string(), merged.clone());
                Ok(CaptureOutcome::Reapplied(merged))
            },
        }
    }

    async fn mark_notified(
        &self,
        order_id: &OrderId,
        customer_sent_at: Option<DateTime<Utc>>,
        admin_sent_at: Option<DateTime<Utc>>,
    ) -> Result<OrderRecord, PaymentStoreError> {
        let mut orders = self.orders.lock().await;
        let order =
            orders.get_mut(order_id.as_str()).ok_or_else(|| PaymentStoreError::OrderNotFound(order_id.clone()))?;
        order.notification = NotificationState {
            customer_sent_at: order.notification.customer_sent_at.or(customer_sent_at),
            admin_sent_at: order.notification.admin_sent_at.or(admin_sent_at),
        };
        order.updated_at = Utc::now();
        Ok(order.clone())
    }
}

//--------------------------------------   CountingSender    ---------------------------------------------------------
/// A [`MessageSender`] that records every message, optionally hard-failing a single recipient.
#[derive(Clone, Default)]
pub struct CountingSender {
    sent: Arc<std::sync::Mutex<Vec<OutboundMessage>>>,
    fail_for: Option<String>,
}

impl CountingSender {
    pub fn failing_for<S: Into<String>>(recipient: S) -> Self {
        Self { fail_for: Some(recipient.into()), ..Default::default() }
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }
}

impl MessageSender for CountingSender {
    async fn send(&self, message: OutboundMessage) -> Result<(), NotificationError> {
        if self.fail_for.as_deref() == Some(message.to.as_str()) {
            return Err(NotificationError::DeliveryFailed {
                recipient: message.to.clone(),
                reason: "simulated outage".into(),
            });
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

//--------------------------------------    OrderBuilder     ---------------------------------------------------------
/// Builds canonical order records the way the external checkout flow would create them.
#[derive(Debug, Clone)]
pub struct OrderBuilder {
    order_id: String,
    status: OrderStatusType,
    gateway_order_id: Option<String>,
    customer_email: Option<String>,
    shipping: Option<Value>,
    line_items: Vec<LineItem>,
    amounts: OrderAmounts,
    created_at: Option<DateTime<Utc>>,
}

impl OrderBuilder {
    pub fn new<S: Into<String>>(order_id: S) -> Self {
        Self {
            order_id: order_id.into(),
            status: OrderStatusType::Created,
            gateway_order_id: None,
            customer_email: None,
            shipping: None,
            line_items: vec![],
            amounts: OrderAmounts::default(),
            created_at: None,
        }
    }

    /// A random order with one line item, for tests that only need "some" order.
    pub fn random_order() -> OrderRecord {
        let mut rng = rand::thread_rng();
        let id = rng.gen_range(100_000..999_999).to_string();
        let price = rng.gen_range(100..50_000);
        Self::new(&id).gateway_order_id(format!("gw_{id}")).line_item("Widget", price, 1).build()
    }

    pub fn status(mut self, status: OrderStatusType) -> Self {
        self.status = status;
        self
    }

    pub fn gateway_order_id<S: Into<String>>(mut self, id: S) -> Self {
        self.gateway_order_id = Some(id.into());
        self
    }

    pub fn customer_email<S: Into<String>>(mut self, email: S) -> Self {
        self.customer_email = Some(email.into());
        self
    }

    pub fn shipping(mut self, shipping: Value) -> Self {
        self.shipping = Some(shipping);
        self
    }

    pub fn line_item<S: Into<String>>(mut self, name: S, price: i64, quantity: i64) -> Self {
        self.line_items.push(LineItem { sku: None, name: name.into(), price: Money::from(price), quantity });
        self
    }

    pub fn amounts(mut self, amounts: OrderAmounts) -> Self {
        self.amounts = amounts;
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn build(self) -> OrderRecord {
        let created_at = self.created_at.unwrap_or_else(Utc::now);
        OrderRecord {
            id: 0,
            order_id: OrderId::new(self.order_id),
            status: self.status,
            amounts: self.amounts,
            shipping: self.shipping,
            line_items: self.line_items,
            customer_email: self.customer_email,
            payment: PaymentInfo { gateway_order_id: self.gateway_order_id, ..Default::default() },
            notification: NotificationState::default(),
            source: Some("checkout".into()),
            placed_at: None,
            created_at,
            updated_at: created_at,
        }
    }
}

//--------------------------------------    EventBuilder     ---------------------------------------------------------
/// Builds gateway events as the gateway would deliver them.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    kind: EventKind,
    data: PaymentEventData,
}

#[derive(Debug, Clone, Copy)]
enum EventKind {
    Captured,
    Authorized,
    Failed,
    Pending,
}

impl EventBuilder {
    pub fn captured<S: Into<String>>(gateway_order_id: S) -> Self {
        Self::with_kind(EventKind::Captured, gateway_order_id)
    }

    pub fn authorized<S: Into<String>>(gateway_order_id: S) -> Self {
        Self::with_kind(EventKind::Authorized, gateway_order_id)
    }

    pub fn failed<S: Into<String>>(gateway_order_id: S) -> Self {
        Self::with_kind(EventKind::Failed, gateway_order_id)
    }

    pub fn pending<S: Into<String>>(gateway_order_id: S) -> Self {
        Self::with_kind(EventKind::Pending, gateway_order_id)
    }

    fn with_kind<S: Into<String>>(kind: EventKind, gateway_order_id: S) -> Self {
        let gateway_order_id = gateway_order_id.into();
        let data = PaymentEventData {
            gateway_payment_id: format!("pay_{gateway_order_id}"),
            gateway_order_id,
            payment_mode: Some("card".into()),
            ..Default::default()
        };
        Self { kind, data }
    }

    pub fn payment_id<S: Into<String>>(mut self, id: S) -> Self {
        self.data.gateway_payment_id = id.into();
        self
    }

    pub fn status<S: Into<String>>(mut self, status: S) -> Self {
        self.data.payment_status = Some(status.into());
        self
    }

    pub fn amount(mut self, amount: i64) -> Self {
        self.data.amount = Some(amount);
        self
    }

    pub fn created_epoch(mut self, epoch: i64) -> Self {
        self.data.created_epoch = Some(epoch);
        self
    }

    pub fn build(self) -> GatewayEvent {
        match self.kind {
            EventKind::Captured => GatewayEvent::PaymentCaptured(self.data),
            EventKind::Authorized => GatewayEvent::PaymentAuthorized(self.data),
            EventKind::Failed => GatewayEvent::PaymentFailed(self.data),
            EventKind::Pending => GatewayEvent::PaymentPending(self.data),
        }
    }
}
