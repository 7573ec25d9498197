//! End-to-end reconciliation against a real (in-memory) SQLite store: checkout seeds an order, the gateway
//! delivers captures, and the canonical record converges.

use chrono::Utc;
use serde_json::json;
use spg_common::Money;
use storefront_payment_engine::{
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
    notifications::{MessageSender, NotificationDispatcher, NotificationError, OutboundMessage},
    OrderReconciler,
    PaymentStore,
    ReconcileOutcome,
    SqliteStore,
};

#[derive(Clone, Default)]
struct RecordingSender {
    sent: std::sync::Arc<std::sync::Mutex<Vec<OutboundMessage>>>,
}

impl RecordingSender {
    fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl MessageSender for RecordingSender {
    async fn send(&self, message: OutboundMessage) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

fn checkout_order(order_id: &str, gateway_order_id: &str) -> OrderRecord {
    let now = Utc::now();
    OrderRecord {
        id: 0,
        order_id: OrderId::new(order_id),
        status: OrderStatusType::Created,
        amounts: OrderAmounts::default(),
        shipping: Some(json!({"address_1": "5 Sencha St", "zip": "98001", "province": "WA", "country": "US"})),
        line_items: vec![
            LineItem { sku: Some("TP-01".into()), name: "Teapot".into(), price: Money::from(500), quantity: 2 },
            LineItem { sku: None, name: "Infuser".into(), price: Money::from(300), quantity: 1 },
        ],
        customer_email: Some("kai@example.com".into()),
        payment: PaymentInfo { gateway_order_id: Some(gateway_order_id.into()), ..Default::default() },
        notification: NotificationState::default(),
        source: Some("checkout".into()),
        placed_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn captured_event(gateway_order_id: &str) -> GatewayEvent {
    GatewayEvent::PaymentCaptured(PaymentEventData {
        gateway_order_id: gateway_order_id.into(),
        gateway_payment_id: format!("pay_{gateway_order_id}"),
        payment_status: Some("captured".into()),
        payment_mode: Some("card".into()),
        amount: Some(99),
        currency: Some("USD".into()),
        created_epoch: None,
    })
}

async fn new_store() -> SqliteStore {
    // One connection: every pooled connection to sqlite::memory: would otherwise get its own database.
    SqliteStore::new_with_url("sqlite::memory:", 1).await.expect("could not open in-memory store")
}

#[tokio::test]
async fn capture_flow_end_to_end() {
    let _ = env_logger::try_init();
    let store = new_store().await;
    let sender = RecordingSender::default();
    store.insert_order(&checkout_order("1042", "gw_55")).await.unwrap();

    let api = OrderReconciler::new(store.clone(), NotificationDispatcher::new(sender.clone(), "ops@example.com"));
    let outcome = api.reconcile(&captured_event("gw_55")).await.unwrap();
    let ReconcileOutcome::Applied { order, notified } = outcome else { panic!("expected Applied") };
    assert!(notified);
    assert_eq!(order.status, OrderStatusType::Paid);
    // Total derived from stored line items, not from the event's own (bogus) amount.
    assert_eq!(order.amounts.total, Money::from(1300));
    assert_eq!(sender.count(), 2);

    let stored = store.fetch_order_by_id(&OrderId::new("1042")).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::Paid);
    assert_eq!(stored.payment.gateway_payment_id.as_deref(), Some("pay_gw_55"));
    assert!(stored.notification.is_complete());
    // Legacy shipping fields were collapsed into the canonical shape on the way through.
    let shipping = stored.shipping.unwrap();
    assert_eq!(shipping["addr1"], json!("5 Sencha St"));
    assert_eq!(shipping["postal"], json!("98001"));
    assert_eq!(shipping["state"], json!("WA"));
}

#[tokio::test]
async fn redelivered_capture_is_idempotent() {
    let store = new_store().await;
    let sender = RecordingSender::default();
    store.insert_order(&checkout_order("1042", "gw_55")).await.unwrap();
    let api = OrderReconciler::new(store.clone(), NotificationDispatcher::new(sender.clone(), "ops@example.com"));

    let event = captured_event("gw_55");
    let first = api.reconcile(&event).await.unwrap();
    let ReconcileOutcome::Applied { order: first_order, .. } = first else { panic!("expected Applied") };

    let second = api.reconcile(&event).await.unwrap();
    let ReconcileOutcome::AlreadyApplied { order: second_order, notified } = second else {
        panic!("expected AlreadyApplied");
    };
    assert!(!notified, "flags were already set; no second send");
    assert_eq!(sender.count(), 2, "exactly one receipt and one ops notice in total");
    assert_eq!(second_order.amounts, first_order.amounts);
    assert_eq!(second_order.shipping, first_order.shipping);
    assert_eq!(second_order.payment, first_order.payment);
    assert_eq!(second_order.placed_at, first_order.placed_at);
    assert!(second_order.updated_at >= first_order.updated_at);
}

#[tokio::test]
async fn unknown_gateway_order_changes_nothing() {
    let store = new_store().await;
    let sender = RecordingSender::default();
    store.insert_order(&checkout_order("1042", "gw_55")).await.unwrap();
    let api = OrderReconciler::new(store.clone(), NotificationDispatcher::new(sender.clone(), "ops@example.com"));

    let outcome = api.reconcile(&captured_event("gw_unknown")).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::UnknownOrder(id) if id == "gw_unknown"));
    let stored = store.fetch_order_by_id(&OrderId::new("1042")).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::Created);
    assert_eq!(sender.count(), 0);
}

#[tokio::test]
async fn cancelled_orders_absorb_captures() {
    let store = new_store().await;
    let sender = RecordingSender::default();
    let mut order = checkout_order("1042", "gw_55");
    order.status = OrderStatusType::Cancelled;
    store.insert_order(&order).await.unwrap();
    let api = OrderReconciler::new(store.clone(), NotificationDispatcher::new(sender.clone(), "ops@example.com"));

    let outcome = api.reconcile(&captured_event("gw_55")).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::CancelledOrder(_)));
    let stored = store.fetch_order_by_id(&OrderId::new("1042")).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::Cancelled);
    assert!(stored.payment.gateway_payment_id.is_none());
}

#[tokio::test]
async fn search_filters_by_status() {
    let store = new_store().await;
    store.insert_order(&checkout_order("1042", "gw_55")).await.unwrap();
    store.insert_order(&checkout_order("1043", "gw_56")).await.unwrap();

    let sender = RecordingSender::default();
    let api = OrderReconciler::new(store.clone(), NotificationDispatcher::new(sender, "ops@example.com"));
    api.reconcile(&captured_event("gw_56")).await.unwrap();

    let paid = store
        .search_orders(&OrderQueryFilter { status: Some(OrderStatusType::Paid), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(paid.len(), 1);
    assert_eq!(paid[0].order_id, OrderId::new("1043"));
    let all = store.search_orders(&OrderQueryFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);
}
