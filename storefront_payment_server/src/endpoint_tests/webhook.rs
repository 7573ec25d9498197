//! Endpoint tests for the signed gateway webhook route, over mocked backends.

use actix_web::{http::StatusCode, test, web, App};
use chrono::Utc;
use serde_json::{json, Value};
use spg_common::Secret;
use storefront_payment_engine::{
    db_types::{NotificationState, OrderRecord, OrderStatusType},
    notifications::NotificationDispatcher,
    test_utils::OrderBuilder,
    CacheStore,
    CaptureOutcome,
    OrderReconciler,
    PaymentStoreError,
};

use super::mocks::{MockSender, MockStore};
use crate::{
    config::GATEWAY_HMAC_HEADER,
    helpers::sign_gateway_payload,
    middleware::HmacMiddlewareFactory,
    webhook_routes::GatewayWebhookRoute,
};

const SECRET: &str = "spg-endpoint-test-secret";

fn paid_order(notified: bool) -> OrderRecord {
    let mut order = OrderBuilder::new("1042")
        .gateway_order_id("gw_55")
        .customer_email("kai@example.com")
        .line_item("Teapot", 500, 2)
        .build();
    order.id = 1;
    order.status = OrderStatusType::Paid;
    if notified {
        let now = Utc::now();
        order.notification = NotificationState { customer_sent_at: Some(now), admin_sent_at: Some(now) };
    }
    order
}

fn captured_body() -> Vec<u8> {
    json!({
        "event_type": "payment.captured",
        "gateway_order_id": "gw_55",
        "gateway_payment_id": "pay_91",
        "payment_status": "captured",
        "payment_mode": "card"
    })
    .to_string()
    .into_bytes()
}

fn app_config(
    store: MockStore,
    sender: MockSender,
    cache: CacheStore,
    hmac_checks: bool,
) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg: &mut web::ServiceConfig| {
        let reconciler = OrderReconciler::new(store, NotificationDispatcher::new(sender, "ops@example.com"));
        let scope = web::scope("/gateway")
            .wrap(HmacMiddlewareFactory::new(GATEWAY_HMAC_HEADER, Secret::new(SECRET.to_string()), hmac_checks))
            .service(GatewayWebhookRoute::<MockStore, MockSender>::new());
        cfg.app_data(web::Data::new(reconciler)).app_data(web::Data::new(cache)).service(scope);
    }
}

fn signed_post(body: Vec<u8>) -> test::TestRequest {
    let signature = sign_gateway_payload(SECRET, &body);
    test::TestRequest::post()
        .uri("/gateway/webhook/payment")
        .insert_header((GATEWAY_HMAC_HEADER, signature))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body)
}

#[actix_web::test]
async fn signed_capture_is_applied() {
    let _ = env_logger::try_init();
    let mut store = MockStore::new();
    store.expect_apply_payment_capture().times(1).returning(|_| Ok(CaptureOutcome::Applied(paid_order(true))));
    let app =
        test::init_service(App::new().configure(app_config(store, MockSender::new(), CacheStore::new(), true))).await;

    let res = test::call_service(&app, signed_post(captured_body()).to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Order reconciled.");
}

#[actix_web::test]
async fn applied_capture_dispatches_notifications_and_flags() {
    let _ = env_logger::try_init();
    let mut store = MockStore::new();
    store.expect_apply_payment_capture().times(1).returning(|_| Ok(CaptureOutcome::Applied(paid_order(false))));
    store
        .expect_mark_notified()
        .times(1)
        .withf(|_, customer, admin| customer.is_some() && admin.is_some())
        .returning(|_, _, _| Ok(paid_order(true)));
    let mut sender = MockSender::new();
    sender.expect_send().times(2).returning(|_| Ok(()));
    let app = test::init_service(App::new().configure(app_config(store, sender, CacheStore::new(), true))).await;

    let res = test::call_service(&app, signed_post(captured_body()).to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["success"], true);
}

#[actix_web::test]
async fn tampered_payload_is_rejected() {
    let _ = env_logger::try_init();
    // The store must never be touched: no expectations are set, so any call would panic the test.
    let store = MockStore::new();
    let app =
        test::init_service(App::new().configure(app_config(store, MockSender::new(), CacheStore::new(), true))).await;

    let body = captured_body();
    let signature = sign_gateway_payload(SECRET, &body);
    let mut tampered = body.clone();
    tampered[10] ^= 0x01;
    let req = test::TestRequest::post()
        .uri("/gateway/webhook/payment")
        .insert_header((GATEWAY_HMAC_HEADER, signature))
        .set_payload(tampered)
        .to_request();
    let err = test::try_call_service(&app, req).await.expect_err("request should have been rejected");
    assert_eq!(err.as_response_error().status_code(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn missing_signature_is_rejected() {
    let _ = env_logger::try_init();
    let store = MockStore::new();
    let app =
        test::init_service(App::new().configure(app_config(store, MockSender::new(), CacheStore::new(), true))).await;
    let req = test::TestRequest::post().uri("/gateway/webhook/payment").set_payload(captured_body()).to_request();
    let err = test::try_call_service(&app, req).await.expect_err("request should have been rejected");
    assert_eq!(err.as_response_error().status_code(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn disabled_hmac_checks_allow_unsigned_calls() {
    let _ = env_logger::try_init();
    let mut store = MockStore::new();
    store.expect_apply_payment_capture().times(1).returning(|_| Ok(CaptureOutcome::Applied(paid_order(true))));
    let app =
        test::init_service(App::new().configure(app_config(store, MockSender::new(), CacheStore::new(), false))).await;
    let req = test::TestRequest::post().uri("/gateway/webhook/payment").set_payload(captured_body()).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[actix_web::test]
async fn non_paid_equivalent_event_is_acknowledged_without_store_calls() {
    let _ = env_logger::try_init();
    let store = MockStore::new();
    let app =
        test::init_service(App::new().configure(app_config(store, MockSender::new(), CacheStore::new(), true))).await;
    let body = json!({
        "event_type": "payment.failed",
        "gateway_order_id": "gw_55",
        "gateway_payment_id": "pay_91"
    })
    .to_string()
    .into_bytes();
    let res = test::call_service(&app, signed_post(body).to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Event ignored.");
}

#[actix_web::test]
async fn unknown_event_kind_is_acknowledged() {
    let _ = env_logger::try_init();
    let store = MockStore::new();
    let app =
        test::init_service(App::new().configure(app_config(store, MockSender::new(), CacheStore::new(), true))).await;
    let body = json!({"event_type": "invoice.created", "gateway_order_id": "gw_1"}).to_string().into_bytes();
    let res = test::call_service(&app, signed_post(body).to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["message"], "Event ignored.");
}

#[actix_web::test]
async fn unknown_gateway_order_is_acknowledged() {
    let _ = env_logger::try_init();
    let mut store = MockStore::new();
    store.expect_apply_payment_capture().times(1).returning(|_| Ok(CaptureOutcome::NotFound));
    let app =
        test::init_service(App::new().configure(app_config(store, MockSender::new(), CacheStore::new(), true))).await;
    let res = test::call_service(&app, signed_post(captured_body()).to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "No matching order.");
}

#[actix_web::test]
async fn store_failure_triggers_gateway_retry() {
    let _ = env_logger::try_init();
    let mut store = MockStore::new();
    store
        .expect_apply_payment_capture()
        .times(1)
        .returning(|_| Err(PaymentStoreError::DatabaseError("lock timeout".into())));
    let app =
        test::init_service(App::new().configure(app_config(store, MockSender::new(), CacheStore::new(), true))).await;
    let res = test::call_service(&app, signed_post(captured_body()).to_request()).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[actix_web::test]
async fn applied_capture_invalidates_cached_reads() {
    let _ = env_logger::try_init();
    let cache = CacheStore::new();
    let windows = chrono::Duration::seconds(60);
    cache.set("order:1042", json!({"status": "Created"}), windows, windows).await;
    cache.set("orders:any:-:-", json!({"total": 1}), windows, windows).await;
    cache.set("customer:9", json!({}), windows, windows).await;

    let mut store = MockStore::new();
    store.expect_apply_payment_capture().times(1).returning(|_| Ok(CaptureOutcome::Applied(paid_order(true))));
    let app =
        test::init_service(App::new().configure(app_config(store, MockSender::new(), cache.clone(), true))).await;
    let res = test::call_service(&app, signed_post(captured_body()).to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);

    assert!(cache.get("order:1042").await.is_none());
    assert!(cache.get("orders:any:-:-").await.is_none());
    assert!(cache.get("customer:9").await.is_some(), "unrelated keys are untouched");
}
