//! Endpoint tests for the cache-backed read routes, against a real in-memory store.

use actix_web::{http::StatusCode, test, web, App};
use serde_json::Value;
use storefront_payment_engine::{
    gateway_types::CapturedPayment,
    test_utils::OrderBuilder,
    CacheStore,
    OrdersApi,
    PaymentStore,
    SqliteStore,
};

use crate::{
    config::CacheConfig,
    routes::{OrderByIdRoute, OrdersRoute, CACHE_STATUS_HEADER},
};

async fn seeded_store() -> SqliteStore {
    let store = SqliteStore::new_with_url("sqlite::memory:", 1).await.expect("in-memory store");
    store
        .insert_order(
            &OrderBuilder::new("1042")
                .gateway_order_id("gw_55")
                .customer_email("kai@example.com")
                .line_item("Teapot", 500, 2)
                .line_item("Infuser", 300, 1)
                .build(),
        )
        .await
        .unwrap();
    store
}

fn app_config(store: SqliteStore, cache: CacheStore) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(web::Data::new(OrdersApi::new(store)))
            .app_data(web::Data::new(cache))
            .app_data(web::Data::new(CacheConfig::default()))
            .service(OrderByIdRoute::new())
            .service(OrdersRoute::new());
    }
}

fn cache_label<B>(res: &actix_web::dev::ServiceResponse<B>) -> &str {
    res.headers().get(CACHE_STATUS_HEADER).and_then(|v| v.to_str().ok()).unwrap_or("<none>")
}

#[actix_web::test]
async fn order_read_misses_then_serves_fresh() {
    let _ = env_logger::try_init();
    let store = seeded_store().await;
    let app = test::init_service(App::new().configure(app_config(store, CacheStore::new()))).await;

    let res = test::call_service(&app, test::TestRequest::get().uri("/order/1042").to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(cache_label(&res), "miss");
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["order_id"], "1042");
    assert_eq!(body["status"], "Created");

    let res = test::call_service(&app, test::TestRequest::get().uri("/order/1042").to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(cache_label(&res), "fresh");
}

#[actix_web::test]
async fn fresh_reads_have_bounded_staleness() {
    let _ = env_logger::try_init();
    let store = seeded_store().await;
    let app = test::init_service(App::new().configure(app_config(store.clone(), CacheStore::new()))).await;

    // Warm the cache, then mutate the store behind its back.
    let res = test::call_service(&app, test::TestRequest::get().uri("/order/1042").to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let capture = CapturedPayment {
        gateway_order_id: "gw_55".into(),
        gateway_payment_id: "pay_1".into(),
        mode: None,
        status_text: "captured".into(),
        created_epoch: None,
    };
    store.apply_payment_capture(&capture).await.unwrap();

    // Within the fresh window the cached (now outdated) document is still served. That is the accepted
    // bounded-staleness contract of the read path.
    let res = test::call_service(&app, test::TestRequest::get().uri("/order/1042").to_request()).await;
    assert_eq!(cache_label(&res), "fresh");
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["status"], "Created");
}

#[actix_web::test]
async fn missing_order_is_a_404_and_not_cached() {
    let _ = env_logger::try_init();
    let store = seeded_store().await;
    let app = test::init_service(App::new().configure(app_config(store, CacheStore::new()))).await;

    let res = test::call_service(&app, test::TestRequest::get().uri("/order/9999").to_request()).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(res).await;
    assert!(body["error"].as_str().unwrap().contains("9999"));

    // The failure was not cached: the next read goes to the store again and still misses.
    let res = test::call_service(&app, test::TestRequest::get().uri("/order/9999").to_request()).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn order_list_is_cached_per_filter() {
    let _ = env_logger::try_init();
    let store = seeded_store().await;
    store.insert_order(&OrderBuilder::new("1043").gateway_order_id("gw_56").line_item("Kettle", 900, 1).build()).await.unwrap();
    let app = test::init_service(App::new().configure(app_config(store, CacheStore::new()))).await;

    let res = test::call_service(&app, test::TestRequest::get().uri("/orders").to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(cache_label(&res), "miss");
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["total"], 2);

    let res = test::call_service(&app, test::TestRequest::get().uri("/orders").to_request()).await;
    assert_eq!(cache_label(&res), "fresh");

    // A different filter is a different cache key.
    let res = test::call_service(&app, test::TestRequest::get().uri("/orders?status=Paid").to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(cache_label(&res), "miss");
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["total"], 0);
}
