//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will
//! cause the current worker to stop processing new requests. Any long, non-cpu-bound operation (I/O, database
//! access, the cache's cold-path producer) must be awaited, never blocked on.
//!
//! The read endpoints are cache-backed: a fresh hit answers from memory, a stale hit answers from memory and
//! refreshes in the background, and only a cold/expired key makes the caller wait on the store. Stale data is
//! always labelled as such in the `X-Cache` response header so clients can revalidate if they need to.

use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use storefront_payment_engine::{
    db_types::{OrderId, OrderQueryFilter},
    CacheStore,
    OrdersApi,
    PaymentStoreError,
    SqliteStore,
};

use crate::{config::CacheConfig, data_objects::OrderListResult, errors::ServerError};

/// Response header carrying the cache freshness classification for the request (`fresh|stale|expired|miss`).
pub const CACHE_STATUS_HEADER: &str = "X-Cache";

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal) => {
        paste::paste! { pub struct [<$name:camel Route>];}
        paste::paste! {
            impl [<$name:camel Route>] {
                #[allow(clippy::new_without_default)]
                pub fn new() -> Self { Self }
            }
        }
        paste::paste! {
            impl actix_web::dev::HttpServiceFactory for [<$name:camel Route>] {
                fn register(self, config: &mut actix_web::dev::AppService) {
                    let res = actix_web::Resource::new($path)
                        .name(stringify!($name))
                        .guard(actix_web::guard::$method())
                        .to($name);
                    actix_web::dev::HttpServiceFactory::register(res, config);
                }
            }
        }
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(order_by_id => Get "/order/{order_id}");
/// Single-document read, cached with the document windows. A missing order is a failure of the producer, so it
/// propagates as 404 and is never cached; the next read goes back to the store.
pub async fn order_by_id(
    path: web::Path<String>,
    api: web::Data<OrdersApi<SqliteStore>>,
    cache: web::Data<CacheStore>,
    cfg: web::Data<CacheConfig>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::new(path.into_inner());
    let key = format!("order:{order_id}");
    let status = cache.peek(&key).await;
    debug!("💻️ GET order {order_id} ({})", status.label());
    let producer_id = order_id.clone();
    let value = cache
        .remember(&key, cfg.doc_ttl, cfg.doc_swr, move || async move {
            match api.fetch_order(&producer_id).await? {
                Some(order) => {
                    serde_json::to_value(&order).map_err(|e| PaymentStoreError::EncodingError(e.to_string()))
                },
                None => Err(PaymentStoreError::OrderNotFound(producer_id.clone())),
            }
        })
        .await?;
    Ok(HttpResponse::Ok().insert_header((CACHE_STATUS_HEADER, status.label())).json(value))
}

route!(orders => Get "/orders");
/// List/query read, cached with the list windows. The filter's display form is the cache-key suffix, so equal
/// filters share an entry and the whole family can be invalidated with the `orders:` prefix.
pub async fn orders(
    query: web::Query<OrderQueryFilter>,
    api: web::Data<OrdersApi<SqliteStore>>,
    cache: web::Data<CacheStore>,
    cfg: web::Data<CacheConfig>,
) -> Result<HttpResponse, ServerError> {
    let filter = query.into_inner();
    let key = format!("orders:{filter}");
    let status = cache.peek(&key).await;
    debug!("💻️ GET orders [{filter}] ({})", status.label());
    let value = cache
        .remember(&key, cfg.list_ttl, cfg.list_swr, move || async move {
            let orders = api.search(&filter).await?;
            let result = OrderListResult { total: orders.len(), orders };
            serde_json::to_value(&result).map_err(|e| PaymentStoreError::EncodingError(e.to_string()))
        })
        .await?;
    Ok(HttpResponse::Ok().insert_header((CACHE_STATUS_HEADER, status.label())).json(value))
}
