use std::{net::SocketAddr, str::FromStr, time::Duration};

use actix_web::{
    dev::{Server, Service},
    error::ErrorForbidden,
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpServer,
};
use futures::{future::ok, FutureExt};
use log::{info, warn};
use storefront_payment_engine::{
    notifications::NotificationDispatcher,
    CacheStore,
    OrderReconciler,
    OrdersApi,
    SqliteStore,
};

use crate::{
    config::{ServerConfig, GATEWAY_HMAC_HEADER},
    errors::ServerError,
    integrations::mailer::RelayMailer,
    middleware::HmacMiddlewareFactory,
    routes::{health, OrderByIdRoute, OrdersRoute},
    webhook_routes::GatewayWebhookRoute,
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteStore::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let srv = create_server_instance(config, db)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(config: ServerConfig, db: SqliteStore) -> Result<Server, ServerError> {
    // One cache for the whole process, constructed before the worker factory so every worker shares it. The
    // staleness bounds in the configuration hold per process, not per worker and not cluster-wide.
    let cache = CacheStore::new();
    let mailer = RelayMailer::new(config.mailer.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let dispatcher = NotificationDispatcher::new(mailer.clone(), config.mailer.admin_address.clone());
        let reconciler = OrderReconciler::new(db.clone(), dispatcher);
        let orders_api = OrdersApi::new(db.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("spg::access_log"))
            .app_data(web::Data::new(cache.clone()))
            .app_data(web::Data::new(config.cache))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(reconciler));
        let use_x_forwarded_for = config.use_x_forwarded_for;
        let use_forwarded = config.use_forwarded;
        let gateway_whitelist = config.gateway.whitelist.clone();
        let gateway_scope = web::scope("/gateway")
            .wrap(HmacMiddlewareFactory::new(
                GATEWAY_HMAC_HEADER,
                config.gateway.hmac_secret.clone(),
                config.gateway.hmac_checks,
            ))
            .wrap_fn(move |req, srv| {
                // Collect the peer IP from the x-forwarded-for or forwarded headers _if_ the matching flag has
                // been set in the configuration. Otherwise, use the peer address from the connection info.
                let peer_addr = req.connection_info().peer_addr().map(|a| a.to_string());
                let peer_ip = req
                    .headers()
                    .get("X-Forwarded-For")
                    .and_then(|v| use_x_forwarded_for.then(|| v.to_str().ok()).flatten())
                    .or_else(|| {
                        req.headers().get("Forwarded").and_then(|v| use_forwarded.then(|| v.to_str().ok()).flatten())
                    })
                    .and_then(|s| std::net::IpAddr::from_str(s).ok())
                    .or_else(|| {
                        peer_addr.as_deref().and_then(|s| SocketAddr::from_str(s).ok()).map(|addr| addr.ip())
                    });
                let whitelisted = match (peer_ip, &gateway_whitelist) {
                    (Some(ip), Some(whitelist)) => {
                        info!("Gateway webhook from {ip}");
                        whitelist.contains(&ip)
                    },
                    (_, None) => true,
                    (None, Some(_)) => {
                        warn!("No IP address found in gateway peer request, denying access.");
                        false
                    },
                };
                if whitelisted {
                    srv.call(req).boxed_local()
                } else {
                    ok(req.error_response(ErrorForbidden("Peer address not allowed."))).boxed_local()
                }
            })
            .service(GatewayWebhookRoute::<SqliteStore, RelayMailer>::new());
        app.service(health).service(OrderByIdRoute::new()).service(OrdersRoute::new()).service(gateway_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
