//----------------------------------------------   Gateway webhooks  --------------------------------------------------

use actix_web::{error::ResponseError, web, HttpRequest, HttpResponse};
use log::*;
use storefront_payment_engine::{
    db_types::OrderId,
    gateway_types::GatewayEvent,
    notifications::MessageSender,
    CacheStore,
    OrderReconciler,
    PaymentStore,
    ReconcileOutcome,
};

use crate::{data_objects::JsonResponse, errors::ServerError, route};

route!(gateway_webhook => Post "/webhook/payment" impl PaymentStore, MessageSender);
/// The payment-gateway webhook endpoint. The HMAC middleware has already verified the signature over the exact
/// raw bytes of `body` by the time this handler runs.
///
/// Responses are 2xx for everything except retryable internal failures; a non-2xx answer makes the gateway
/// redeliver, which is only wanted when a store transaction failed.
pub async fn gateway_webhook<BPay, SMail>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<OrderReconciler<BPay, SMail>>,
    cache: web::Data<CacheStore>,
) -> HttpResponse
where
    BPay: PaymentStore,
    SMail: MessageSender,
{
    trace!("🛒️ Received gateway webhook request: {}", req.uri());
    let event = match serde_json::from_slice::<GatewayEvent>(&body) {
        Ok(event) => event,
        Err(e) => {
            // Unknown event kinds are acknowledged, not errored: the gateway must not retry forever for
            // events this system does not recognize.
            warn!("🛒️ Unrecognized gateway event shape; acknowledging without processing. {e}");
            return HttpResponse::Ok().json(JsonResponse::success("Event ignored."));
        },
    };
    debug!("🛒️ Gateway event {} for order {}", event.event_type(), event.data().gateway_order_id);
    match api.reconcile(&event).await {
        Ok(ReconcileOutcome::Applied { order, notified }) => {
            info!("🛒️ Order {} reconciled as paid. Notifications dispatched: {notified}.", order.order_id);
            invalidate_order_cache(&cache, &order.order_id).await;
            HttpResponse::Ok().json(JsonResponse::success("Order reconciled."))
        },
        Ok(ReconcileOutcome::AlreadyApplied { order, .. }) => {
            info!("🛒️ Order {} was already paid; event re-applied idempotently.", order.order_id);
            invalidate_order_cache(&cache, &order.order_id).await;
            HttpResponse::Ok().json(JsonResponse::success("Order already reconciled."))
        },
        Ok(ReconcileOutcome::Ignored(kind)) => {
            debug!("🛒️ Gateway event {kind} is not paid-equivalent; acknowledged.");
            HttpResponse::Ok().json(JsonResponse::success("Event ignored."))
        },
        Ok(ReconcileOutcome::UnknownOrder(gateway_order_id)) => {
            info!("🛒️ No order matches gateway order {gateway_order_id}; acknowledged.");
            HttpResponse::Ok().json(JsonResponse::success("No matching order."))
        },
        Ok(ReconcileOutcome::CancelledOrder(order_id)) => {
            info!("🛒️ Order {order_id} is cancelled; payment event acknowledged and ignored.");
            HttpResponse::Ok().json(JsonResponse::success("Order is cancelled; event ignored."))
        },
        Err(e) => {
            warn!("🛒️ Could not reconcile gateway event. {e}");
            ServerError::from(e).error_response()
        },
    }
}

/// Drop the cached copies that a successful reconciliation just made stale: the order document itself, and every
/// cached list result.
async fn invalidate_order_cache(cache: &CacheStore, order_id: &OrderId) {
    cache.del(&format!("order:{order_id}")).await;
    cache.del("orders:").await;
}
