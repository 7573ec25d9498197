use std::fmt::Debug;

use chrono::Utc;
use log::*;
use thiserror::Error;

use crate::{
    db_types::{OrderId, OrderRecord, OrderStatusType},
    gateway_types::GatewayEvent,
    notifications::{MessageSender, NotificationDispatcher},
    traits::{CaptureOutcome, PaymentStore, PaymentStoreError},
};

/// What a webhook delivery amounted to. Everything except an `Err` from [`OrderReconciler::reconcile`] is
/// acknowledged to the gateway as success so that it does not retry events this system intentionally ignores.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// The event kind or status is not paid-equivalent. Acknowledged, no mutation.
    Ignored(&'static str),
    /// No order exists for the gateway order id. Acknowledged, no mutation — orders are only ever created by
    /// the checkout flow, never from a payment event.
    UnknownOrder(String),
    /// The order was cancelled by a collaborator. Acknowledged, no mutation.
    CancelledOrder(OrderId),
    /// The capture was applied and the order transitioned to `Paid`.
    Applied { order: OrderRecord, notified: bool },
    /// The order was already `Paid`; re-application was a no-op apart from `updated_at`.
    AlreadyApplied { order: OrderRecord, notified: bool },
}

#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    /// The canonical store failed mid-flight. Surfaced to the transport as a retryable failure; the gateway
    /// will redeliver, and reconciliation is idempotent, so the retry is safe.
    #[error("Store failure while reconciling gateway order {gateway_order_id}. {source}")]
    Store {
        gateway_order_id: String,
        #[source]
        source: PaymentStoreError,
    },
}

/// `OrderReconciler` turns verified gateway payment events into exactly-once-effective updates of the canonical
/// order record, followed by at-least-once notification.
///
/// Signature verification happens at the transport boundary, over the raw payload bytes, before an event ever
/// reaches this API.
pub struct OrderReconciler<B, S> {
    db: B,
    dispatcher: NotificationDispatcher<S>,
}

impl<B, S> Debug for OrderReconciler<B, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderReconciler")
    }
}

impl<B, S> OrderReconciler<B, S>
where
    B: PaymentStore,
    S: MessageSender,
{
    pub fn new(db: B, dispatcher: NotificationDispatcher<S>) -> Self {
        Self { db, dispatcher }
    }

    /// Process one verified gateway event.
    ///
    /// The mutation itself happens inside a single backend transaction ([`PaymentStore::apply_payment_capture`]);
    /// if the order came out `Paid` and not yet fully notified, notifications are dispatched post-commit and the
    /// sent channels flagged with a second, set-once merge. The send-then-flag pair is deliberately not atomic
    /// with the capture transaction (accepted at-least-once delivery).
    pub async fn reconcile(&self, event: &GatewayEvent) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(capture) = event.as_capture() else {
            debug!("🔄️💰️ Event {} is not paid-equivalent; acknowledging without mutation", event.event_type());
            return Ok(ReconcileOutcome::Ignored(event.event_type()));
        };
        let gateway_order_id = capture.gateway_order_id.clone();
        let outcome = self
            .db
            .apply_payment_capture(&capture)
            .await
            .map_err(|source| ReconcileError::Store { gateway_order_id: gateway_order_id.clone(), source })?;
        match outcome {
            CaptureOutcome::NotFound => {
                info!("🔄️💰️ No order found for gateway order {gateway_order_id}; acknowledging without mutation");
                Ok(ReconcileOutcome::UnknownOrder(gateway_order_id))
            },
            CaptureOutcome::Cancelled(order) => {
                info!("🔄️💰️ Order {} is cancelled; payment capture {gateway_order_id} ignored", order.order_id);
                Ok(ReconcileOutcome::CancelledOrder(order.order_id))
            },
            CaptureOutcome::Applied(order) => {
                debug!("🔄️💰️ Order {} marked as paid for gateway order {gateway_order_id}", order.order_id);
                let (order, notified) = self.notify_if_needed(order).await?;
                Ok(ReconcileOutcome::Applied { order, notified })
            },
            CaptureOutcome::Reapplied(order) => {
                info!("🔄️💰️ Order {} was already paid; capture {gateway_order_id} re-applied idempotently", order.order_id);
                let (order, notified) = self.notify_if_needed(order).await?;
                Ok(ReconcileOutcome::AlreadyApplied { order, notified })
            },
        }
    }

    /// Dispatch notifications for a paid order unless both flags are already set, then flag the channels that
    /// were delivered. Channels that hard-failed keep their flag unset so the next gateway delivery retries
    /// them; a receipt skipped for lack of a customer address is flagged so the order still converges.
    async fn notify_if_needed(&self, order: OrderRecord) -> Result<(OrderRecord, bool), ReconcileError> {
        if order.status != OrderStatusType::Paid || order.notification.is_complete() {
            return Ok((order, false));
        }
        trace!("🔄️📧️ Order {} needs notifications", order.order_id);
        let result = self.dispatcher.send(&order).await;
        let now = Utc::now();
        let customer_sent_at = result.customer.delivered().then_some(now);
        let admin_sent_at = result.admin.delivered().then_some(now);
        if customer_sent_at.is_none() && admin_sent_at.is_none() {
            warn!("🔄️📧️ No notification channel succeeded for order {}; flags left unset", order.order_id);
            return Ok((order, false));
        }
        let flagged = self
            .db
            .mark_notified(&order.order_id, customer_sent_at, admin_sent_at)
            .await
            .map_err(|source| ReconcileError::Store {
                gateway_order_id: order.payment.gateway_order_id.clone().unwrap_or_default(),
                source,
            })?;
        debug!("🔄️📧️ Notification flags written for order {}", flagged.order_id);
        Ok((flagged, true))
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
