use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::{render_admin_notice, render_receipt, NotificationError};
use crate::db_types::OrderRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// A message-sending capability with a single primitive. The server provides a relay-backed implementation;
/// tests provide recording or failing fakes.
#[allow(async_fn_in_trait)]
pub trait MessageSender: Clone {
    async fn send(&self, message: OutboundMessage) -> Result<(), NotificationError>;
}

#[derive(Debug)]
pub enum ChannelOutcome {
    Sent,
    /// The channel had nowhere to deliver to (e.g. no customer address). Counts as delivered so the order still
    /// converges to "notified".
    Skipped,
    Failed(NotificationError),
}

impl ChannelOutcome {
    /// True when the channel needs no further attempts.
    pub fn delivered(&self) -> bool {
        matches!(self, ChannelOutcome::Sent | ChannelOutcome::Skipped)
    }
}

#[derive(Debug)]
pub struct DispatchResult {
    pub customer: ChannelOutcome,
    pub admin: ChannelOutcome,
}

/// Sends the two post-payment notifications for a reconciled order snapshot.
///
/// The customer receipt and the operations notification are independent: failure of one neither prevents nor
/// rolls back the other, and failures are reported to the caller rather than retried here.
#[derive(Clone)]
pub struct NotificationDispatcher<S> {
    sender: S,
    admin_address: String,
}

impl<S> NotificationDispatcher<S>
where S: MessageSender
{
    pub fn new<A: Into<String>>(sender: S, admin_address: A) -> Self {
        Self { sender, admin_address: admin_address.into() }
    }

    pub async fn send(&self, order: &OrderRecord) -> DispatchResult {
        let customer = match &order.customer_email {
            None => {
                debug!("📧️ Order {} has no customer address; skipping the receipt", order.order_id);
                ChannelOutcome::Skipped
            },
            Some(email) => {
                let message = OutboundMessage {
                    to: email.clone(),
                    subject: format!("Your order {} is confirmed", order.order_id),
                    body: render_receipt(order),
                };
                self.deliver(message).await
            },
        };
        let admin_message = OutboundMessage {
            to: self.admin_address.clone(),
            subject: format!("Order {} paid", order.order_id),
            body: render_admin_notice(order),
        };
        let admin = self.deliver(admin_message).await;
        DispatchResult { customer, admin }
    }

    async fn deliver(&self, message: OutboundMessage) -> ChannelOutcome {
        let recipient = message.to.clone();
        match self.sender.send(message).await {
            Ok(()) => {
                debug!("📧️ Message delivered to {recipient}");
                ChannelOutcome::Sent
            },
            Err(e) => {
                warn!("📧️ Could not deliver message to {recipient}. {e}");
                ChannelOutcome::Failed(e)
            },
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use chrono::Utc;
    use spg_common::Money;

    use super::*;
    use crate::db_types::{NotificationState, OrderAmounts, OrderStatusType, PaymentInfo};

    #[derive(Clone, Default)]
    struct RecordingSender {
        sent: Arc<Mutex<Vec<OutboundMessage>>>,
        fail_for: Option<String>,
    }

    impl MessageSender for RecordingSender {
        async fn send(&self, message: OutboundMessage) -> Result<(), NotificationError> {
            if self.fail_for.as_deref() == Some(message.to.as_str()) {
                return Err(NotificationError::DeliveryFailed {
                    recipient: message.to.clone(),
                    reason: "connection reset".into(),
                });
            }
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    fn order(customer_email: Option<&str>) -> OrderRecord {
        OrderRecord {
            id: 1,
            order_id: "1001".into(),
            status: OrderStatusType::Paid,
            amounts: OrderAmounts { total: Money::from(1300), currency: "USD".into(), ..Default::default() },
            shipping: None,
            line_items: vec![],
            customer_email: customer_email.map(String::from),
            payment: PaymentInfo::default(),
            notification: NotificationState::default(),
            source: None,
            placed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sends_both_messages() {
        let sender = RecordingSender::default();
        let dispatcher = NotificationDispatcher::new(sender.clone(), "ops@example.com");
        let result = dispatcher.send(&order(Some("kai@example.com"))).await;
        assert!(result.customer.delivered());
        assert!(result.admin.delivered());
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "kai@example.com");
        assert_eq!(sent[1].to, "ops@example.com");
    }

    #[tokio::test]
    async fn missing_customer_address_skips_receipt_but_counts_delivered() {
        let sender = RecordingSender::default();
        let dispatcher = NotificationDispatcher::new(sender.clone(), "ops@example.com");
        let result = dispatcher.send(&order(None)).await;
        assert!(matches!(result.customer, ChannelOutcome::Skipped));
        assert!(result.customer.delivered());
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ops@example.com");
    }

    #[tokio::test]
    async fn customer_failure_does_not_stop_admin_send() {
        let sender = RecordingSender { fail_for: Some("kai@example.com".into()), ..Default::default() };
        let dispatcher = NotificationDispatcher::new(sender.clone(), "ops@example.com");
        let result = dispatcher.send(&order(Some("kai@example.com"))).await;
        assert!(matches!(result.customer, ChannelOutcome::Failed(_)));
        assert!(result.admin.delivered());
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ops@example.com");
    }

    #[tokio::test]
    async fn admin_failure_does_not_undo_customer_send() {
        let sender = RecordingSender { fail_for: Some("ops@example.com".into()), ..Default::default() };
        let dispatcher = NotificationDispatcher::new(sender.clone(), "ops@example.com");
        let result = dispatcher.send(&order(Some("kai@example.com"))).await;
        assert!(result.customer.delivered());
        assert!(matches!(result.admin, ChannelOutcome::Failed(_)));
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "kai@example.com");
    }
}
