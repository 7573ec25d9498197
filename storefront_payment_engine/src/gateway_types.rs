//! Inbound payment-gateway event types.
//!
//! Events arrive as signed webhook payloads. The payload is a strictly validated tagged union over the event kinds
//! the gateway is known to send; anything outside the recognized shape fails deserialization and is acknowledged
//! without processing, rather than best-effort parsed.

use serde::{Deserialize, Serialize};

/// Status texts the gateway uses for a settled (or settling) payment. Anything else is not paid-equivalent.
const PAID_EQUIVALENT_STATUS: [&str; 5] = ["captured", "authorized", "paid", "success", "completed"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum GatewayEvent {
    #[serde(rename = "payment.captured")]
    PaymentCaptured(PaymentEventData),
    #[serde(rename = "payment.authorized")]
    PaymentAuthorized(PaymentEventData),
    #[serde(rename = "payment.pending")]
    PaymentPending(PaymentEventData),
    #[serde(rename = "payment.failed")]
    PaymentFailed(PaymentEventData),
    #[serde(rename = "payment.refund_initiated")]
    RefundInitiated(PaymentEventData),
}

/// The common body of every payment event.
///
/// `amount` is whatever the gateway reported, which may be partial or absent. It is carried for logging only and is
/// never used to derive stored totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentEventData {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub payment_mode: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    /// Unix epoch (seconds or milliseconds) at which the gateway created the underlying payment object.
    #[serde(default)]
    pub created_epoch: Option<i64>,
}

/// A classified, paid-equivalent payment event, ready for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPayment {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub mode: Option<String>,
    pub status_text: String,
    pub created_epoch: Option<i64>,
}

impl GatewayEvent {
    pub fn data(&self) -> &PaymentEventData {
        match self {
            GatewayEvent::PaymentCaptured(d)
            | GatewayEvent::PaymentAuthorized(d)
            | GatewayEvent::PaymentPending(d)
            | GatewayEvent::PaymentFailed(d)
            | GatewayEvent::RefundInitiated(d) => d,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            GatewayEvent::PaymentCaptured(_) => "payment.captured",
            GatewayEvent::PaymentAuthorized(_) => "payment.authorized",
            GatewayEvent::PaymentPending(_) => "payment.pending",
            GatewayEvent::PaymentFailed(_) => "payment.failed",
            GatewayEvent::RefundInitiated(_) => "payment.refund_initiated",
        }
    }

    /// Classify the event. Only captured/authorized events whose status text is paid-equivalent proceed to
    /// reconciliation; everything else is acknowledged and dropped by the caller.
    pub fn as_capture(&self) -> Option<CapturedPayment> {
        let data = match self {
            GatewayEvent::PaymentCaptured(d) | GatewayEvent::PaymentAuthorized(d) => d,
            _ => return None,
        };
        let status_text = match &data.payment_status {
            // A captured/authorized event with no status text means the event type itself is the status.
            None => self.event_type().trim_start_matches("payment.").to_string(),
            Some(s) if PAID_EQUIVALENT_STATUS.contains(&s.trim().to_ascii_lowercase().as_str()) => s.clone(),
            Some(_) => return None,
        };
        Some(CapturedPayment {
            gateway_order_id: data.gateway_order_id.clone(),
            gateway_payment_id: data.gateway_payment_id.clone(),
            mode: data.payment_mode.clone(),
            status_text,
            created_epoch: data.created_epoch,
        })
    }
}
