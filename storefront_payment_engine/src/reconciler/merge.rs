use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
    db_types::{OrderRecord, OrderStatusType, PaymentInfo},
    gateway_types::CapturedPayment,
    helpers::{normalize_shipping, parse_epoch, recompute_totals, select_placed_at},
};

/// Derive the paid version of an order from its freshly-read snapshot and a captured payment.
///
/// Pure: backends call this between the read and the conditional write of one atomic transaction, so every
/// written value comes from canonical state, never from data computed before the transaction began.
///
/// Idempotent by construction: every derived field is recomputed from stored data (the inbound event contributes
/// only identifiers and mode), so re-applying the same capture changes nothing observable except `updated_at`.
/// `payment.verified_at` is set-once for the same reason.
pub fn merge_paid_order(order: &OrderRecord, capture: &CapturedPayment, now: DateTime<Utc>) -> OrderRecord {
    let amounts = recompute_totals(order);
    let shipping = normalize_shipping(order.shipping.as_ref());
    let placed_at = select_placed_at(
        &[
            order.placed_at,
            Some(order.created_at),
            order.payment.verified_at,
            Some(order.updated_at),
            capture.created_epoch.and_then(parse_epoch),
        ],
        now,
    );
    let payment = PaymentInfo {
        status: Some(capture.status_text.clone()),
        mode: capture.mode.clone().or_else(|| order.payment.mode.clone()),
        gateway_order_id: Some(capture.gateway_order_id.clone()),
        gateway_payment_id: Some(capture.gateway_payment_id.clone()),
        amount: Some(amounts.total),
        verified_at: order.payment.verified_at.or(Some(now)),
    };
    OrderRecord {
        status: OrderStatusType::Paid,
        amounts,
        shipping: Some(serde_json::to_value(&shipping).unwrap_or(Value::Null)),
        payment,
        placed_at: Some(placed_at),
        updated_at: now,
        source: Some("webhook".to_string()),
        ..order.clone()
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;
    use serde_json::json;
    use spg_common::Money;

    use super::*;
    use crate::db_types::{LineItem, NotificationState, OrderAmounts, OrderId};

    fn capture() -> CapturedPayment {
        CapturedPayment {
            gateway_order_id: "gw_55".into(),
            gateway_payment_id: "pay_91".into(),
            mode: Some("card".into()),
            status_text: "captured".into(),
            created_epoch: None,
        }
    }

    fn created_order() -> OrderRecord {
        OrderRecord {
            id: 3,
            order_id: OrderId::new("1042"),
            status: OrderStatusType::Created,
            amounts: OrderAmounts::default(),
            shipping: Some(json!({"address_1": "5 Sencha St", "zip": "98001", "province": "WA"})),
            line_items: vec![
                LineItem { sku: None, name: "Teapot".into(), price: Money::from(500), quantity: 2 },
                LineItem { sku: None, name: "Infuser".into(), price: Money::from(300), quantity: 1 },
            ],
            customer_email: Some("kai@example.com".into()),
            payment: PaymentInfo::default(),
            notification: NotificationState::default(),
            source: Some("checkout".into()),
            placed_at: None,
            created_at: Utc.with_ymd_and_hms(2024, 5, 4, 12, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 5, 4, 12, 5, 0).unwrap(),
        }
    }

    #[test]
    fn merge_derives_everything_from_stored_state() {
        let now = Utc.with_ymd_and_hms(2024, 5, 4, 13, 0, 0).unwrap();
        let merged = merge_paid_order(&created_order(), &capture(), now);
        assert_eq!(merged.status, OrderStatusType::Paid);
        assert_eq!(merged.amounts.total, Money::from(1300));
        assert_eq!(merged.payment.amount, Some(Money::from(1300)));
        assert_eq!(merged.payment.gateway_order_id.as_deref(), Some("gw_55"));
        assert_eq!(merged.payment.verified_at, Some(now));
        assert_eq!(merged.placed_at, Some(Utc.with_ymd_and_hms(2024, 5, 4, 12, 0, 0).unwrap()));
        assert_eq!(merged.source.as_deref(), Some("webhook"));
        // Unrelated fields are preserved, not replaced.
        assert_eq!(merged.customer_email.as_deref(), Some("kai@example.com"));
        assert_eq!(merged.line_items.len(), 2);
        // Legacy shipping fields were collapsed into the canonical shape.
        let shipping = merged.shipping.as_ref().unwrap();
        assert_eq!(shipping["addr1"], json!("5 Sencha St"));
        assert_eq!(shipping["postal"], json!("98001"));
        assert_eq!(shipping["state"], json!("WA"));
    }

    #[test]
    fn reapplication_only_moves_updated_at() {
        let t1 = Utc.with_ymd_and_hms(2024, 5, 4, 13, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 5, 4, 13, 25, 0).unwrap();
        let first = merge_paid_order(&created_order(), &capture(), t1);
        let second = merge_paid_order(&first, &capture(), t2);
        assert_eq!(second.updated_at, t2);
        assert_eq!(second.amounts, first.amounts);
        assert_eq!(second.shipping, first.shipping);
        assert_eq!(second.payment, first.payment);
        assert_eq!(second.placed_at, first.placed_at);
        assert_eq!(second.status, first.status);
    }

    #[test]
    fn gateway_epoch_can_win_placed_at() {
        let mut capture = capture();
        // 2024-05-04T10:00:00Z, earlier than every stored candidate.
        capture.created_epoch = Some(1_714_816_800);
        let now = Utc.with_ymd_and_hms(2024, 5, 4, 13, 0, 0).unwrap();
        let merged = merge_paid_order(&created_order(), &capture, now);
        assert_eq!(merged.placed_at, Some(Utc.timestamp_opt(1_714_816_800, 0).unwrap()));
    }

    #[test]
    fn notification_flags_are_never_touched() {
        let mut order = created_order();
        let sent_at = Utc.with_ymd_and_hms(2024, 5, 4, 12, 30, 0).unwrap();
        order.notification = NotificationState { customer_sent_at: Some(sent_at), admin_sent_at: None };
        let merged = merge_paid_order(&order, &capture(), Utc::now());
        assert_eq!(merged.notification.customer_sent_at, Some(sent_at));
        assert_eq!(merged.notification.admin_sent_at, None);
    }
}
