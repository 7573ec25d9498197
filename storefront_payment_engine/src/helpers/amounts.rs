use spg_common::Money;

use crate::db_types::{OrderAmounts, OrderRecord};

/// Recompute the canonical monetary totals for an order from already-stored data.
///
/// The cascade, in order of trust:
/// 1. itemised amount components already on the record (`subtotal + shipping + tax`);
/// 2. a total already on the record;
/// 3. a payment amount already on the record;
/// 4. the sum of stored line items (`price * quantity`).
///
/// The inbound event's own amount field is deliberately not a source: it may be partial, absent, or stale, and
/// using it would break idempotent re-application.
pub fn recompute_totals(order: &OrderRecord) -> OrderAmounts {
    let amounts = &order.amounts;
    let currency = amounts.currency_or_default().to_string();
    let total = if !amounts.components_empty() {
        amounts.subtotal + amounts.shipping + amounts.tax
    } else if !amounts.total.is_zero() {
        amounts.total
    } else if let Some(amount) = order.payment.amount.filter(|a| !a.is_zero()) {
        amount
    } else {
        order.line_items.iter().map(|item| item.line_total()).sum::<Money>()
    };
    OrderAmounts {
        subtotal: amounts.subtotal,
        shipping: amounts.shipping,
        tax: amounts.tax,
        total,
        currency,
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use spg_common::Money;

    use super::*;
    use crate::db_types::{LineItem, NotificationState, OrderRecord, OrderStatusType, PaymentInfo};

    fn bare_order() -> OrderRecord {
        OrderRecord {
            id: 1,
            order_id: "1001".into(),
            status: OrderStatusType::Created,
            amounts: OrderAmounts::default(),
            shipping: None,
            line_items: vec![],
            customer_email: None,
            payment: PaymentInfo::default(),
            notification: NotificationState::default(),
            source: None,
            placed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn components_win_over_everything() {
        let mut order = bare_order();
        order.amounts.subtotal = Money::from(1000);
        order.amounts.shipping = Money::from(150);
        order.amounts.tax = Money::from(85);
        order.amounts.total = Money::from(9999);
        order.payment.amount = Some(Money::from(5));
        let amounts = recompute_totals(&order);
        assert_eq!(amounts.total, Money::from(1235));
    }

    #[test]
    fn stored_total_survives_when_components_are_empty() {
        let mut order = bare_order();
        order.amounts.total = Money::from(4200);
        order.line_items.push(LineItem { sku: None, name: "x".into(), price: Money::from(1), quantity: 1 });
        assert_eq!(recompute_totals(&order).total, Money::from(4200));
    }

    #[test]
    fn payment_amount_beats_line_items() {
        let mut order = bare_order();
        order.payment.amount = Some(Money::from(777));
        order.line_items.push(LineItem { sku: None, name: "x".into(), price: Money::from(1), quantity: 1 });
        assert_eq!(recompute_totals(&order).total, Money::from(777));
    }

    #[test]
    fn line_items_sum_as_last_resort() {
        let mut order = bare_order();
        order.line_items = vec![
            LineItem { sku: None, name: "Teapot".into(), price: Money::from(500), quantity: 2 },
            LineItem { sku: None, name: "Infuser".into(), price: Money::from(300), quantity: 1 },
        ];
        let amounts = recompute_totals(&order);
        assert_eq!(amounts.total, Money::from(1300));
        assert_eq!(amounts.currency, "USD");
    }

    #[test]
    fn stored_currency_is_preserved() {
        let mut order = bare_order();
        order.amounts.currency = "EUR".into();
        order.amounts.total = Money::from(100);
        assert_eq!(recompute_totals(&order).currency, "EUR");
    }
}
