use std::fmt::Write as _;

use crate::db_types::{OrderRecord, ShippingAddress};

const MISSING: &str = "(not provided)";

fn field(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty()).unwrap_or(MISSING)
}

/// The shipping block shared by both messages. Missing fields render as placeholder text rather than being
/// dropped, so the two messages are always the same shape.
fn shipping_block(addr: &ShippingAddress) -> String {
    let mut block = String::new();
    let _ = writeln!(block, "  {}", field(&addr.addr1));
    if let Some(addr2) = addr.addr2.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let _ = writeln!(block, "  {addr2}");
    }
    let _ = writeln!(block, "  {}, {} {}", field(&addr.city), field(&addr.state), field(&addr.postal));
    let _ = writeln!(block, "  {}", field(&addr.country));
    block
}

fn line_items_block(order: &OrderRecord) -> String {
    if order.line_items.is_empty() {
        return format!("  {MISSING}\n");
    }
    let mut block = String::new();
    for item in &order.line_items {
        let _ = writeln!(block, "  {} x{} @ {} = {}", item.name, item.quantity, item.price, item.line_total());
    }
    block
}

/// Customer receipt body. Deterministic over the order snapshot.
pub fn render_receipt(order: &OrderRecord) -> String {
    let currency = order.amounts.currency_or_default();
    format!(
        "Thank you for your order {id}!\n\nItems:\n{items}\nTotal: {total} {currency}\n\nShipping to:\n{shipping}\n\
         We will let you know as soon as your order ships.\n",
        id = order.order_id,
        items = line_items_block(order),
        total = order.amounts.total,
        shipping = shipping_block(&order.shipping_address()),
    )
}

/// Operations notification body. Deterministic over the order snapshot.
pub fn render_admin_notice(order: &OrderRecord) -> String {
    let currency = order.amounts.currency_or_default();
    format!(
        "Order {id} has been paid.\n\nGateway refs: order={gw_order} payment={gw_payment}\n\nItems:\n{items}\n\
         Total: {total} {currency}\n\nShip to:\n{shipping}",
        id = order.order_id,
        gw_order = order.payment.gateway_order_id.as_deref().unwrap_or(MISSING),
        gw_payment = order.payment.gateway_payment_id.as_deref().unwrap_or(MISSING),
        items = line_items_block(order),
        total = order.amounts.total,
        shipping = shipping_block(&order.shipping_address()),
    )
}
