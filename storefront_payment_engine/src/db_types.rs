use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spg_common::{Money, DEFAULT_CURRENCY_CODE};
use sqlx::Type;
use thiserror::Error;

//--------------------------------------      OrderId        ---------------------------------------------------------
/// A lightweight wrapper around the storefront's order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<String>> From<S> for OrderId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

//--------------------------------------   OrderStatusType   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order exists but payment has not been confirmed yet.
    Created,
    /// Payment has been captured and reconciled against the order.
    Paid,
    /// The order was cancelled outside of this subsystem. Terminal and absorbing here.
    Cancelled,
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Created => write!(f, "Created"),
            OrderStatusType::Paid => write!(f, "Paid"),
            OrderStatusType::Cancelled => write!(f, "Cancelled"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion from string: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Created" => Ok(Self::Created),
            "Paid" => Ok(Self::Paid),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Created");
            OrderStatusType::Created
        })
    }
}

//--------------------------------------    OrderAmounts     ---------------------------------------------------------
/// The canonical monetary breakdown of an order, in minor units of `currency`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAmounts {
    pub subtotal: Money,
    pub shipping: Money,
    pub tax: Money,
    pub total: Money,
    pub currency: String,
}

impl OrderAmounts {
    /// True when none of the itemised components carry a value.
    pub fn components_empty(&self) -> bool {
        self.subtotal.is_zero() && self.shipping.is_zero() && self.tax.is_zero()
    }

    pub fn currency_or_default(&self) -> &str {
        if self.currency.trim().is_empty() {
            DEFAULT_CURRENCY_CODE
        } else {
            self.currency.as_str()
        }
    }
}

//--------------------------------------   ShippingAddress   ---------------------------------------------------------
/// The canonical shipping shape. Stored rows may carry older field layouts; those are collapsed into this shape by
/// [`crate::helpers::normalize_shipping`] every time an order is merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub addr1: Option<String>,
    pub addr2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal: Option<String>,
    pub country: Option<String>,
}

impl ShippingAddress {
    pub fn is_empty(&self) -> bool {
        self.addr1.is_none()
            && self.addr2.is_none()
            && self.city.is_none()
            && self.state.is_none()
            && self.postal.is_none()
            && self.country.is_none()
    }
}

//--------------------------------------      LineItem       ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub sku: Option<String>,
    pub name: String,
    /// Unit price in minor units.
    pub price: Money,
    pub quantity: i64,
}

impl LineItem {
    pub fn line_total(&self) -> Money {
        self.price * self.quantity
    }
}

//--------------------------------------     PaymentInfo     ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub status: Option<String>,
    pub mode: Option<String>,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub amount: Option<Money>,
    pub verified_at: Option<DateTime<Utc>>,
}

//--------------------------------------  NotificationState  ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationState {
    pub customer_sent_at: Option<DateTime<Utc>>,
    pub admin_sent_at: Option<DateTime<Utc>>,
}

impl NotificationState {
    /// Both channels have been flagged; nothing further to send.
    pub fn is_complete(&self) -> bool {
        self.customer_sent_at.is_some() && self.admin_sent_at.is_some()
    }
}

//--------------------------------------     OrderRecord     ---------------------------------------------------------
/// The canonical order record, owned by the transactional store and mutated only through merge writes.
///
/// `shipping` is kept as the raw stored JSON because historical rows use varying field names; it is normalized to
/// [`ShippingAddress`] on every merge and written back in the canonical shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: i64,
    pub order_id: OrderId,
    pub status: OrderStatusType,
    pub amounts: OrderAmounts,
    pub shipping: Option<Value>,
    pub line_items: Vec<LineItem>,
    pub customer_email: Option<String>,
    pub payment: PaymentInfo,
    pub notification: NotificationState,
    pub source: Option<String>,
    pub placed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
    /// The canonical shipping shape for this record, tolerant of legacy field layouts.
    pub fn shipping_address(&self) -> ShippingAddress {
        crate::helpers::normalize_shipping(self.shipping.as_ref())
    }
}

impl Display for OrderRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Order {} [{}]: {} {} ({} items)",
            self.order_id,
            self.status,
            self.amounts.total,
            self.amounts.currency_or_default(),
            self.line_items.len()
        )
    }
}

//--------------------------------------  OrderQueryFilter   ---------------------------------------------------------
/// Filter for list/query reads. Also acts as the cache-key suffix for cached list results, so its `Display` form
/// must be stable for equal filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderQueryFilter {
    #[serde(default)]
    pub status: Option<OrderStatusType>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
}

impl OrderQueryFilter {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.since.is_none() && self.until.is_none()
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status.map(|s| s.to_string()).unwrap_or_else(|| "any".into());
        let since = self.since.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into());
        let until = self.until.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into());
        write!(f, "{status}:{since}:{until}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_status_round_trip() {
        for status in [OrderStatusType::Created, OrderStatusType::Paid, OrderStatusType::Cancelled] {
            let s = status.to_string();
            assert_eq!(s.parse::<OrderStatusType>().unwrap(), status);
        }
        assert!("Refunded".parse::<OrderStatusType>().is_err());
    }

    #[test]
    fn line_totals() {
        let item = LineItem { sku: None, name: "Tea".into(), price: Money::from(500), quantity: 2 };
        assert_eq!(item.line_total(), Money::from(1000));
    }

    #[test]
    fn filter_display_is_stable() {
        let filter = OrderQueryFilter { status: Some(OrderStatusType::Paid), since: None, until: None };
        assert_eq!(filter.to_string(), "Paid:-:-");
        assert_eq!(OrderQueryFilter::default().to_string(), "any:-:-");
    }
}
