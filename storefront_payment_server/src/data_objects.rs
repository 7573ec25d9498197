use std::fmt::Display;

use serde::{Deserialize, Serialize};
use storefront_payment_engine::db_types::OrderRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// The payload of the cached list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderListResult {
    pub total: usize,
    pub orders: Vec<OrderRecord>,
}
