mod amounts;
mod shipping;
mod timestamps;
mod webhook_signature;

pub use amounts::recompute_totals;
pub use shipping::normalize_shipping;
pub use timestamps::{parse_epoch, parse_instant, select_placed_at};
pub use webhook_signature::{calculate_webhook_hmac, verify_webhook_signature};
