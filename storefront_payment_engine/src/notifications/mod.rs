//! Post-commit customer and operations notifications.
//!
//! Dispatch is a side effect of a successful reconciliation, never part of its transaction. Delivery is
//! at-least-once: the reconciler flags sent channels after the fact, and a crash between send and flag plus a
//! gateway retry can duplicate a message.

mod dispatcher;
mod render;

pub use dispatcher::{ChannelOutcome, DispatchResult, MessageSender, NotificationDispatcher, OutboundMessage};
pub use render::{render_admin_notice, render_receipt};

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    #[error("Could not deliver message to {recipient}. {reason}")]
    DeliveryFailed { recipient: String, reason: String },
    #[error("The message relay rejected the message. {0}")]
    Rejected(String),
}
