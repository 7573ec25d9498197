//! Behaviour contracts for backends supporting the payment gateway.
//!
//! The canonical store already provides atomic read-modify-write transactions; backends implement these traits
//! on top of that primitive. The engine never reaches past them.

mod payment_store;

pub use payment_store::{CaptureOutcome, PaymentStore, PaymentStoreError};
