//! SQLite backend for the payment gateway.
//!
//! SQLite supplies the atomic read-modify-write transactions the canonical store contract requires; this module
//! only consumes them.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteStore;
