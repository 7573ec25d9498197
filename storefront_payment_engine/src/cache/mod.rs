//! Process-wide read cache with stale-while-revalidate semantics.
//!
//! One [`CacheStore`] is constructed at process start and handed (cloned) to every consumer. Staleness bounds are
//! therefore per process: running multiple instances multiplies the effective staleness window, which is an
//! accepted scale limitation of the design.

mod store;

pub use store::{CacheStatus, CacheStore};
