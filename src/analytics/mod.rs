//! Typing analytics: in-memory statistics and on-disk persistence

mod stats;
mod store;

pub use stats::{AnalyticsSnapshot, HandBalance, KeyStats};
pub use store::AnalyticsStore;

use serde::{Deserialize, Serialize};

/// One key's cumulative press count.
///
/// Doubles as the on-disk record and the top-keys entry in snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCountEntry {
    pub key: String,
    pub count: u64,
}
