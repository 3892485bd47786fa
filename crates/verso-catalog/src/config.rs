//! Catalog configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the catalog engine.
///
/// All fields have sensible defaults; deployments typically deserialize this
/// from the service configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CatalogConfig {
    /// Deadline for acquiring the transactional-store lock, in milliseconds.
    /// Expiry surfaces as a store timeout.
    pub lock_timeout_ms: u64,

    /// Ceiling applied to listing page sizes. Requests for more (other than
    /// the unbounded `-1`) are clamped.
    pub max_list_amount: usize,

    /// Rows fetched per read transaction by the retention cursor.
    pub retention_batch_size: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 30_000,
            max_list_amount: 1_000,
            retention_batch_size: 1_000,
        }
    }
}

impl CatalogConfig {
    /// The store lock deadline as a `Duration`.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
