use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_KEY_CACHE_TTL;

/// Settings for a [`CsrBuilderFactory`](crate::csr::CsrBuilderFactory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KmsCsrConfig {
    /// Seconds a key stays cached after its last use.
    pub key_cache_ttl_secs: u64,
}

impl Default for KmsCsrConfig {
    fn default() -> Self {
        Self {
            key_cache_ttl_secs: DEFAULT_KEY_CACHE_TTL.as_secs(),
        }
    }
}

impl KmsCsrConfig {
    pub fn key_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.key_cache_ttl_secs)
    }

    pub fn with_key_cache_ttl(mut self, ttl: Duration) -> Self {
        self.key_cache_ttl_secs = ttl.as_secs();
        self
    }
}
