//! Decomposition result cache.
//!
//! Claim extraction is the most expensive LLM call in the pipeline and is
//! required to be idempotent for identical input, so repeated audits of
//! the same response text reuse the first extraction instead of paying
//! for another round trip.

use std::hash::{Hash, Hasher};
use std::time::Duration;

use attest_core::Claim;
use moka::future::Cache;

/// Cache of extracted claims, keyed by a hash of the response text.
pub struct DecompositionCache {
    cache: Cache<u64, Vec<Claim>>,
}

impl DecompositionCache {
    /// Create a cache with the given capacity and entry TTL.
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    /// Look up the claims for a response text.
    pub async fn get(&self, response: &str) -> Option<Vec<Claim>> {
        self.cache.get(&hash_response(response)).await
    }

    /// Store extracted claims for a response text.
    pub async fn insert(&self, response: &str, claims: Vec<Claim>) {
        self.cache.insert(hash_response(response), claims).await;
    }

    /// Number of cached entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for DecompositionCache {
    fn default() -> Self {
        Self::new(10_000, Duration::from_secs(3600))
    }
}

fn hash_response(response: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    let mut hasher = DefaultHasher::new();
    response.hash(&mut hasher);
    hasher.finish()
}
