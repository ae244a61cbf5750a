/*
    config.rs - tunables for the DHT subsystem.

    Mirrors `spacepanda-core::core_dht::dht_config`: every constant spec.md names is
    represented here as an overridable default rather than baked into call sites, so
    tests can shrink timeouts/capacities without touching behavior.
*/

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::DhtError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhtConfig {
    /// Replication factor. Fixed at 3 by spec.md §4.1, kept configurable for tests.
    pub k: usize,

    /// Lookup concurrency bound (alpha).
    pub alpha: usize,

    /// Bucket capacity (distinct from `k`, the replication factor).
    pub bucket_capacity: usize,

    /// RPC call deadline (§4.4).
    #[serde(with = "humantime_serde")]
    pub rpc_deadline: Duration,

    /// Result cache capacity (§4.3).
    pub cache_capacity: usize,

    /// Result cache background-refresh debounce (§4.3).
    #[serde(with = "humantime_serde")]
    pub cache_refresh_debounce: Duration,

    /// Redistribution debounce per affected peer (§4.5).
    #[serde(with = "humantime_serde")]
    pub redistribution_debounce: Duration,

    /// Seed-contact tick interval (§4.6).
    #[serde(with = "humantime_serde")]
    pub seed_contact_interval: Duration,

    /// Stale-eviction tick interval (§4.6).
    #[serde(with = "humantime_serde")]
    pub stale_eviction_interval: Duration,

    /// Threshold past which a peer's `last_connected` makes it stale (§4.6).
    #[serde(with = "humantime_serde")]
    pub stale_threshold: Duration,

    /// Persistence snapshot tick interval (§4.6).
    #[serde(with = "humantime_serde")]
    pub snapshot_interval: Duration,

    /// Freshness threshold used by bucket overflow policy (§4.1): an incumbent not
    /// connected within this window may be evicted in favor of a fresher peer.
    #[serde(with = "humantime_serde")]
    pub bucket_freshness_threshold: Duration,

    /// Minimum messages to consider a peer "stable" (§4.4).
    pub stable_message_count: u32,

    /// Minimum window over which those messages must arrive (§4.4).
    #[serde(with = "humantime_serde")]
    pub stable_window: Duration,

    /// Backoff base: `next_retry = last_error + base^min(retries, cap)` seconds.
    pub backoff_base: u64,
    pub backoff_retry_cap: u32,
}

impl Default for DhtConfig {
    fn default() -> Self {
        DhtConfig {
            k: 3,
            alpha: 3,
            bucket_capacity: 20,
            rpc_deadline: Duration::from_secs(2),
            cache_capacity: 2048,
            cache_refresh_debounce: Duration::from_secs(20),
            redistribution_debounce: Duration::from_secs(10),
            seed_contact_interval: Duration::from_secs(60),
            stale_eviction_interval: Duration::from_secs(600),
            stale_threshold: Duration::from_secs(30 * 60),
            snapshot_interval: Duration::from_secs(60),
            bucket_freshness_threshold: Duration::from_secs(30 * 60),
            stable_message_count: 10,
            stable_window: Duration::from_secs(30),
            backoff_base: 5,
            backoff_retry_cap: 7,
        }
    }
}

impl DhtConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alpha(mut self, alpha: usize) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_bucket_capacity(mut self, capacity: usize) -> Self {
        self.bucket_capacity = capacity;
        self
    }

    pub fn with_rpc_deadline(mut self, deadline: Duration) -> Self {
        self.rpc_deadline = deadline;
        self
    }

    pub fn validate(&self) -> Result<(), DhtError> {
        if self.k == 0 {
            return Err(DhtError::Config("k must be greater than 0".into()));
        }
        if self.alpha == 0 {
            return Err(DhtError::Config("alpha must be greater than 0".into()));
        }
        if self.bucket_capacity == 0 {
            return Err(DhtError::Config("bucket_capacity must be greater than 0".into()));
        }
        if self.cache_capacity == 0 {
            return Err(DhtError::Config("cache_capacity must be greater than 0".into()));
        }
        Ok(())
    }

    /// Shrunk timeouts/capacities for fast unit tests.
    #[cfg(test)]
    pub fn test_config() -> Self {
        DhtConfig {
            k: 3,
            alpha: 3,
            bucket_capacity: 5,
            rpc_deadline: Duration::from_millis(100),
            cache_capacity: 32,
            cache_refresh_debounce: Duration::from_millis(200),
            redistribution_debounce: Duration::from_millis(100),
            seed_contact_interval: Duration::from_millis(200),
            stale_eviction_interval: Duration::from_millis(200),
            stale_threshold: Duration::from_secs(1800),
            snapshot_interval: Duration::from_millis(200),
            bucket_freshness_threshold: Duration::from_secs(1800),
            stable_message_count: 10,
            stable_window: Duration::from_secs(30),
            backoff_base: 5,
            backoff_retry_cap: 7,
        }
    }
}

/// A parsed seed URI of the form `<node_id>@<host>:<port>`, with `node_id` optional
/// per spec.md §6 ("if absent, a fresh transient identity is used for the handshake").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedSpec {
    pub node_id: Option<String>,
    pub host: String,
    pub port: u16,
}

impl SeedSpec {
    pub fn parse(uri: &str) -> Result<Self, DhtError> {
        let (node_id, rest) = match uri.split_once('@') {
            Some((id, rest)) => (Some(id.to_string()), rest),
            None => (None, uri),
        };

        let (host, port_str) = rest
            .rsplit_once(':')
            .ok_or_else(|| DhtError::Config(format!("seed URI missing port: {uri}")))?;

        let port: u16 = port_str
            .parse()
            .map_err(|_| DhtError::Config(format!("invalid port in seed URI: {uri}")))?;

        if host.is_empty() {
            return Err(DhtError::Config(format!("seed URI missing host: {uri}")));
        }

        Ok(SeedSpec { node_id, host: host.to_string(), port })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_constants() {
        let config = DhtConfig::default();
        assert_eq!(config.k, 3);
        assert_eq!(config.alpha, 3);
        assert_eq!(config.rpc_deadline, Duration::from_secs(2));
        assert_eq!(config.cache_capacity, 2048);
        assert_eq!(config.cache_refresh_debounce, Duration::from_secs(20));
        assert_eq!(config.redistribution_debounce, Duration::from_secs(10));
        assert_eq!(config.stale_threshold, Duration::from_secs(1800));
        assert_eq!(config.backoff_base, 5);
        assert_eq!(config.backoff_retry_cap, 7);
    }

    #[test]
    fn validate_rejects_zero_k() {
        let mut config = DhtConfig::default();
        config.k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(DhtConfig::default().validate().is_ok());
    }

    #[test]
    fn seed_spec_parses_full_uri() {
        let seed = SeedSpec::parse("abcd1234@seed.example.com:8080").unwrap();
        assert_eq!(seed.node_id.as_deref(), Some("abcd1234"));
        assert_eq!(seed.host, "seed.example.com");
        assert_eq!(seed.port, 8080);
    }

    #[test]
    fn seed_spec_parses_without_node_id() {
        let seed = SeedSpec::parse("127.0.0.1:9000").unwrap();
        assert_eq!(seed.node_id, None);
        assert_eq!(seed.host, "127.0.0.1");
        assert_eq!(seed.port, 9000);
    }

    #[test]
    fn seed_spec_rejects_missing_port() {
        assert!(SeedSpec::parse("node@host").is_err());
    }
}
