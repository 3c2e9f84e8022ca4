//! Configuration structures.
//!
//! Configuration is supplied by the embedding shell at startup; every field
//! has a documented default so `ShellConfig::default()` is a working setup.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Global shell configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Message bus configuration.
    #[serde(default)]
    pub bus: BusConfig,

    /// Resource monitoring limits.
    #[serde(default)]
    pub limits: ResourceLimits,

    /// How long Closed registry records are retained for introspection
    /// before the sampler sweeps them.
    #[serde(default = "default_closed_retention", with = "humantime_serde")]
    pub closed_retention: Duration,
}

fn default_closed_retention() -> Duration {
    Duration::from_secs(300)
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            limits: ResourceLimits::default(),
            closed_retention: default_closed_retention(),
        }
    }
}

/// Message bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Per-destination queue capacity for messages sent before a handler is
    /// registered. At capacity the oldest entry is dropped with a warning.
    pub queue_capacity: usize,

    /// Request timeout applied when the caller omits one.
    #[serde(with = "humantime_serde")]
    pub default_request_timeout: Duration,

    /// Upper bound on caller-requested request timeouts.
    #[serde(with = "humantime_serde")]
    pub max_request_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 50,
            default_request_timeout: Duration::from_secs(5),
            max_request_timeout: Duration::from_secs(30),
        }
    }
}

/// Resource monitoring limits. Breaches are advisory, never enforced here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Per-instance memory limit in bytes (default 500 MiB).
    pub per_app_limit_bytes: u64,

    /// Total memory limit across all instances in bytes (default 2 GiB).
    pub total_limit_bytes: u64,

    /// How often the sampler probes instance memory usage.
    #[serde(with = "humantime_serde")]
    pub sample_interval: Duration,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            per_app_limit_bytes: 500 * 1024 * 1024,
            total_limit_bytes: 2 * 1024 * 1024 * 1024,
            sample_interval: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ShellConfig::default();
        assert_eq!(config.bus.queue_capacity, 50);
        assert_eq!(config.bus.default_request_timeout, Duration::from_secs(5));
        assert_eq!(config.bus.max_request_timeout, Duration::from_secs(30));
        assert_eq!(config.limits.per_app_limit_bytes, 500 * 1024 * 1024);
        assert_eq!(config.limits.total_limit_bytes, 2 * 1024 * 1024 * 1024);
        assert_eq!(config.limits.sample_interval, Duration::from_secs(30));
        assert_eq!(config.closed_retention, Duration::from_secs(300));
    }

    #[test]
    fn durations_deserialize_from_humantime() {
        let json = r#"{
            "bus": {
                "queue_capacity": 10,
                "default_request_timeout": "2s",
                "max_request_timeout": "10s"
            },
            "limits": {
                "per_app_limit_bytes": 1048576,
                "total_limit_bytes": 4194304,
                "sample_interval": "500ms"
            },
            "closed_retention": "1m"
        }"#;
        let config: ShellConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.bus.queue_capacity, 10);
        assert_eq!(config.limits.sample_interval, Duration::from_millis(500));
        assert_eq!(config.closed_retention, Duration::from_secs(60));
    }
}
