//! Runtime configuration.
//!
//! Everything is read from environment variables; unset variables fall back
//! to the defaults below.

use crate::proxy::health::{DEFAULT_INTERVAL, DEFAULT_PROBE_TIMEOUT};
use anyhow::Context;
use std::time::Duration;

/// Backends used when `BACKENDS` is not set.
pub const DEFAULT_BACKENDS: &[&str] = &["http://127.0.0.1:9001", "http://127.0.0.1:9002"];

const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    /// Backend addresses in `scheme://host:port` form, in selection order.
    pub backends: Vec<String>,
    pub health: HealthConfig,
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthConfig {
    /// Time between two probe cycles.
    pub interval: Duration,
    /// Upper bound for a single TCP probe.
    pub timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamConfig {
    pub connect_timeout: Duration,
    /// Upper bound for sending the request and reading the whole response.
    pub request_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration through an arbitrary key lookup.
    ///
    /// `load` is this function over `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = lookup("LISTEN").unwrap_or_else(|| DEFAULT_LISTEN.to_string());

        let backends = match lookup("BACKENDS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_BACKENDS.iter().map(|s| s.to_string()).collect(),
        };

        let health_defaults = HealthConfig::default();
        let upstream_defaults = UpstreamConfig::default();

        let health = HealthConfig {
            interval: secs(&lookup, "HEALTH_INTERVAL_SECS", health_defaults.interval)?,
            timeout: secs(&lookup, "HEALTH_TIMEOUT_SECS", health_defaults.timeout)?,
        };
        let upstream = UpstreamConfig {
            connect_timeout: secs(
                &lookup,
                "UPSTREAM_CONNECT_TIMEOUT_SECS",
                upstream_defaults.connect_timeout,
            )?,
            request_timeout: secs(
                &lookup,
                "UPSTREAM_REQUEST_TIMEOUT_SECS",
                upstream_defaults.request_timeout,
            )?,
        };

        if health.interval.is_zero() {
            anyhow::bail!("HEALTH_INTERVAL_SECS must be greater than zero");
        }

        Ok(Self {
            listen_addr,
            backends,
            health,
            upstream,
        })
    }
}

fn secs<F>(lookup: &F, key: &str, default: Duration) -> anyhow::Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{key} must be a whole number of seconds, got {raw:?}"))?;
            Ok(Duration::from_secs(secs))
        }
        None => Ok(default),
    }
}
