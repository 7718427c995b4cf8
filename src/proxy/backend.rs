//! Backend server representation
//!
//! A backend is a fixed target address plus a liveness flag that only the
//! health monitor writes.

use crate::proxy::registry::RegistryError;
use std::fmt;
use tokio::sync::RwLock;
use url::Url;

/// Represents a backend server with its liveness state
#[derive(Debug)]
pub struct Backend {
    /// Backend URL (e.g., "http://localhost:3000")
    pub url: Url,

    /// Host without IPv6 brackets, used as the TLS server name
    host: String,

    /// `host:port` used for connecting and for the forwarded Host header
    authority: String,

    /// Result of the most recent probe; optimistic until the first one runs
    alive: RwLock<bool>,
}

impl Backend {
    /// Parse a `scheme://host:port` address into a backend.
    ///
    /// The port may be omitted when the scheme has a well-known default.
    /// Requests can be forwarded to `http` and `https` targets.
    pub fn parse(addr: &str) -> Result<Self, RegistryError> {
        let url = Url::parse(addr).map_err(|source| RegistryError::InvalidAddress {
            addr: addr.to_string(),
            source,
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(RegistryError::UnsupportedScheme {
                addr: addr.to_string(),
                scheme: url.scheme().to_string(),
            });
        }

        let host = url.host_str().ok_or_else(|| RegistryError::MissingHost {
            addr: addr.to_string(),
        })?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| RegistryError::MissingPort {
                addr: addr.to_string(),
            })?;
        let authority = format!("{}:{}", host, port);
        let host = host.trim_start_matches('[').trim_end_matches(']').to_string();

        Ok(Self {
            url,
            host,
            authority,
            alive: RwLock::new(true),
        })
    }

    /// `host:port` of the backend, port always explicit.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// True when requests to this backend go over TLS.
    pub fn is_tls(&self) -> bool {
        self.url.scheme() == "https"
    }

    pub async fn is_alive(&self) -> bool {
        *self.alive.read().await
    }

    /// Record a probe result. Returns the previous value.
    pub async fn set_alive(&self, alive: bool) -> bool {
        let mut guard = self.alive.write().await;
        std::mem::replace(&mut *guard, alive)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.url.scheme(), self.authority)
    }
}
