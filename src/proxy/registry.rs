//! Backend registry and round-robin selection
//!
//! The registry is built once at startup from a static address list and is
//! never resized afterwards.

use crate::proxy::backend::Backend;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Startup errors raised while building the registry
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no backend addresses configured")]
    Empty,

    #[error("invalid backend address {addr:?}: {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: url::ParseError,
    },

    #[error("backend address {addr:?} has no host")]
    MissingHost { addr: String },

    #[error("backend address {addr:?} has no port and no default port for its scheme")]
    MissingPort { addr: String },

    #[error("backend address {addr:?} uses unsupported scheme {scheme:?}")]
    UnsupportedScheme { addr: String, scheme: String },
}

/// Fixed, ordered set of backends plus the round-robin counter
#[derive(Debug)]
pub struct BackendRegistry {
    backends: Vec<Arc<Backend>>,
    counter: AtomicU64,
}

impl BackendRegistry {
    /// Build a registry from `scheme://host:port` addresses.
    ///
    /// Backend order matches input order. Fails on an empty list or on the
    /// first address that does not parse.
    pub fn new<I, S>(addrs: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let backends = addrs
            .into_iter()
            .map(|addr| Backend::parse(addr.as_ref()).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        if backends.is_empty() {
            return Err(RegistryError::Empty);
        }

        for (index, backend) in backends.iter().enumerate() {
            tracing::info!(index, backend = %backend, "Registered backend");
        }

        Ok(Self {
            backends,
            counter: AtomicU64::new(0),
        })
    }

    /// Pick the next backend in round-robin order.
    ///
    /// Every call takes a distinct counter value, so concurrent callers
    /// spread evenly across backends. Liveness is not consulted: a backend
    /// the health monitor marked dead is still returned in its turn.
    pub fn select(&self) -> Arc<Backend> {
        let next = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let index = (next.wrapping_sub(1) % self.backends.len() as u64) as usize;
        Arc::clone(&self.backends[index])
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Always false; construction rejects empty lists.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Number of backends whose last probe succeeded.
    pub async fn alive_count(&self) -> usize {
        let mut count = 0;
        for backend in &self.backends {
            if backend.is_alive().await {
                count += 1;
            }
        }
        count
    }
}
