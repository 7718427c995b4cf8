//! Per-request wiring: pick a backend, forward, relay.

use crate::http::request::Request;
use crate::http::response::Response;
use crate::proxy::registry::BackendRegistry;
use crate::proxy::upstream::ProxyHandler;
use std::net::SocketAddr;
use std::sync::Arc;

pub struct LoadBalancer {
    registry: Arc<BackendRegistry>,
    forwarder: ProxyHandler,
}

impl LoadBalancer {
    pub fn new(registry: Arc<BackendRegistry>, forwarder: ProxyHandler) -> Self {
        Self {
            registry,
            forwarder,
        }
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// Handle one client request.
    ///
    /// Forward failures turn into a 502/504 for this request only; they are
    /// not retried and do not touch backend liveness.
    pub async fn handle(&self, request: &Request, peer: Option<SocketAddr>) -> Response {
        let backend = self.registry.select();

        tracing::info!(
            backend = %backend,
            method = %request.method,
            path = %request.path,
            "Forwarding request"
        );

        match self.forwarder.forward(&backend, request, peer).await {
            Ok(response) => {
                tracing::debug!(
                    backend = %backend,
                    status = response.status.as_u16(),
                    "Backend responded"
                );
                response
            }
            Err(e) => {
                tracing::warn!(
                    backend = %backend,
                    error = %e,
                    method = %request.method,
                    path = %request.path,
                    "Failed to forward request"
                );
                ProxyHandler::error_response(&e)
            }
        }
    }
}
