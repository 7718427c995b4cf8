use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::http::connection::Connection;
use crate::proxy::{BackendRegistry, HealthMonitor, LoadBalancer, ProxyHandler, TcpProbe};

// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Start the load balancer and serve until `shutdown` resolves.
///
/// An invalid backend list fails before anything is bound.
pub async fn run<F>(cfg: &Config, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let registry = Arc::new(
        BackendRegistry::new(&cfg.backends).context("Failed to build backend registry")?,
    );

    let listener = TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.listen_addr))?;
    info!("Load balancer listening on {}", cfg.listen_addr);

    let monitor = HealthMonitor::new(
        Arc::clone(&registry),
        TcpProbe::new(cfg.health.timeout),
        cfg.health.interval,
    )
    .spawn();

    let forwarder = ProxyHandler::new(
        cfg.upstream.connect_timeout,
        cfg.upstream.request_timeout,
    );
    let balancer = Arc::new(LoadBalancer::new(registry, forwarder));

    let result = tokio::select! {
        res = serve(listener, balancer) => res,
        _ = shutdown => Ok(()),
    };

    monitor.shutdown().await;
    result
}

/// Accept connections forever, one task per connection.
pub async fn serve(listener: TcpListener, balancer: Arc<LoadBalancer>) -> anyhow::Result<()> {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::error!("Failed to accept connection: {}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        tracing::debug!("Accepted connection from {}", peer);

        let balancer = Arc::clone(&balancer);
        tokio::spawn(async move {
            let mut conn = Connection::new(socket, peer, balancer);
            if let Err(e) = conn.run().await {
                tracing::error!("Connection error from {}: {}", peer, e);
            }
        });
    }
}
