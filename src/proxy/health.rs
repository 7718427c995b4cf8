//! Periodic backend reachability checks
//!
//! Every interval the monitor walks the registry in order and probes each
//! backend with a bounded TCP connect. The result overwrites that backend's
//! liveness flag; nothing else in the balancer reacts to it yet.

use crate::proxy::backend::Backend;
use crate::proxy::registry::BackendRegistry;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Default time between probe cycles
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(120);

/// Default upper bound for a single probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(#[from] std::io::Error),
}

/// A reachability check against one backend.
pub trait Probe: Send + Sync + 'static {
    fn probe(&self, backend: &Backend) -> impl Future<Output = Result<(), ProbeError>> + Send;
}

/// Probes by opening (and immediately dropping) a TCP connection.
#[derive(Debug, Clone, Copy)]
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl Probe for TcpProbe {
    async fn probe(&self, backend: &Backend) -> Result<(), ProbeError> {
        match time::timeout(self.timeout, TcpStream::connect(backend.authority())).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(ProbeError::Connect(e)),
            Err(_) => Err(ProbeError::Timeout(self.timeout)),
        }
    }
}

pub struct HealthMonitor<P = TcpProbe> {
    registry: Arc<BackendRegistry>,
    probe: P,
    interval: Duration,
}

impl<P: Probe> HealthMonitor<P> {
    /// A zero interval is bumped to one millisecond.
    pub fn new(registry: Arc<BackendRegistry>, probe: P, interval: Duration) -> Self {
        Self {
            registry,
            probe,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Probe every backend once, in registry order.
    ///
    /// Returns how many backends were reachable.
    pub async fn check_all(&self) -> usize {
        let mut alive_count = 0;

        for backend in self.registry.backends() {
            let alive = match self.probe.probe(backend).await {
                Ok(()) => {
                    tracing::info!(backend = %backend, "Backend reachable");
                    true
                }
                Err(e) => {
                    tracing::warn!(backend = %backend, error = %e, "Backend unreachable");
                    false
                }
            };

            // Only this backend's lock is taken.
            let was_alive = backend.set_alive(alive).await;
            if was_alive != alive {
                tracing::info!(backend = %backend, alive, "Backend liveness changed");
            }

            if alive {
                alive_count += 1;
            }
        }

        alive_count
    }

    /// Run probe cycles until `shutdown` flips to `true` or its sender is
    /// dropped. The first cycle starts one full interval after the call.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval = ?self.interval,
            backends = self.registry.len(),
            "Health monitor starting"
        );

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Health monitor stopping");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    tracing::info!("Starting health check...");
                    let alive = self.check_all().await;
                    tracing::info!(
                        alive,
                        total = self.registry.len(),
                        "Health check completed"
                    );
                }
            }
        }
    }

    /// Start the monitor on its own task.
    pub fn spawn(self) -> MonitorHandle {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        MonitorHandle { shutdown: tx, task }
    }
}

/// Owner of a running monitor task. Dropping it also stops the monitor.
pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signal the monitor to stop and wait for its task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Health monitor task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
