//! Load balancing and reverse proxy functionality
//!
//! This module holds the backend registry with its round-robin selector,
//! the health monitor that probes backends in the background, and the
//! forwarder that relays requests to the selected backend.

pub mod backend;
pub mod balancer;
pub mod health;
pub mod registry;
pub mod upstream;

pub use backend::Backend;
pub use balancer::LoadBalancer;
pub use health::{HealthMonitor, MonitorHandle, Probe, ProbeError, TcpProbe};
pub use registry::{BackendRegistry, RegistryError};
pub use upstream::{ForwardError, ProxyHandler};
