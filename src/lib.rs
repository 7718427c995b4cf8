//! Turnstile - round-robin HTTP load balancer
//!
//! Core library: backend registry, health monitoring, request forwarding
//! and the HTTP/1.x plumbing they sit on.

pub mod config;
pub mod http;
pub mod proxy;
pub mod server;
