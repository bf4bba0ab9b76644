//! Server-side components of the factorize service.
//!
//! - [`config`] - CLI/environment configuration.
//! - [`metrics`] - Prometheus registry and the route-scoped instruments.
//! - [`service`] - Request handlers and router assembly.

pub mod config;
pub mod metrics;
pub mod service;
