//! # Wire Protocol Types
//!
//! The driver and the service agree on three small JSON shapes and a handful
//! of routes. Keeping them in one place enforces a compile-time contract
//! between both sides of the benchmark.
//!
//! - [`FactorizeResponse`] - `{"factors": [...]}` on success
//! - [`ErrorResponse`] - `{"error": "..."}` on a client error
//! - [`CatalogEntry`] - one element of a discovery catalog listing

use serde::{Deserialize, Serialize};

/// Ordered prime factors of one input number, with multiplicity.
pub type FactorList = Vec<i64>;

/// Smallest input the factorize endpoint accepts.
pub const MIN_FACTORIZABLE: i64 = 2;

/// Route serving factorization requests.
pub const FACTORIZE_PATH: &str = "/factorize";

/// Route exposing service metrics for scraping.
pub const METRICS_PATH: &str = "/metrics";

/// Liveness route used by both binaries.
pub const HEALTH_PATH: &str = "/healthz";

/// Catalog route listing every instance registered under `service`.
pub fn catalog_path(service: &str) -> String {
    format!("/v1/catalog/service/{service}")
}

/// Success body of `GET /factorize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorizeResponse {
    pub factors: FactorList,
}

/// Body returned alongside any 4xx/5xx status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A registered service instance as listed by the discovery directory.
///
/// The directory returns many more fields per instance; only the address and
/// port are needed to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "ServiceAddress")]
    pub service_address: String,
    #[serde(rename = "ServicePort")]
    pub service_port: u16,
}

impl CatalogEntry {
    /// Formats the instance as `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.service_address, self.service_port)
    }
}
