//! Endpoint resolution.
//!
//! A [`Discovery`] source turns a logical backend name into one concrete
//! `host:port`. The refresher ([`refresh`]) calls it on a fixed period and
//! publishes each success into an [`EndpointHandle`] that workers read from.
//!
//! - [`CatalogResolver`] queries a discovery directory's catalog and picks one
//!   instance uniformly at random, spreading load across replicas on the
//!   client side.
//! - [`StaticResolver`] always answers with a fixed address.
//! - [`TargetResolver`] selects between the two at runtime.

pub mod handle;
pub mod refresh;

pub use handle::{EndpointHandle, EndpointReader};
pub use refresh::spawn_refresher;

use crate::error::ResolutionError;
use factorbench_core::types::{CatalogEntry, catalog_path};
use rand::seq::IndexedRandom;

/// Source of the current backend endpoint.
pub trait Discovery: Send + Sync + 'static {
    /// Resolves one `host:port` to send requests to.
    fn resolve(&self) -> impl Future<Output = Result<String, ResolutionError>> + Send;
}

/// Resolves instances through a discovery directory's HTTP catalog.
#[derive(Debug, Clone)]
pub struct CatalogResolver {
    http: reqwest::Client,
    directory: String,
    service: String,
}

impl CatalogResolver {
    pub fn new(http: reqwest::Client, directory: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            http,
            directory: directory.into(),
            service: service.into(),
        }
    }

    /// Full URL of the catalog listing for the configured service.
    pub fn catalog_url(&self) -> String {
        format!("http://{}{}", self.directory, catalog_path(&self.service))
    }
}

impl Discovery for CatalogResolver {
    async fn resolve(&self) -> Result<String, ResolutionError> {
        let response = self.http.get(self.catalog_url()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResolutionError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let entries: Vec<CatalogEntry> = serde_json::from_slice(&body)
            .map_err(|err| ResolutionError::Decode(err.to_string()))?;

        pick(&entries).ok_or_else(|| ResolutionError::NotFound {
            service: self.service.clone(),
        })
    }
}

/// Picks one entry uniformly at random.
pub fn pick(entries: &[CatalogEntry]) -> Option<String> {
    entries.choose(&mut rand::rng()).map(CatalogEntry::address)
}

/// Resolves to the same address every time.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    address: String,
}

impl StaticResolver {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl Discovery for StaticResolver {
    async fn resolve(&self) -> Result<String, ResolutionError> {
        Ok(self.address.clone())
    }
}

/// Runtime choice between directory lookups and a fixed address.
#[derive(Debug, Clone)]
pub enum TargetResolver {
    Catalog(CatalogResolver),
    Static(StaticResolver),
}

impl Discovery for TargetResolver {
    async fn resolve(&self) -> Result<String, ResolutionError> {
        match self {
            Self::Catalog(resolver) => resolver.resolve().await,
            Self::Static(resolver) => resolver.resolve().await,
        }
    }
}
