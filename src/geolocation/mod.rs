//! Best-effort geolocation of alert source addresses
//!
//! Two resolvers are available: an HTTP JSON API (ipinfo-compatible) and
//! an offline MaxMind GeoLite2-City database. Either way a failed lookup
//! degrades to [`GeoInfo::unknown`] and never blocks an alert.

pub mod maxmind;

pub use maxmind::MaxMindResolver;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{GeoConfig, GeoProvider};
use crate::models::GeoInfo;

/// Errors that can occur during geolocation lookups
#[derive(Error, Debug)]
pub enum GeoError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("Invalid IP address: {0}")]
    InvalidAddress(String),

    #[error("Failed to open database: {0}")]
    Database(#[from] maxminddb::MaxMindDBError),

    #[error("IP address not found in database")]
    NotFound,

    #[error("Database file not found: {0}")]
    FileNotFound(String),

    #[error("No geolocation provider configured")]
    Disabled,
}

/// Resolves an address to a country and city
#[async_trait]
pub trait GeoResolver: Send + Sync {
    async fn resolve(&self, address: &str) -> Result<GeoInfo, GeoError>;
}

/// Look up `address`, falling back to unknown on any failure
pub async fn lookup(resolver: &dyn GeoResolver, address: &str) -> GeoInfo {
    match resolver.resolve(address).await {
        Ok(geo) => geo,
        Err(GeoError::Disabled) => GeoInfo::unknown(),
        Err(e) => {
            log::warn!("Geolocation lookup for {} failed: {}", address, e);
            GeoInfo::unknown()
        }
    }
}

/// Build the resolver selected in the configuration
pub fn from_config(config: &GeoConfig) -> Result<Arc<dyn GeoResolver>, GeoError> {
    let resolver: Arc<dyn GeoResolver> = match config.provider {
        GeoProvider::Http => Arc::new(HttpGeoResolver::new(
            &config.api_url,
            Duration::from_secs(config.timeout_secs),
        )?),
        GeoProvider::Maxmind => {
            let path = config
                .database_path
                .as_ref()
                .ok_or_else(|| GeoError::FileNotFound("<unset database_path>".to_string()))?;
            Arc::new(MaxMindResolver::new(path)?)
        }
        GeoProvider::Disabled => Arc::new(NoopResolver),
    };
    Ok(resolver)
}

/// Response body of the HTTP provider; every field is optional
#[derive(Debug, Deserialize)]
struct IpInfoResponse {
    country: Option<String>,
    city: Option<String>,
}

/// Geolocation over an HTTP JSON API at `<base_url>/<ip>/json`
pub struct HttpGeoResolver {
    client: Client,
    base_url: String,
}

impl HttpGeoResolver {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GeoError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpGeoResolver {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, address: &str) -> String {
        format!("{}/{}/json", self.base_url, address)
    }
}

#[async_trait]
impl GeoResolver for HttpGeoResolver {
    async fn resolve(&self, address: &str) -> Result<GeoInfo, GeoError> {
        let response = self.client.get(self.url_for(address)).send().await?;

        if !response.status().is_success() {
            return Err(GeoError::Status(response.status()));
        }

        let body: IpInfoResponse = response.json().await?;
        Ok(GeoInfo::from_parts(body.country, body.city))
    }
}

/// Resolver used when geolocation is disabled
pub struct NoopResolver;

#[async_trait]
impl GeoResolver for NoopResolver {
    async fn resolve(&self, _address: &str) -> Result<GeoInfo, GeoError> {
        Err(GeoError::Disabled)
    }
}
