//! Offline geolocation using a MaxMind GeoLite2-City database
//!
//! The database file must be downloaded separately from MaxMind (free with
//! registration) and pointed to by `geolocation.database_path`.

use async_trait::async_trait;
use maxminddb::{geoip2, Reader};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use super::{GeoError, GeoResolver};
use crate::models::GeoInfo;

/// GeoIP lookup backed by a memory-loaded MaxMind database
#[derive(Clone)]
pub struct MaxMindResolver {
    reader: Arc<Reader<Vec<u8>>>,
}

impl MaxMindResolver {
    /// Open a GeoLite2-City database file
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, GeoError> {
        let path = db_path.as_ref();
        if !path.exists() {
            return Err(GeoError::FileNotFound(path.display().to_string()));
        }

        let reader = Reader::open_readfile(path)?;
        log::info!("Loaded GeoIP database {:?}", path);
        Ok(MaxMindResolver {
            reader: Arc::new(reader),
        })
    }

    /// English country and city names for `ip`
    pub fn lookup_ip(&self, ip: IpAddr) -> Result<GeoInfo, GeoError> {
        let city: geoip2::City = self.reader.lookup(ip).map_err(|e| match e {
            maxminddb::MaxMindDBError::AddressNotFoundError(_) => GeoError::NotFound,
            other => GeoError::Database(other),
        })?;

        let country = city
            .country
            .and_then(|c| c.names)
            .and_then(|n| n.get("en").copied())
            .map(String::from);
        let city_name = city
            .city
            .and_then(|c| c.names)
            .and_then(|n| n.get("en").copied())
            .map(String::from);

        Ok(GeoInfo::from_parts(country, city_name))
    }
}

#[async_trait]
impl GeoResolver for MaxMindResolver {
    async fn resolve(&self, address: &str) -> Result<GeoInfo, GeoError> {
        let ip: IpAddr = address
            .parse()
            .map_err(|_| GeoError::InvalidAddress(address.to_string()))?;
        self.lookup_ip(ip)
    }
}
