//! Trusted address matching
//!
//! Events whose source address matches any whitelist entry are exempt from
//! alerting. Entries are single addresses or CIDR ranges.

use ipnet::IpNet;
use std::fmt;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid whitelist entry: {0}")]
    InvalidEntry(String),
}

/// A single trusted address or address range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhitelistEntry {
    Address(IpAddr),
    Network(IpNet),
}

impl WhitelistEntry {
    pub fn matches(&self, ip: &IpAddr) -> bool {
        match self {
            WhitelistEntry::Address(addr) => addr == ip,
            WhitelistEntry::Network(net) => net.contains(ip),
        }
    }
}

impl FromStr for WhitelistEntry {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // Host bits are allowed, "192.168.1.7/24" covers 192.168.1.0/24
        if s.contains('/') {
            s.parse::<IpNet>()
                .map(WhitelistEntry::Network)
                .map_err(|_| AddressError::InvalidEntry(s.to_string()))
        } else {
            s.parse::<IpAddr>()
                .map(WhitelistEntry::Address)
                .map_err(|_| AddressError::InvalidEntry(s.to_string()))
        }
    }
}

impl fmt::Display for WhitelistEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WhitelistEntry::Address(addr) => write!(f, "{}", addr),
            WhitelistEntry::Network(net) => write!(f, "{}", net),
        }
    }
}

/// Immutable set of trusted entries, loaded once at startup
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    entries: Vec<WhitelistEntry>,
}

impl Whitelist {
    pub fn new(entries: Vec<WhitelistEntry>) -> Self {
        Whitelist { entries }
    }

    /// Parse whitelist text, one entry per line.
    ///
    /// Blank lines and `#` comments are ignored. Invalid entries are logged
    /// and skipped so one typo cannot stall the pipeline.
    pub fn parse(contents: &str) -> Self {
        let entries = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| match line.parse::<WhitelistEntry>() {
                Ok(entry) => Some(entry),
                Err(e) => {
                    log::warn!("Skipping whitelist line: {}", e);
                    None
                }
            })
            .collect();

        Whitelist { entries }
    }

    /// Load the whitelist file; a missing file means nothing is trusted
    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        if !path.is_file() {
            log::info!("No whitelist at {:?}, all addresses are untrusted", path);
            return Ok(Whitelist::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let whitelist = Self::parse(&contents);
        log::info!("Loaded {} whitelist entries from {:?}", whitelist.len(), path);
        Ok(whitelist)
    }

    pub fn entries(&self) -> &[WhitelistEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check whether `address` matches any entry
    pub fn is_trusted(&self, address: &str) -> Result<bool, AddressError> {
        is_trusted(address, self)
    }
}

/// Decide whether `address` is covered by `whitelist`.
///
/// Fails only when `address` itself does not parse. Callers treat that as
/// untrusted so malformed input still produces an alert.
pub fn is_trusted(address: &str, whitelist: &Whitelist) -> Result<bool, AddressError> {
    let ip = address
        .trim()
        .parse::<IpAddr>()
        .map_err(|_| AddressError::InvalidAddress(address.to_string()))?;

    Ok(whitelist.entries.iter().any(|entry| entry.matches(&ip)))
}
