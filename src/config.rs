use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading startup configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Webhook file not found: {0}")]
    WebhookMissing(String),

    #[error("Webhook URL is empty in {0}")]
    WebhookEmpty(String),

    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),
}

/// Configuration for the sshwarden daemon
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Monitored log configuration
    pub input: InputConfig,
    /// Trusted address configuration
    pub whitelist: WhitelistConfig,
    /// Webhook notification configuration
    pub alerting: AlertConfig,
    /// Geolocation enrichment configuration
    pub geolocation: GeoConfig,
}

/// Monitored log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Path to the authentication log
    pub file_path: PathBuf,
    /// Seconds between polling cycles
    pub poll_interval_secs: u64,
}

/// Trusted address configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhitelistConfig {
    /// One IP or CIDR range per line; a missing file trusts nothing
    pub file_path: PathBuf,
}

/// Webhook notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// File holding the webhook URL on its first line
    pub webhook_file: PathBuf,
    /// IANA timezone used for alert timestamps
    pub timezone: String,
    /// Embed accent color
    pub color: u32,
    /// Request timeout for webhook delivery
    pub timeout_secs: u64,
}

/// Geolocation provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeoProvider {
    /// HTTP JSON API (`<api_url>/<ip>/json`)
    Http,
    /// Local MaxMind GeoLite2-City database
    Maxmind,
    /// Skip lookups, always report unknown
    Disabled,
}

/// Geolocation enrichment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    pub provider: GeoProvider,
    /// Base URL of the HTTP provider
    pub api_url: String,
    /// Request timeout for HTTP lookups
    pub timeout_secs: u64,
    /// Database path for the MaxMind provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

impl Default for InputConfig {
    fn default() -> Self {
        InputConfig {
            file_path: PathBuf::from("/var/log/auth.log"),
            poll_interval_secs: 10,
        }
    }
}

impl Default for WhitelistConfig {
    fn default() -> Self {
        WhitelistConfig {
            file_path: PathBuf::from("whitelist.txt"),
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        AlertConfig {
            webhook_file: PathBuf::from("discord-webhook.txt"),
            timezone: "Europe/Sofia".to_string(),
            color: 16734296,
            timeout_secs: 10,
        }
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        GeoConfig {
            provider: GeoProvider::Http,
            api_url: "https://ipinfo.io".to_string(),
            timeout_secs: 5,
            database_path: None,
        }
    }
}

impl AlertConfig {
    /// Resolve the configured timezone name
    pub fn tz(&self) -> Result<chrono_tz::Tz, ConfigError> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| ConfigError::InvalidTimezone(self.timezone.clone()))
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(())
    }
}

/// Read the webhook URL from its credential file.
///
/// The daemon must not start without it, so both a missing file and an
/// empty one are errors.
pub fn load_webhook_url(path: &Path) -> Result<String, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::WebhookMissing(path.display().to_string()));
    }

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let url = contents.trim();
    if url.is_empty() {
        return Err(ConfigError::WebhookEmpty(path.display().to_string()));
    }

    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_reference_behavior() {
        let config = Config::default();
        assert_eq!(config.input.file_path, PathBuf::from("/var/log/auth.log"));
        assert_eq!(config.input.poll_interval_secs, 10);
        assert_eq!(config.alerting.color, 16734296);
        assert_eq!(config.geolocation.provider, GeoProvider::Http);
        assert!(config.alerting.tz().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[input]\npoll_interval_secs = 3\n\n[geolocation]\nprovider = \"disabled\""
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.input.poll_interval_secs, 3);
        assert_eq!(config.input.file_path, PathBuf::from("/var/log/auth.log"));
        assert_eq!(config.geolocation.provider, GeoProvider::Disabled);
        assert_eq!(config.alerting.timezone, "Europe/Sofia");
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sshwarden.toml");

        let mut config = Config::default();
        config.alerting.timezone = "UTC".to_string();
        config.to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.alerting.timezone, "UTC");
    }

    #[test]
    fn test_invalid_timezone() {
        let mut config = AlertConfig::default();
        config.timezone = "Mars/Olympus".to_string();
        assert!(matches!(config.tz(), Err(ConfigError::InvalidTimezone(_))));
    }

    #[test]
    fn test_webhook_missing() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_webhook_url(&dir.path().join("nope.txt"));
        assert!(matches!(result, Err(ConfigError::WebhookMissing(_))));
    }

    #[test]
    fn test_webhook_empty() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "   ").unwrap();
        let result = load_webhook_url(file.path());
        assert!(matches!(result, Err(ConfigError::WebhookEmpty(_))));
    }

    #[test]
    fn test_webhook_trimmed() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "  https://discord.com/api/webhooks/1/abc  ").unwrap();
        let url = load_webhook_url(file.path()).unwrap();
        assert_eq!(url, "https://discord.com/api/webhooks/1/abc");
    }
}
