pub mod alerting;
pub mod config;
pub mod daemon;
pub mod detection;
pub mod geolocation;
pub mod input;
pub mod models;

// Re-export commonly used types
pub use models::{AlertPayload, EventKind, GeoInfo, SshEvent};
pub use detection::{is_trusted, Whitelist, WhitelistEntry};
pub use input::{EventExtractor, LogTailer};
pub use geolocation::{GeoResolver, HttpGeoResolver, MaxMindResolver};
pub use alerting::{AlertSink, Notifier, WebhookSink};
pub use daemon::{Daemon, Shutdown};
