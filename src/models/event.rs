use serde::Serialize;
use std::fmt;

/// Placeholder used when geolocation data is unavailable
pub const UNKNOWN: &str = "Unknown";

/// Kind of SSH login event recognized in the auth log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// `Accepted publickey|password for ...`
    Success,
    /// `Connection closed by authenticating user ... [preauth]`
    FailedPreauth,
}

impl EventKind {
    /// Alert title for this kind of event
    pub fn title(&self) -> &'static str {
        match self {
            EventKind::Success => "SSH Successful Login Attempt",
            EventKind::FailedPreauth => "SSH Failed Login Attempt",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Success => write!(f, "success"),
            EventKind::FailedPreauth => write!(f, "failed-preauth"),
        }
    }
}

/// A single SSH login event extracted from one log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshEvent {
    pub kind: EventKind,
    pub username: String,
    /// Dotted quad exactly as captured from the line
    pub source_address: String,
}

/// Coarse location of a source address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoInfo {
    pub country: String,
    pub city: String,
}

impl GeoInfo {
    pub fn unknown() -> Self {
        GeoInfo {
            country: UNKNOWN.to_string(),
            city: UNKNOWN.to_string(),
        }
    }

    /// Build from optional fields, substituting the placeholder for missing ones
    pub fn from_parts(country: Option<String>, city: Option<String>) -> Self {
        GeoInfo {
            country: country.filter(|c| !c.is_empty()).unwrap_or_else(|| UNKNOWN.to_string()),
            city: city.filter(|c| !c.is_empty()).unwrap_or_else(|| UNKNOWN.to_string()),
        }
    }
}

impl Default for GeoInfo {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Rendered notification, one per delivered alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertPayload {
    pub title: String,
    pub description: String,
    pub timestamp: String,
    pub color: u32,
}

impl AlertPayload {
    pub fn new(event: &SshEvent, geo: &GeoInfo, timestamp: String, color: u32) -> Self {
        let description = format!(
            "**User:** {}\n**IP Address:** {}\n**Country:** {}\n**City:** {}\n**Timestamp:** {}",
            event.username, event.source_address, geo.country, geo.city, timestamp
        );

        AlertPayload {
            title: event.kind.title().to_string(),
            description,
            timestamp,
            color,
        }
    }

    /// Wire body accepted by the webhook endpoint
    pub fn to_webhook_body(&self) -> WebhookBody<'_> {
        WebhookBody {
            embeds: vec![Embed {
                title: &self.title,
                description: &self.description,
                color: self.color,
            }],
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookBody<'a> {
    pub embeds: Vec<Embed<'a>>,
}

#[derive(Debug, Serialize)]
pub struct Embed<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub color: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind) -> SshEvent {
        SshEvent {
            kind,
            username: "alice".to_string(),
            source_address: "203.0.113.7".to_string(),
        }
    }

    #[test]
    fn test_geo_from_parts_defaults() {
        let geo = GeoInfo::from_parts(Some("BG".to_string()), None);
        assert_eq!(geo.country, "BG");
        assert_eq!(geo.city, UNKNOWN);

        let geo = GeoInfo::from_parts(Some(String::new()), Some("Sofia".to_string()));
        assert_eq!(geo.country, UNKNOWN);
        assert_eq!(geo.city, "Sofia");
    }

    #[test]
    fn test_payload_description() {
        let geo = GeoInfo {
            country: "NL".to_string(),
            city: "Amsterdam".to_string(),
        };
        let payload = AlertPayload::new(
            &event(EventKind::Success),
            &geo,
            "01/02/2024, 10:11:12".to_string(),
            16734296,
        );

        assert_eq!(payload.title, "SSH Successful Login Attempt");
        assert_eq!(
            payload.description,
            "**User:** alice\n**IP Address:** 203.0.113.7\n**Country:** NL\n**City:** Amsterdam\n**Timestamp:** 01/02/2024, 10:11:12"
        );
    }

    #[test]
    fn test_webhook_body_shape() {
        let payload = AlertPayload::new(
            &event(EventKind::FailedPreauth),
            &GeoInfo::unknown(),
            "ts".to_string(),
            42,
        );
        let json = serde_json::to_value(payload.to_webhook_body()).unwrap();

        assert_eq!(json["embeds"][0]["title"], "SSH Failed Login Attempt");
        assert_eq!(json["embeds"][0]["color"], 42);
        assert!(json["embeds"][0]["description"]
            .as_str()
            .unwrap()
            .contains("**Country:** Unknown"));
        assert!(json["embeds"][0].get("timestamp").is_none());
    }
}
