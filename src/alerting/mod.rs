//! Alerting module for webhook notifications
//!
//! Renders login events into embed payloads and posts them to a chat
//! webhook. Delivery is fire-and-log: failures are reported through the
//! log and never interrupt the polling loop.

use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{AlertConfig, ConfigError};
use crate::models::{AlertPayload, GeoInfo, SshEvent};

/// Timestamp layout used in alert descriptions
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y, %H:%M:%S";

/// Errors that can occur during alert delivery
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Post failed with code {0}")]
    UnexpectedStatus(StatusCode),
}

/// Destination for rendered alerts
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, payload: &AlertPayload) -> Result<(), AlertError>;
}

/// Posts embeds to a Discord-style webhook URL
pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: String, timeout: Duration) -> Result<Self, AlertError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(WebhookSink { client, url })
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn deliver(&self, payload: &AlertPayload) -> Result<(), AlertError> {
        let response = self
            .client
            .post(&self.url)
            .json(&payload.to_webhook_body())
            .send()
            .await?;

        // The endpoint answers 204 No Content on success
        if response.status() != StatusCode::NO_CONTENT {
            return Err(AlertError::UnexpectedStatus(response.status()));
        }

        Ok(())
    }
}

/// Formats login events and hands them to an [`AlertSink`]
pub struct Notifier {
    sink: Arc<dyn AlertSink>,
    timezone: Tz,
    color: u32,
}

impl Notifier {
    pub fn new(sink: Arc<dyn AlertSink>, timezone: Tz, color: u32) -> Self {
        Notifier {
            sink,
            timezone,
            color,
        }
    }

    /// Build a notifier posting to `url` with settings from `config`
    pub fn from_config(url: String, config: &AlertConfig) -> Result<Self, NotifierSetupError> {
        let sink = WebhookSink::new(url, Duration::from_secs(config.timeout_secs))?;
        Ok(Notifier::new(Arc::new(sink), config.tz()?, config.color))
    }

    /// Current wall-clock time in the configured timezone
    pub fn timestamp(&self) -> String {
        Utc::now()
            .with_timezone(&self.timezone)
            .format(TIMESTAMP_FORMAT)
            .to_string()
    }

    pub fn render(&self, event: &SshEvent, geo: &GeoInfo) -> AlertPayload {
        AlertPayload::new(event, geo, self.timestamp(), self.color)
    }

    /// Render and deliver one alert
    pub async fn send(&self, event: &SshEvent, geo: &GeoInfo) -> Result<(), AlertError> {
        let payload = self.render(event, geo);
        self.sink.deliver(&payload).await
    }

    /// Deliver one alert, logging instead of propagating failures.
    ///
    /// Returns whether the endpoint accepted it.
    pub async fn notify(&self, event: &SshEvent, geo: &GeoInfo) -> bool {
        match self.send(event, geo).await {
            Ok(()) => {
                log::info!(
                    "Alert sent: {} for {} from {}",
                    event.kind,
                    event.username,
                    event.source_address
                );
                true
            }
            Err(e) => {
                log::error!(
                    "Failed to deliver alert for {} from {}: {}",
                    event.username,
                    event.source_address,
                    e
                );
                false
            }
        }
    }
}

/// Errors building a [`Notifier`] at startup
#[derive(Error, Debug)]
pub enum NotifierSetupError {
    #[error(transparent)]
    Alert(#[from] AlertError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
