use std::env;
use std::path::PathBuf;
use std::time::Duration;

use sshwarden::config::{load_webhook_url, Config};
use sshwarden::daemon::{Daemon, Shutdown};
use sshwarden::detection::Whitelist;
use sshwarden::geolocation;
use sshwarden::input::LogTailer;
use sshwarden::alerting::Notifier;

/// SSH login alert daemon entry point
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    log::info!("Starting sshwarden daemon...");

    // Load configuration
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sshwarden.toml"));

    let config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        log::warn!("Config file {:?} not found, using defaults", config_path);
        Config::default()
    };

    // The webhook URL is the one hard requirement
    let webhook_url = load_webhook_url(&config.alerting.webhook_file)?;
    let notifier = Notifier::from_config(webhook_url, &config.alerting)?;

    let whitelist = Whitelist::load(&config.whitelist.file_path)?;
    let resolver = geolocation::from_config(&config.geolocation)?;

    let shutdown = Shutdown::new();
    let handle = shutdown.clone();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal, stopping after current cycle...");
        handle.trigger();
    })?;

    let mut daemon = Daemon::new(
        LogTailer::new(config.input.file_path.clone()),
        whitelist,
        resolver,
        notifier,
        Duration::from_secs(config.input.poll_interval_secs),
    );

    log::info!("Daemon running. Press Ctrl+C to stop.");
    daemon.run(shutdown).await;

    log::info!("sshwarden daemon stopped");
    Ok(())
}
