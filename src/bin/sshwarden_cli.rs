use std::io::BufReader;
use std::fs::File;
use std::path::PathBuf;
use structopt::StructOpt;

use sshwarden::config::Config;
use sshwarden::detection::{AddressError, Whitelist};
use sshwarden::input::EventExtractor;

/// sshwarden command line interface
#[derive(StructOpt, Debug)]
#[structopt(name = "sshwarden", about = "SSH login alert daemon CLI")]
pub enum Cli {
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file
        #[structopt(short, long, default_value = "sshwarden.toml")]
        output: PathBuf,
    },
    /// Extract SSH login events from an existing log file
    Parse {
        /// Path to log file
        #[structopt(short, long)]
        file: PathBuf,
        /// Maximum number of events to show
        #[structopt(short, long, default_value = "10")]
        lines: usize,
    },
    /// Check whether an address is trusted by a whitelist file
    Check {
        /// Address to test
        address: String,
        /// Path to whitelist file
        #[structopt(short, long, default_value = "whitelist.txt")]
        whitelist: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let cli = Cli::from_args();

    match cli {
        Cli::Config { output } => {
            let config = Config::default();
            config.to_file(&output)?;
            println!("Default configuration written to: {:?}", output);
        }
        Cli::Parse { file, lines } => {
            if !file.exists() {
                eprintln!("File not found: {:?}", file);
                std::process::exit(1);
            }

            let extractor = EventExtractor::new();
            let reader = BufReader::new(File::open(&file)?);
            let events = extractor.scan(reader)?;

            let display_count = std::cmp::min(lines, events.len());
            println!("Parsed {} event(s) (showing {}):\n", events.len(), display_count);
            for event in events.iter().take(display_count) {
                println!(
                    "  {:<9} User: {}, IP: {}",
                    event.kind.to_string(),
                    event.username,
                    event.source_address
                );
            }
        }
        Cli::Check { address, whitelist } => {
            let list = Whitelist::load(&whitelist)?;
            match list.is_trusted(&address) {
                Ok(true) => println!("{} is trusted", address),
                Ok(false) => println!(
                    "{} is NOT trusted ({} entries checked)",
                    address,
                    list.len()
                ),
                Err(AddressError::InvalidAddress(a)) => {
                    eprintln!("Not a valid IP address: {}", a);
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(())
}
