use crate::models::{EventKind, SshEvent};
use regex::Regex;
use std::io::BufRead;

/// Substring every sshd line carries
const SSHD_MARKER: &str = "sshd";

const ACCEPTED_PATTERN: &str =
    r"Accepted (publickey|password) for (\S+) from (\d+\.\d+\.\d+\.\d+) port \d+";

const PREAUTH_CLOSED_PATTERN: &str =
    r"Connection closed by authenticating user (\S+) (\d+\.\d+\.\d+\.\d+) port \d+ \[preauth\]";

/// Turns auth.log lines into SSH login events.
///
/// Only two phrasings are recognized: accepted logins and connections
/// closed while a user was still authenticating. Everything else,
/// `Failed password` included, yields nothing.
#[derive(Debug, Clone)]
pub struct EventExtractor {
    accepted: Regex,
    preauth_closed: Regex,
}

impl EventExtractor {
    pub fn new() -> Self {
        EventExtractor {
            accepted: Regex::new(ACCEPTED_PATTERN).expect("accepted pattern is valid"),
            preauth_closed: Regex::new(PREAUTH_CLOSED_PATTERN)
                .expect("preauth pattern is valid"),
        }
    }

    /// Classify a single log line
    pub fn extract(&self, line: &str) -> Option<SshEvent> {
        if !line.contains(SSHD_MARKER) {
            return None;
        }

        if let Some(caps) = self.accepted.captures(line) {
            // caps[1] is the auth method, only used to anchor the match
            return Some(SshEvent {
                kind: EventKind::Success,
                username: caps[2].to_string(),
                source_address: caps[3].to_string(),
            });
        }

        if let Some(caps) = self.preauth_closed.captures(line) {
            return Some(SshEvent {
                kind: EventKind::FailedPreauth,
                username: caps[1].to_string(),
                source_address: caps[2].to_string(),
            });
        }

        None
    }

    /// Extract every event from a whole log, decoding invalid UTF-8 lossily
    pub fn scan<R: BufRead>(&self, mut reader: R) -> std::io::Result<Vec<SshEvent>> {
        let mut events = Vec::new();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            if let Some(event) = self.extract(line.trim_end_matches(['\r', '\n'])) {
                events.push(event);
            }
        }

        Ok(events)
    }
}

impl Default for EventExtractor {
    fn default() -> Self {
        Self::new()
    }
}
