//! Polling loop tying the pipeline together
//!
//! One [`Daemon`] owns every piece of process state: the log cursor, the
//! whitelist, the geolocation resolver and the notifier. Each cycle reads
//! what was appended to the log, alerts on untrusted SSH logins, and only
//! then commits the cursor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::detection::Whitelist;
use crate::geolocation::{self, GeoResolver};
use crate::input::{EventExtractor, LogTailer, TailError};
use crate::alerting::Notifier;
use crate::models::SshEvent;

/// What a single polling cycle did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub lines: usize,
    pub events: usize,
    pub trusted: usize,
    pub alerts_sent: usize,
    pub alerts_failed: usize,
}

/// Stop signal shared between the signal handler and the loop
#[derive(Debug, Default)]
pub struct Shutdown {
    stopping: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    pub fn new() -> Arc<Self> {
        Arc::new(Shutdown::default())
    }

    pub fn trigger(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_triggered(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

pub struct Daemon {
    tailer: LogTailer,
    extractor: EventExtractor,
    whitelist: Whitelist,
    resolver: Arc<dyn GeoResolver>,
    notifier: Notifier,
    poll_interval: Duration,
}

impl Daemon {
    pub fn new(
        tailer: LogTailer,
        whitelist: Whitelist,
        resolver: Arc<dyn GeoResolver>,
        notifier: Notifier,
        poll_interval: Duration,
    ) -> Self {
        Daemon {
            tailer,
            extractor: EventExtractor::new(),
            whitelist,
            resolver,
            notifier,
            poll_interval,
        }
    }

    pub fn cursor(&self) -> u64 {
        self.tailer.cursor()
    }

    /// Run one read-parse-filter-notify pass.
    ///
    /// On a read failure the cursor stays put and the same bytes are read
    /// again next cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, TailError> {
        let chunk = self.tailer.read_new()?;
        let mut report = CycleReport {
            lines: chunk.lines.len(),
            ..CycleReport::default()
        };

        for line in &chunk.lines {
            log::trace!("Processing line: {}", line);

            let Some(event) = self.extractor.extract(line) else {
                continue;
            };
            report.events += 1;

            if self.is_trusted(&event) {
                report.trusted += 1;
                log::debug!(
                    "Ignoring {} for {} from whitelisted {}",
                    event.kind,
                    event.username,
                    event.source_address
                );
                continue;
            }

            let geo = geolocation::lookup(self.resolver.as_ref(), &event.source_address).await;
            if self.notifier.notify(&event, &geo).await {
                report.alerts_sent += 1;
            } else {
                report.alerts_failed += 1;
            }
        }

        self.tailer.commit(chunk.end_offset);
        Ok(report)
    }

    fn is_trusted(&self, event: &SshEvent) -> bool {
        match self.whitelist.is_trusted(&event.source_address) {
            Ok(trusted) => trusted,
            Err(e) => {
                log::warn!("{}; treating as untrusted", e);
                false
            }
        }
    }

    /// Prime the cursor at end of file, then poll until `shutdown` fires
    pub async fn run(&mut self, shutdown: Arc<Shutdown>) {
        self.tailer.prime();
        log::info!(
            "Polling {:?} every {:?}",
            self.tailer.path(),
            self.poll_interval
        );

        while !shutdown.is_triggered() {
            match self.run_cycle().await {
                Ok(report) if report.events > 0 => log::info!(
                    "Cycle: {} lines, {} events, {} trusted, {} alerts sent, {} failed",
                    report.lines,
                    report.events,
                    report.trusted,
                    report.alerts_sent,
                    report.alerts_failed
                ),
                Ok(_) => {}
                Err(TailError::NotFound(path)) => log::debug!("Log file {} not present yet", path),
                Err(e) => log::error!("Error processing log file: {}", e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.notify.notified() => {}
            }
        }

        log::info!("Stopped at offset {}", self.tailer.cursor());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::{AlertError, AlertSink};
    use crate::geolocation::GeoError;
    use crate::models::{AlertPayload, GeoInfo};
    use async_trait::async_trait;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    const ACCEPTED: &str =
        "Jan  1 12:00:00 host sshd[123]: Accepted publickey for alice from 203.0.113.7 port 51515 ssh2\n";
    const PREAUTH: &str =
        "Jan  1 12:00:01 host sshd[124]: Connection closed by authenticating user bob 203.0.113.8 port 51516 [preauth]\n";
    const TRUSTED: &str =
        "Jan  1 12:00:02 host sshd[125]: Accepted password for ops from 192.168.1.5 port 40000 ssh2\n";

    #[derive(Default)]
    struct RecordingSink {
        payloads: Mutex<Vec<AlertPayload>>,
        fail: bool,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn deliver(&self, payload: &AlertPayload) -> Result<(), AlertError> {
            self.payloads.lock().unwrap().push(payload.clone());
            if self.fail {
                Err(AlertError::UnexpectedStatus(reqwest::StatusCode::BAD_GATEWAY))
            } else {
                Ok(())
            }
        }
    }

    struct FixedResolver;

    #[async_trait]
    impl GeoResolver for FixedResolver {
        async fn resolve(&self, _address: &str) -> Result<GeoInfo, GeoError> {
            Ok(GeoInfo {
                country: "NL".to_string(),
                city: "Amsterdam".to_string(),
            })
        }
    }

    struct FailingResolver;

    #[async_trait]
    impl GeoResolver for FailingResolver {
        async fn resolve(&self, address: &str) -> Result<GeoInfo, GeoError> {
            Err(GeoError::InvalidAddress(address.to_string()))
        }
    }

    fn append(path: &Path, text: &str) {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    fn daemon(
        path: PathBuf,
        resolver: Arc<dyn GeoResolver>,
        sink: Arc<RecordingSink>,
    ) -> Daemon {
        let mut tailer = LogTailer::new(path);
        tailer.prime();
        Daemon::new(
            tailer,
            Whitelist::parse("192.168.1.0/24\n"),
            resolver,
            Notifier::new(sink, chrono_tz::UTC, 16734296),
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn test_cycle_alerts_untrusted_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.log");
        append(&path, ACCEPTED);

        let sink = Arc::new(RecordingSink::default());
        let mut daemon = daemon(path.clone(), Arc::new(FixedResolver), sink.clone());

        // History before priming is never replayed
        let report = daemon.run_cycle().await.unwrap();
        assert_eq!(report, CycleReport::default());

        append(&path, ACCEPTED);
        append(&path, "Jan  1 12:00:03 host CRON[1]: pam_unix(cron:session): session opened\n");
        append(&path, TRUSTED);
        append(&path, PREAUTH);

        let report = daemon.run_cycle().await.unwrap();
        assert_eq!(report.lines, 4);
        assert_eq!(report.events, 3);
        assert_eq!(report.trusted, 1);
        assert_eq!(report.alerts_sent, 2);

        let payloads = sink.payloads.lock().unwrap();
        assert_eq!(payloads[0].title, "SSH Successful Login Attempt");
        assert!(payloads[0].description.contains("**User:** alice"));
        assert!(payloads[0].description.contains("**City:** Amsterdam"));
        assert_eq!(payloads[1].title, "SSH Failed Login Attempt");
        assert!(payloads[1].description.contains("**IP Address:** 203.0.113.8"));
    }

    #[tokio::test]
    async fn test_cursor_commits_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.log");
        append(&path, "");

        let sink = Arc::new(RecordingSink::default());
        let mut daemon = daemon(path.clone(), Arc::new(FixedResolver), sink.clone());

        append(&path, ACCEPTED);
        daemon.run_cycle().await.unwrap();
        assert_eq!(daemon.cursor(), ACCEPTED.len() as u64);

        let report = daemon.run_cycle().await.unwrap();
        assert_eq!(report.lines, 0);
        assert_eq!(sink.payloads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_read_failure_keeps_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.log");
        let moved = dir.path().join("auth.log.moved");
        append(&path, "");

        let sink = Arc::new(RecordingSink::default());
        let mut daemon = daemon(path.clone(), Arc::new(FixedResolver), sink.clone());

        append(&path, PREAUTH);
        std::fs::rename(&path, &moved).unwrap();

        assert!(daemon.run_cycle().await.is_err());
        assert_eq!(daemon.cursor(), 0);
        assert!(sink.payloads.lock().unwrap().is_empty());

        std::fs::rename(&moved, &path).unwrap();
        let report = daemon.run_cycle().await.unwrap();
        assert_eq!(report.alerts_sent, 1);
        assert_eq!(daemon.cursor(), PREAUTH.len() as u64);
    }

    #[tokio::test]
    async fn test_geo_failure_still_alerts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.log");
        append(&path, "");

        let sink = Arc::new(RecordingSink::default());
        let mut daemon = daemon(path.clone(), Arc::new(FailingResolver), sink.clone());

        append(&path, ACCEPTED);
        let report = daemon.run_cycle().await.unwrap();
        assert_eq!(report.alerts_sent, 1);

        let payloads = sink.payloads.lock().unwrap();
        assert!(payloads[0].description.contains("**Country:** Unknown\n**City:** Unknown"));
    }

    #[tokio::test]
    async fn test_delivery_failure_does_not_stop_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.log");
        append(&path, "");

        let sink = Arc::new(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        });
        let mut daemon = daemon(path.clone(), Arc::new(FixedResolver), sink.clone());

        append(&path, ACCEPTED);
        append(&path, PREAUTH);
        let report = daemon.run_cycle().await.unwrap();
        assert_eq!(report.alerts_failed, 2);
        assert_eq!(sink.payloads.lock().unwrap().len(), 2);

        // Failed deliveries are not retried
        assert_eq!(daemon.cursor(), (ACCEPTED.len() + PREAUTH.len()) as u64);
    }

    #[tokio::test]
    async fn test_unparsable_address_is_untrusted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.log");
        append(&path, "");

        let sink = Arc::new(RecordingSink::default());
        let mut daemon = daemon(path.clone(), Arc::new(FixedResolver), sink.clone());

        append(&path, "sshd[9]: Accepted password for eve from 999.168.1.5 port 22 ssh2\n");
        let report = daemon.run_cycle().await.unwrap();
        assert_eq!(report.trusted, 0);
        assert_eq!(report.alerts_sent, 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.log");
        append(&path, "");

        let sink = Arc::new(RecordingSink::default());
        let mut daemon = daemon(path.clone(), Arc::new(FixedResolver), sink.clone());

        let shutdown = Shutdown::new();
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), daemon.run(shutdown))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_wakes_sleeping_loop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.log");
        append(&path, "");

        let sink = Arc::new(RecordingSink::default());
        let mut tailer = LogTailer::new(path);
        tailer.prime();
        let mut daemon = Daemon::new(
            tailer,
            Whitelist::default(),
            Arc::new(FixedResolver),
            Notifier::new(sink, chrono_tz::UTC, 1),
            Duration::from_secs(3600),
        );

        let shutdown = Shutdown::new();
        let handle = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            handle.trigger();
        });

        tokio::time::timeout(Duration::from_secs(5), daemon.run(shutdown))
            .await
            .expect("run should return once shutdown fires");
    }
}
