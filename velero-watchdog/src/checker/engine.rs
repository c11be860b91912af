//! Change-Detection Engine.
//!
//! Consumes scheduler messages in order and keeps the last snapshots it
//! saw. A snapshot equal to the stored one produces nothing; a changed one
//! is rendered and sent, either straight to the outbound queue or into the
//! aggregated report of the current round.

use std::mem;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::report::{self, BannerSettings, FRAGMENT_DIVIDER, MIN_REPORT_LEN};
use crate::config::WatchdogConfig;
use crate::domain::{BackupSnapshot, ScheduleDiff, ScheduleSnapshot};
use crate::scheduler::WatchdogMessage;
use crate::{Error, Result};

const UNKNOWN_CLUSTER: &str = "unknown";

/// Change detector settings.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    pub backup_enable: bool,
    pub schedule_enable: bool,
    pub aggregated_report: bool,
    pub expires_days_warning: u32,
    /// Heartbeat interval in hours; 0 disables heartbeats.
    pub alive_message_hours: u32,
}

impl CheckerConfig {
    fn heartbeat_interval(&self) -> Option<Duration> {
        match self.alive_message_hours {
            0 => None,
            hours => Some(Duration::from_secs(u64::from(hours) * 3600)),
        }
    }

    fn banner_settings(&self) -> BannerSettings {
        BannerSettings {
            backup_enable: self.backup_enable,
            schedule_enable: self.schedule_enable,
            aggregated_report: self.aggregated_report,
            expires_days_warning: self.expires_days_warning,
            alive_message_hours: self.alive_message_hours,
        }
    }
}

impl From<&WatchdogConfig> for CheckerConfig {
    fn from(config: &WatchdogConfig) -> Self {
        Self {
            backup_enable: config.velero.backup_enable,
            schedule_enable: config.velero.schedule_enable,
            aggregated_report: config.velero.aggregated_report,
            expires_days_warning: config.velero.expires_days_warning,
            alive_message_hours: config.notification.alive_message_hours,
        }
    }
}

/// Where rendered alerts go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SendMode {
    /// Straight to the outbound queue.
    #[default]
    Immediate,
    /// Collected until the end of the report.
    Buffering { contents: String },
}

/// Everything the engine remembers between messages.
#[derive(Debug)]
pub struct ChangeState {
    pub schedules: ScheduleSnapshot,
    /// `None` until the first backup snapshot.
    pub backups: Option<BackupSnapshot>,
    pub last_send: Instant,
    pub mode: SendMode,
    pub cluster_name: Option<String>,
    /// Whether the restart banner went out.
    pub announced: bool,
}

impl ChangeState {
    fn new() -> Self {
        Self {
            schedules: ScheduleSnapshot::new(),
            backups: None,
            last_send: Instant::now(),
            mode: SendMode::Immediate,
            cluster_name: None,
            announced: false,
        }
    }
}

/// Whether the read loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

pub struct ChangeDetector {
    config: CheckerConfig,
    outbound: mpsc::UnboundedSender<String>,
    state: ChangeState,
    force_heartbeat: bool,
}

impl ChangeDetector {
    pub fn new(config: CheckerConfig, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            config,
            outbound,
            state: ChangeState::new(),
            force_heartbeat: false,
        }
    }

    pub fn state(&self) -> &ChangeState {
        &self.state
    }

    /// Send a heartbeat after the next message regardless of the timer.
    pub fn request_heartbeat(&mut self) {
        self.force_heartbeat = true;
    }

    /// Read `inbound` until a shutdown message arrives or every sender
    /// is dropped.
    pub async fn run(mut self, mut inbound: mpsc::UnboundedReceiver<WatchdogMessage>) {
        info!("Change detector started");

        while let Some(message) = inbound.recv().await {
            if self.handle(message) == Flow::Stop {
                info!("Shutdown requested, change detector stopping");
                return;
            }
        }

        info!("Inbound queue closed, change detector stopping");
    }

    /// Process one message, then send a heartbeat if one was due when the
    /// message arrived.
    ///
    /// Errors are logged and never end the loop.
    pub fn handle(&mut self, message: WatchdogMessage) -> Flow {
        let kind = message.kind();
        debug!(kind, "Message received");

        let heartbeat_due = self.heartbeat_due();

        match self.process(message) {
            Ok(Flow::Stop) => return Flow::Stop,
            Ok(Flow::Continue) => {}
            Err(e) => warn!(kind, "Failed to process message: {}", e),
        }

        if heartbeat_due {
            if let Err(e) = self.send_heartbeat() {
                warn!("Failed to send heartbeat: {}", e);
            }
        }

        Flow::Continue
    }

    fn process(&mut self, message: WatchdogMessage) -> Result<Flow> {
        match message {
            WatchdogMessage::ClusterName(name) => self.on_cluster_name(name)?,
            WatchdogMessage::ReportStart => {
                self.state.mode = SendMode::Buffering {
                    contents: String::new(),
                };
            }
            WatchdogMessage::Schedules(snapshot) => self.on_schedules(snapshot)?,
            WatchdogMessage::Backups(snapshot) => self.on_backups(snapshot)?,
            WatchdogMessage::ReportEnd => self.on_report_end()?,
            WatchdogMessage::Shutdown => return Ok(Flow::Stop),
        }
        Ok(Flow::Continue)
    }

    fn on_cluster_name(&mut self, name: Option<String>) -> Result<()> {
        let Some(name) = name else {
            info!("Cluster name not available");
            return Ok(());
        };

        info!(cluster = %name, "Cluster name received");

        if self.state.announced {
            self.send_alert(report::cluster_line(&name))?;
        } else {
            self.send_alert(report::restart_banner(
                &name,
                &self.config.banner_settings(),
            ))?;
            self.state.announced = true;
        }

        self.state.cluster_name = Some(name);
        Ok(())
    }

    fn on_schedules(&mut self, snapshot: ScheduleSnapshot) -> Result<()> {
        if snapshot == self.state.schedules {
            debug!("Schedules unchanged");
            return Ok(());
        }

        let diff = ScheduleDiff::between(&self.state.schedules, &snapshot);
        let text = report::schedule_changes(&diff, !self.state.schedules.is_empty());
        debug!(
            removed = diff.removed.len(),
            added = diff.added.len(),
            updated = diff.updated.len(),
            "Schedules changed"
        );

        self.send_alert(text)?;
        self.state.schedules = snapshot;
        Ok(())
    }

    fn on_backups(&mut self, snapshot: BackupSnapshot) -> Result<()> {
        if self.state.backups.as_ref() == Some(&snapshot) {
            debug!("Backups unchanged");
            return Ok(());
        }

        let text = report::backup_report(&snapshot, self.config.expires_days_warning);
        if text.chars().count() > MIN_REPORT_LEN {
            self.send_alert(text)?;
        }

        self.state.backups = Some(snapshot);
        Ok(())
    }

    fn on_report_end(&mut self) -> Result<()> {
        let SendMode::Buffering { contents } = mem::take(&mut self.state.mode) else {
            return Ok(());
        };

        if contents.chars().count() > MIN_REPORT_LEN {
            self.push(format!("Start report\n{}\nEnd report", contents))?;
        } else {
            debug!("Aggregated report empty, nothing to send");
        }
        Ok(())
    }

    /// Aggregation-aware send path.
    fn send_alert(&mut self, text: String) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }

        if let SendMode::Buffering { contents } = &mut self.state.mode {
            if !contents.is_empty() {
                contents.push('\n');
                contents.push_str(FRAGMENT_DIVIDER);
                contents.push('\n');
            }
            contents.push_str(&text);
            debug!(len = contents.len(), "Buffered alert");
            return Ok(());
        }

        self.push(text)
    }

    fn push(&mut self, text: String) -> Result<()> {
        debug!(len = text.len(), "Sending to dispatcher");
        self.outbound
            .send(text)
            .map_err(|_| Error::QueueClosed("outbound"))?;
        self.state.last_send = Instant::now();
        Ok(())
    }

    fn heartbeat_due(&self) -> bool {
        let Some(interval) = self.config.heartbeat_interval() else {
            return false;
        };

        self.force_heartbeat || self.state.last_send.elapsed() > interval
    }

    fn send_heartbeat(&mut self) -> Result<()> {
        info!("Sending alive message");
        let cluster = self.state.cluster_name.as_deref().unwrap_or(UNKNOWN_CLUSTER);
        let text = report::heartbeat(cluster, self.config.alive_message_hours);
        self.force_heartbeat = false;
        self.push(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        BackupPhase, BackupRecord, LastBackupView, NamespaceCoverageReport, ScheduleRecord,
    };

    fn config() -> CheckerConfig {
        CheckerConfig {
            backup_enable: true,
            schedule_enable: true,
            aggregated_report: true,
            expires_days_warning: 20,
            alive_message_hours: 24,
        }
    }

    fn detector(config: CheckerConfig) -> (ChangeDetector, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChangeDetector::new(config, tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(text);
        }
        out
    }

    fn schedule(namespaces: &[&str], cron: &str) -> ScheduleRecord {
        ScheduleRecord {
            included_namespaces: namespaces.iter().map(|s| s.to_string()).collect(),
            cron_time: cron.to_string(),
            ..Default::default()
        }
    }

    fn backups(phase: BackupPhase, uncovered: &[&str]) -> BackupSnapshot {
        let view: LastBackupView = vec![BackupRecord {
            name: "daily-20240301020000".to_string(),
            schedule: Some("daily".to_string()),
            phase,
            expire: "25d".to_string(),
            ..Default::default()
        }]
        .into_iter()
        .collect();

        BackupSnapshot {
            view,
            coverage: NamespaceCoverageReport {
                uncovered: uncovered.iter().map(|s| s.to_string()).collect(),
                total: 2,
            },
        }
    }

    #[tokio::test]
    async fn test_identical_backup_snapshot_sends_once() {
        let (mut detector, mut rx) = detector(config());

        detector.handle(WatchdogMessage::Backups(backups(BackupPhase::Completed, &[])));
        detector.handle(WatchdogMessage::Backups(backups(BackupPhase::Completed, &[])));

        assert_eq!(drain(&mut rx).len(), 1);

        detector.handle(WatchdogMessage::Backups(backups(BackupPhase::Failed, &[])));
        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Failed=1"));
    }

    #[tokio::test]
    async fn test_schedule_diff_lists_added_and_updated() {
        let (mut detector, mut rx) = detector(config());

        let first: ScheduleSnapshot = [("A".to_string(), schedule(&["ns1"], "0 1 * * *"))].into();
        detector.handle(WatchdogMessage::Schedules(first));
        assert!(drain(&mut rx).is_empty());

        let second: ScheduleSnapshot = [
            ("A".to_string(), schedule(&["ns1", "ns2"], "0 1 * * *")),
            ("B".to_string(), schedule(&["ns3"], "0 3 * * *")),
        ]
        .into();
        detector.handle(WatchdogMessage::Schedules(second.clone()));

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Added scheduled:\n\tB"));
        assert!(sent[0].contains("Schedule name: A\n\tincluded_namespaces: [ns1] -> [ns1, ns2]"));
        assert!(!sent[0].contains("cron_time"));
        assert_eq!(detector.state().schedules, second);
    }

    #[tokio::test]
    async fn test_aggregated_report_wraps_fragments() {
        let (mut detector, mut rx) = detector(config());
        detector.handle(WatchdogMessage::Schedules(
            [("A".to_string(), schedule(&["ns1"], "@daily"))].into(),
        ));

        detector.handle(WatchdogMessage::ReportStart);
        detector.handle(WatchdogMessage::Schedules(
            [("A".to_string(), schedule(&["ns1"], "@hourly"))].into(),
        ));
        detector.handle(WatchdogMessage::Backups(backups(BackupPhase::Completed, &[])));
        assert!(drain(&mut rx).is_empty());

        detector.handle(WatchdogMessage::ReportEnd);
        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);

        let text = &sent[0];
        assert!(text.starts_with("Start report\nUpdated scheduled:"));
        assert!(text.contains(&format!("\n{}\n", FRAGMENT_DIVIDER)));
        assert!(text.contains("Backup details [1/2]:"));
        assert!(text.ends_with("\nEnd report"));
        assert_eq!(detector.state().mode, SendMode::Immediate);
    }

    #[tokio::test]
    async fn test_empty_aggregated_report_sends_nothing() {
        let (mut detector, mut rx) = detector(config());
        detector.handle(WatchdogMessage::ReportStart);
        detector.handle(WatchdogMessage::ReportEnd);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(detector.state().mode, SendMode::Immediate);
    }

    #[tokio::test]
    async fn test_coverage_gap_overrides_backup_detail() {
        let (mut detector, mut rx) = detector(CheckerConfig {
            aggregated_report: false,
            ..config()
        });
        detector.handle(WatchdogMessage::Backups(backups(BackupPhase::Completed, &["ns2"])));

        assert_eq!(
            drain(&mut rx),
            vec!["Namespace without active backup [1/2]:\n\tns2\n".to_string()]
        );
    }

    #[tokio::test]
    async fn test_restart_banner_then_cluster_line() {
        let (mut detector, mut rx) = detector(config());

        detector.handle(WatchdogMessage::ClusterName(Some("prod".to_string())));
        detector.handle(WatchdogMessage::ClusterName(Some("prod".to_string())));
        detector.handle(WatchdogMessage::ClusterName(None));

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 2);
        assert!(sent[0].starts_with("velero-watchdog is restarted\nCluster name= prod"));
        assert_eq!(sent[1], "Cluster name= prod");
        assert_eq!(detector.state().cluster_name.as_deref(), Some("prod"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_after_quiet_interval() {
        let (mut detector, mut rx) = detector(CheckerConfig {
            alive_message_hours: 1,
            ..config()
        });
        detector.handle(WatchdogMessage::ClusterName(Some("prod".to_string())));
        drain(&mut rx);

        tokio::time::advance(Duration::from_secs(1800)).await;
        detector.handle(WatchdogMessage::ReportStart);
        assert!(drain(&mut rx).is_empty());

        tokio::time::advance(Duration::from_secs(1801)).await;
        detector.handle(WatchdogMessage::ReportEnd);
        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("Cluster: prod\nvelero-watchdog is running."));
        assert!(sent[0].contains("in the last 1 hours"));

        // The timer restarted.
        detector.handle(WatchdogMessage::ReportStart);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_follows_immediate_output_after_quiet_interval() {
        let (mut detector, mut rx) = detector(CheckerConfig {
            aggregated_report: false,
            alive_message_hours: 1,
            ..config()
        });

        tokio::time::advance(Duration::from_secs(3700)).await;
        detector.handle(WatchdogMessage::Backups(backups(BackupPhase::Failed, &[])));

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 2);
        assert!(sent[0].contains("Failed=1"));
        assert!(sent[1].contains("This is an alive message"));

        // Exactly one heartbeat: the timer restarted with that send.
        detector.handle(WatchdogMessage::Backups(backups(BackupPhase::Completed, &[])));
        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert!(!sent[0].contains("This is an alive message"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_bypasses_buffer() {
        let (mut detector, mut rx) = detector(config());
        detector.handle(WatchdogMessage::ReportStart);
        detector.request_heartbeat();
        detector.handle(WatchdogMessage::Backups(backups(BackupPhase::Completed, &[])));

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("This is an alive message"));
        assert!(matches!(detector.state().mode, SendMode::Buffering { ref contents } if !contents.is_empty()));
    }

    #[tokio::test]
    async fn test_heartbeat_disabled() {
        let (mut detector, mut rx) = detector(CheckerConfig {
            alive_message_hours: 0,
            ..config()
        });
        detector.request_heartbeat();
        detector.handle(WatchdogMessage::ReportStart);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (detector, mut rx) = detector(config());
        let (tx, inbound) = mpsc::unbounded_channel();

        tx.send(WatchdogMessage::ClusterName(Some("prod".to_string()))).unwrap();
        tx.send(WatchdogMessage::Shutdown).unwrap();
        tx.send(WatchdogMessage::ClusterName(Some("prod".to_string()))).unwrap();

        detector.run(inbound).await;

        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn test_closed_outbound_leaves_state_untouched() {
        let (mut detector, rx) = detector(CheckerConfig {
            aggregated_report: false,
            ..config()
        });
        drop(rx);

        detector.handle(WatchdogMessage::Backups(backups(BackupPhase::Completed, &[])));
        assert!(detector.state().backups.is_none());
    }
}
