//! Messages carried from the poll scheduler to the change detector.

use crate::domain::{BackupSnapshot, ScheduleSnapshot};

/// One fact produced by the poll scheduler.
///
/// Every payload is an owned snapshot; the receiver keeps its own copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchdogMessage {
    /// Cluster display name, sent once after start-up. `None` when it is
    /// neither configured nor discoverable.
    ClusterName(Option<String>),
    /// Open an aggregated report.
    ReportStart,
    Schedules(ScheduleSnapshot),
    Backups(BackupSnapshot),
    /// Close the aggregated report and flush it.
    ReportEnd,
    /// Stop the change detector.
    Shutdown,
}

impl WatchdogMessage {
    /// Short kind label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClusterName(_) => "cluster_name",
            Self::ReportStart => "report_start",
            Self::Schedules(_) => "schedules",
            Self::Backups(_) => "backups",
            Self::ReportEnd => "report_end",
            Self::Shutdown => "shutdown",
        }
    }
}
