//! Domain values exchanged between the poller and the change detector.
//!
//! Every value here is an owned snapshot: the poller builds it, moves it
//! into a message, and the change detector keeps its own copy.

mod backup;
mod coverage;
mod schedule;

pub use backup::{BackupPhase, BackupRecord, ExpiryState, LastBackupView, parse_expiry_days};
pub use coverage::NamespaceCoverageReport;
pub use schedule::{FieldChange, ScheduleDiff, ScheduleRecord, ScheduleSnapshot};

/// The backup half of a poll: last backups plus namespace coverage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupSnapshot {
    pub view: LastBackupView,
    pub coverage: NamespaceCoverageReport,
}
