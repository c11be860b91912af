//! Cluster Snapshot Source.
//!
//! Turns raw Velero listings into the two views the change detector
//! consumes:
//! - the schedule snapshot, keyed by schedule name
//! - the last backup of every schedule (plus ad-hoc backups) together
//!   with the namespaces no schedule covers

mod k8s;
pub mod velero;

pub use k8s::{KubeClusterSource, KubeSourceConfig};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::Result;
use crate::domain::{BackupSnapshot, LastBackupView, NamespaceCoverageReport, ScheduleSnapshot};

/// Raw access to the cluster resources the watchdog inspects.
#[async_trait]
pub trait ClusterSource: Send + Sync {
    /// Names of every namespace in the cluster.
    async fn list_namespaces(&self) -> Result<Vec<String>>;

    /// Velero schedules in listing order.
    async fn list_schedules(&self) -> Result<Vec<velero::Schedule>>;

    /// Velero backups in listing order.
    async fn list_backups(&self) -> Result<Vec<velero::Backup>>;

    /// Cluster name discovered from the connection, if any.
    fn cluster_name(&self) -> Option<String> {
        None
    }
}

/// Builds schedule and backup snapshots from a [`ClusterSource`].
#[derive(Clone)]
pub struct SnapshotSource {
    source: Arc<dyn ClusterSource>,
}

impl SnapshotSource {
    pub fn new(source: Arc<dyn ClusterSource>) -> Self {
        Self { source }
    }

    pub fn cluster_name(&self) -> Option<String> {
        self.source.cluster_name()
    }

    /// Fetch every schedule.
    pub async fn fetch_schedules(&self) -> Result<ScheduleSnapshot> {
        let raw = self.source.list_schedules().await?;
        let snapshot = resolve_schedules(raw);
        debug!(count = snapshot.len(), "Fetched schedules");
        Ok(snapshot)
    }

    /// Fetch the last-backup view and namespace coverage.
    pub async fn fetch_backups(&self) -> Result<BackupSnapshot> {
        self.fetch_backups_at(Utc::now()).await
    }

    /// Same as [`fetch_backups`](Self::fetch_backups) with an explicit
    /// reference time for expiry evaluation.
    pub async fn fetch_backups_at(&self, now: DateTime<Utc>) -> Result<BackupSnapshot> {
        let backups = self.source.list_backups().await?;
        let view = resolve_last_backups(backups, now);

        let namespaces = self.source.list_namespaces().await?;
        let schedules = self.fetch_schedules().await?;
        let coverage = NamespaceCoverageReport::compute(&namespaces, &schedules);

        debug!(
            backups = view.len(),
            namespaces = coverage.total,
            uncovered = coverage.uncovered_count(),
            "Fetched backups"
        );

        Ok(BackupSnapshot { view, coverage })
    }
}

/// Key schedules by name. Schedules without a name are skipped.
pub fn resolve_schedules(raw: Vec<velero::Schedule>) -> ScheduleSnapshot {
    let mut snapshot = ScheduleSnapshot::new();
    for schedule in raw {
        match schedule.into_record() {
            Ok((name, record)) => {
                snapshot.insert(name, record);
            }
            Err(e) => warn!("Skipping schedule: {}", e),
        }
    }
    snapshot
}

/// Reduce a backup listing to the last backup per schedule, processing
/// backups in listing order.
pub fn resolve_last_backups(raw: Vec<velero::Backup>, now: DateTime<Utc>) -> LastBackupView {
    let mut view = LastBackupView::new();
    for backup in raw {
        match backup.into_record(now) {
            Ok(Some(record)) => {
                view.observe(record);
            }
            Ok(None) => {}
            Err(e) => warn!("Skipping backup: {}", e),
        }
    }
    view
}
