//! Alert text rendering.

use std::fmt::Write;

use crate::domain::{BackupPhase, BackupRecord, BackupSnapshot, ExpiryState, ScheduleDiff};

const BULLET: char = '\u{2022}';

/// Divider placed between fragments of an aggregated report.
pub const FRAGMENT_DIVIDER: &str = "--------------------";

/// Minimum length for a report to be worth sending.
pub const MIN_REPORT_LEN: usize = 10;

/// Settings echoed in the restart banner.
#[derive(Debug, Clone)]
pub struct BannerSettings {
    pub backup_enable: bool,
    pub schedule_enable: bool,
    pub aggregated_report: bool,
    pub expires_days_warning: u32,
    pub alive_message_hours: u32,
}

fn enabled(flag: bool) -> &'static str {
    if flag { "ENABLE" } else { "." }
}

/// Banner sent the first time the cluster name is known.
pub fn restart_banner(cluster_name: &str, settings: &BannerSettings) -> String {
    let mut text = String::from("velero-watchdog is restarted\n");
    let _ = writeln!(text, "Cluster name= {}", cluster_name);
    text.push_str("\nConfiguration setup:\n");
    let _ = writeln!(text, "  . backup status= {}", enabled(settings.backup_enable));
    let _ = writeln!(text, "  . scheduled status= {}", enabled(settings.schedule_enable));
    let _ = writeln!(text, "  . aggregated report= {}", enabled(settings.aggregated_report));
    let _ = writeln!(
        text,
        "  . expires days warning= {}d",
        settings.expires_days_warning
    );

    match settings.alive_message_hours {
        0 => text.push_str("\nAlive message disabled"),
        hours => {
            let _ = write!(text, "\nAlive message every {} hours", hours);
        }
    }

    text
}

/// Line sent when the cluster name is reported again.
pub fn cluster_line(cluster_name: &str) -> String {
    format!("Cluster name= {}", cluster_name)
}

/// "Still running" message.
pub fn heartbeat(cluster_name: &str, hours: u32) -> String {
    format!(
        "Cluster: {}\nvelero-watchdog is running.\nThis is an alive message\n\
         No warning/errors were triggered in the last {} hours ",
        cluster_name, hours
    )
}

/// Render a schedule diff. Additions are only listed when a previous
/// snapshot existed, so the first snapshot renders empty.
pub fn schedule_changes(diff: &ScheduleDiff, had_previous: bool) -> String {
    if diff.is_empty() {
        return String::new();
    }

    let mut sections = Vec::new();

    if !diff.removed.is_empty() {
        let mut section = String::from("Removed scheduled:");
        for name in &diff.removed {
            let _ = write!(section, "\n\t{}", name);
        }
        sections.push(section);
    }

    if had_previous && !diff.added.is_empty() {
        let mut section = String::from("Added scheduled:");
        for name in &diff.added {
            let _ = write!(section, "\n\t{}", name);
        }
        sections.push(section);
    }

    if !diff.updated.is_empty() {
        let mut section = String::from("Updated scheduled:");
        for (name, changes) in &diff.updated {
            let _ = write!(section, "\nSchedule name: {}", name);
            for change in changes {
                let _ = write!(section, "\n\t{}: {} -> {}", change.field, change.old, change.new);
            }
        }
        sections.push(section);
    }

    sections.join("\n")
}

/// Counters and name lists for the report header.
#[derive(Debug, Default)]
struct BackupSummary<'a> {
    total: usize,
    completed: usize,
    in_progress: Vec<&'a str>,
    failed: Vec<&'a str>,
    partially_failed: Vec<&'a str>,
    with_errors: Vec<&'a str>,
    with_warnings: Vec<&'a str>,
    near_expiry: Vec<&'a str>,
    expiry_unknown: Vec<&'a str>,
}

impl<'a> BackupSummary<'a> {
    fn record(&mut self, backup: &'a BackupRecord, expiry: Option<ExpiryState>) {
        let name = backup.name.as_str();
        self.total += 1;

        match backup.phase {
            BackupPhase::Completed => self.completed += 1,
            BackupPhase::InProgress => self.in_progress.push(name),
            BackupPhase::Failed => self.failed.push(name),
            BackupPhase::PartiallyFailed => self.partially_failed.push(name),
            BackupPhase::Other(_) | BackupPhase::Unknown => {}
        }

        if !backup.errors.is_empty() {
            self.with_errors.push(name);
        }
        if !backup.warnings.is_empty() {
            self.with_warnings.push(name);
        }

        match expiry {
            Some(ExpiryState::NearExpiry(_)) => self.near_expiry.push(name),
            Some(ExpiryState::NotRetrievable) => self.expiry_unknown.push(name),
            _ => {}
        }
    }
}

fn push_counted(text: &mut String, label: &str, names: &[&str]) {
    if names.is_empty() {
        return;
    }
    let _ = write!(text, "\n{} {}={}", BULLET, label, names.len());
    for name in names {
        let _ = write!(text, "\n\t{}", name);
    }
}

fn backup_block(backup: &BackupRecord, expiry: Option<ExpiryState>) -> String {
    let mut block = format!("{}\n", backup.name);
    let _ = writeln!(block, "\t schedule name={}", backup.schedule_name().unwrap_or_default());

    if let Some(completed) = backup.completion_timestamp.as_deref().filter(|t| !t.is_empty()) {
        let _ = writeln!(block, "\t end at={}", completed);
    }

    if let Some(state) = expiry {
        let _ = write!(block, "\t expire={}", backup.expire);
        match state {
            ExpiryState::NearExpiry(_) => block.push_str("**WARNING"),
            ExpiryState::NotRetrievable => {
                let _ = write!(block, "**IS NOT VALID{}", backup.expire);
            }
            ExpiryState::Healthy(_) => {}
        }
        block.push('\n');
    }

    if !backup.phase.is_unknown() {
        let _ = writeln!(block, "\t status={}", backup.phase);
    }
    if !backup.errors.is_empty() {
        let _ = writeln!(block, "\t error={}", backup.errors.join(", "));
    }
    if !backup.warnings.is_empty() {
        let _ = writeln!(block, "\t warning={}", backup.warnings.join(", "));
    }

    block
}

/// Render the backup report.
///
/// When some namespace is not covered by any schedule, the report is only
/// the list of uncovered namespaces.
pub fn backup_report(snapshot: &BackupSnapshot, expires_days_warning: u32) -> String {
    let coverage = &snapshot.coverage;

    if coverage.has_gaps() {
        let mut text = format!(
            "Namespace without active backup [{}/{}]:\n",
            coverage.uncovered_count(),
            coverage.total
        );
        for namespace in &coverage.uncovered {
            let _ = writeln!(text, "\t{}", namespace);
        }
        return text;
    }

    let mut summary = BackupSummary::default();
    let mut details = String::new();
    for backup in &snapshot.view {
        let expiry = backup.expiry_state(expires_days_warning);
        summary.record(backup, expiry);
        details.push_str(&backup_block(backup, expiry));
        details.push('\n');
    }

    let mut text = format!(
        "{b} Namespaces={}\n{b} Unscheduled namespaces={}\n\
         Backups Stats based on last backup for every schedule and backup without schedule\n\
         {b} Total={}\n{b} Completed={}",
        coverage.total,
        coverage.uncovered_count(),
        summary.total,
        summary.completed,
        b = BULLET,
    );

    push_counted(&mut text, "In Progress", &summary.in_progress);
    push_counted(&mut text, "With Errors", &summary.with_errors);
    push_counted(&mut text, "With Warnings", &summary.with_warnings);
    push_counted(&mut text, "Failed", &summary.failed);
    push_counted(&mut text, "Partially Failed", &summary.partially_failed);
    push_counted(
        &mut text,
        &format!(
            "Number of backups in warning period [expires day less than {}d]",
            expires_days_warning
        ),
        &summary.near_expiry,
    );
    push_counted(&mut text, "Expiry not retrievable", &summary.expiry_unknown);

    let _ = write!(
        text,
        "\nBackup details [{}/{}]:\n{}",
        summary.total, coverage.total, details
    );

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FieldChange, LastBackupView, NamespaceCoverageReport};

    fn record(name: &str, phase: BackupPhase, expire: &str) -> BackupRecord {
        BackupRecord {
            name: name.to_string(),
            schedule: Some("daily".to_string()),
            phase,
            expire: expire.to_string(),
            completion_timestamp: Some("2024-03-01T02:10:00Z".to_string()),
            ..Default::default()
        }
    }

    fn snapshot(backups: Vec<BackupRecord>, uncovered: &[&str], total: usize) -> BackupSnapshot {
        BackupSnapshot {
            view: backups.into_iter().collect::<LastBackupView>(),
            coverage: NamespaceCoverageReport {
                uncovered: uncovered.iter().map(|s| s.to_string()).collect(),
                total,
            },
        }
    }

    #[test]
    fn test_backup_report_header_and_details() {
        let mut failed = record("weekly-1", BackupPhase::Failed, "3d");
        failed.schedule = Some("weekly".to_string());
        failed.errors = vec!["2".to_string()];

        let text = backup_report(
            &snapshot(
                vec![record("daily-1", BackupPhase::Completed, "25d"), failed],
                &[],
                4,
            ),
            20,
        );

        assert!(text.starts_with("\u{2022} Namespaces=4\n\u{2022} Unscheduled namespaces=0\n"));
        assert!(text.contains("\u{2022} Total=2\n\u{2022} Completed=1"));
        assert!(text.contains("\u{2022} Failed=1\n\tweekly-1"));
        assert!(text.contains("\u{2022} With Errors=1\n\tweekly-1"));
        assert!(text.contains("expires day less than 20d]=1\n\tweekly-1"));
        assert!(text.contains("Backup details [2/4]:\ndaily-1\n"));
        assert!(text.contains("\t expire=3d**WARNING\n"));
        assert!(text.contains("\t expire=25d\n"));
        assert!(text.contains("\t error=2\n"));
        assert!(!text.contains("In Progress"));
    }

    #[test]
    fn test_unretrievable_expiry_is_not_near_expiry() {
        let text = backup_report(
            &snapshot(vec![record("daily-1", BackupPhase::Completed, "N/A")], &[], 1),
            20,
        );
        assert!(text.contains("\t expire=N/A**IS NOT VALIDN/A\n"));
        assert!(text.contains("Expiry not retrievable=1\n\tdaily-1"));
        assert!(!text.contains("warning period"));
    }

    #[test]
    fn test_coverage_gap_replaces_report() {
        let text = backup_report(
            &snapshot(
                vec![record("daily-1", BackupPhase::Completed, "25d")],
                &["ns2", "ns3"],
                3,
            ),
            20,
        );
        assert_eq!(text, "Namespace without active backup [2/3]:\n\tns2\n\tns3\n");
    }

    #[test]
    fn test_schedule_changes_sections() {
        let diff = ScheduleDiff {
            removed: vec!["old".to_string()],
            added: vec!["new".to_string()],
            updated: vec![(
                "daily".to_string(),
                vec![FieldChange {
                    field: "cron_time",
                    old: "0 1 * * *".to_string(),
                    new: "0 2 * * *".to_string(),
                }],
            )],
        };

        assert_eq!(
            schedule_changes(&diff, true),
            "Removed scheduled:\n\told\nAdded scheduled:\n\tnew\n\
             Updated scheduled:\nSchedule name: daily\n\tcron_time: 0 1 * * * -> 0 2 * * *"
        );
    }

    #[test]
    fn test_first_snapshot_renders_empty() {
        let diff = ScheduleDiff {
            added: vec!["daily".to_string()],
            ..Default::default()
        };
        assert!(schedule_changes(&diff, false).is_empty());
    }

    #[test]
    fn test_empty_diff_renders_empty() {
        assert!(schedule_changes(&ScheduleDiff::default(), true).is_empty());
    }

    #[test]
    fn test_restart_banner() {
        let text = restart_banner(
            "prod",
            &BannerSettings {
                backup_enable: true,
                schedule_enable: false,
                aggregated_report: true,
                expires_days_warning: 20,
                alive_message_hours: 24,
            },
        );
        assert!(text.starts_with("velero-watchdog is restarted\nCluster name= prod\n"));
        assert!(text.contains("  . backup status= ENABLE\n"));
        assert!(text.contains("  . scheduled status= .\n"));
        assert!(text.ends_with("Alive message every 24 hours"));
    }
}
