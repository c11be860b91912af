//! Velero schedule records and schedule-set diffing.

use std::collections::BTreeMap;

/// The scope and timing of a single Velero schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleRecord {
    /// Namespaces the schedule backs up, in declaration order.
    pub included_namespaces: Vec<String>,
    /// Resource kinds the schedule is restricted to.
    pub included_resources: Vec<String>,
    /// Whether pod volumes default to file-system backup (unset when the
    /// schedule does not say).
    pub default_volumes_to_fs_backup: Option<bool>,
    /// Cron expression driving the schedule.
    pub cron_time: String,
}

/// All schedules seen in one poll, keyed by schedule name.
pub type ScheduleSnapshot = BTreeMap<String, ScheduleRecord>;

/// A single field that differs between two versions of a schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: &'static str,
    pub old: String,
    pub new: String,
}

impl ScheduleRecord {
    /// List the fields whose values differ from `other`, in a fixed order.
    pub fn field_changes(&self, other: &ScheduleRecord) -> Vec<FieldChange> {
        let mut changes = Vec::new();

        let mut push = |field: &'static str, old: String, new: String| {
            if old != new {
                changes.push(FieldChange { field, old, new });
            }
        };

        push(
            "included_namespaces",
            format_list(&self.included_namespaces),
            format_list(&other.included_namespaces),
        );
        push(
            "included_resources",
            format_list(&self.included_resources),
            format_list(&other.included_resources),
        );
        push(
            "default_volumes_to_fs_backup",
            format_flag(self.default_volumes_to_fs_backup),
            format_flag(other.default_volumes_to_fs_backup),
        );
        push(
            "cron_time",
            self.cron_time.clone(),
            other.cron_time.clone(),
        );

        changes
    }
}

/// Structural difference between two schedule snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleDiff {
    /// Schedules only present in the old snapshot.
    pub removed: Vec<String>,
    /// Schedules only present in the new snapshot.
    pub added: Vec<String>,
    /// Schedules present in both with at least one differing field.
    pub updated: Vec<(String, Vec<FieldChange>)>,
}

impl ScheduleDiff {
    /// Compute the difference from `old` to `new`. Output lists are sorted
    /// by schedule name.
    pub fn between(old: &ScheduleSnapshot, new: &ScheduleSnapshot) -> Self {
        let removed = old
            .keys()
            .filter(|name| !new.contains_key(*name))
            .cloned()
            .collect();

        let added = new
            .keys()
            .filter(|name| !old.contains_key(*name))
            .cloned()
            .collect();

        let updated = old
            .iter()
            .filter_map(|(name, before)| {
                let after = new.get(name)?;
                let changes = before.field_changes(after);
                (!changes.is_empty()).then(|| (name.clone(), changes))
            })
            .collect();

        Self {
            removed,
            added,
            updated,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty() && self.updated.is_empty()
    }
}

fn format_list(values: &[String]) -> String {
    format!("[{}]", values.join(", "))
}

fn format_flag(value: Option<bool>) -> String {
    match value {
        Some(flag) => flag.to_string(),
        None => "unset".to_string(),
    }
}
