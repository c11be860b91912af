//! Velero backup records and the last-backup-per-schedule view.

use std::fmt;

/// Phase reported by Velero for a backup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BackupPhase {
    Completed,
    InProgress,
    Failed,
    PartiallyFailed,
    /// Any other phase Velero reports (e.g. `New`, `FailedValidation`).
    Other(String),
    /// No phase reported yet.
    #[default]
    Unknown,
}

impl BackupPhase {
    /// Parse a Velero phase string. Matching is case-insensitive.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" => Self::Unknown,
            "completed" => Self::Completed,
            "inprogress" => Self::InProgress,
            "failed" => Self::Failed,
            "partiallyfailed" => Self::PartiallyFailed,
            _ => Self::Other(trimmed.to_string()),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl fmt::Display for BackupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "Completed"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Failed => write!(f, "Failed"),
            Self::PartiallyFailed => write!(f, "PartiallyFailed"),
            Self::Other(raw) => write!(f, "{}", raw),
            Self::Unknown => Ok(()),
        }
    }
}

/// How close a backup is to being garbage-collected by Velero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryState {
    /// More days left than the warning threshold.
    Healthy(u32),
    /// Fewer days left than the warning threshold.
    NearExpiry(u32),
    /// The expiry description carries no positive day count.
    NotRetrievable,
}

/// One backup as observed in a poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupRecord {
    pub name: String,
    /// Owning schedule, absent for ad-hoc backups.
    pub schedule: Option<String>,
    pub phase: BackupPhase,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub completion_timestamp: Option<String>,
    /// Free-form expiry description such as `"12d"`, `"in progress"` or `"N/A"`.
    pub expire: String,
}

impl BackupRecord {
    /// Owning schedule name, treating an empty label as unscheduled.
    pub fn schedule_name(&self) -> Option<&str> {
        self.schedule.as_deref().filter(|name| !name.is_empty())
    }

    /// Classify the expiry description against `threshold_days`.
    ///
    /// Returns `None` when no expiry description was recorded at all.
    pub fn expiry_state(&self, threshold_days: u32) -> Option<ExpiryState> {
        if self.expire.is_empty() {
            return None;
        }

        Some(match parse_expiry_days(&self.expire) {
            None => ExpiryState::NotRetrievable,
            Some(days) if days < threshold_days => ExpiryState::NearExpiry(days),
            Some(days) => ExpiryState::Healthy(days),
        })
    }
}

/// Extract the positive day count preceding the first `d` in an expiry
/// description. `"12d"` yields 12; `"N/A"`, `"0d"` and `"-3d"` yield `None`.
pub fn parse_expiry_days(expire: &str) -> Option<u32> {
    let index = expire.find('d')?;
    let days: i64 = expire[..index].trim().parse().ok()?;
    u32::try_from(days).ok().filter(|days| *days > 0)
}

/// The most recent backup of every schedule plus every ad-hoc backup.
///
/// Recency is decided by comparing backup names: Velero names scheduled
/// backups `<schedule>-<YYYYMMDDhhmmss>`, so a lexicographically greater
/// name is a later run. Entries keep the order in which they were first
/// retained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LastBackupView {
    entries: Vec<BackupRecord>,
}

impl LastBackupView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a backup to the view. Returns `true` when it was retained.
    ///
    /// A scheduled backup replaces the retained backup of the same schedule
    /// only when its name sorts after it; the replacement moves to the end.
    pub fn observe(&mut self, backup: BackupRecord) -> bool {
        let Some(schedule) = backup.schedule_name() else {
            match self.entries.iter().position(|e| e.name == backup.name) {
                Some(pos) => self.entries[pos] = backup,
                None => self.entries.push(backup),
            }
            return true;
        };

        let existing = self
            .entries
            .iter()
            .position(|e| e.schedule_name() == Some(schedule));

        match existing {
            None => {
                self.entries.push(backup);
                true
            }
            Some(pos) if backup.name > self.entries[pos].name => {
                self.entries.remove(pos);
                self.entries.push(backup);
                true
            }
            Some(_) => false,
        }
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&BackupRecord> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BackupRecord> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<BackupRecord> for LastBackupView {
    fn from_iter<I: IntoIterator<Item = BackupRecord>>(iter: I) -> Self {
        let mut view = Self::new();
        for backup in iter {
            view.observe(backup);
        }
        view
    }
}

impl<'a> IntoIterator for &'a LastBackupView {
    type Item = &'a BackupRecord;
    type IntoIter = std::slice::Iter<'a, BackupRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
