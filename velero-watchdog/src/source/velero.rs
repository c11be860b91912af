//! Wire shapes of the `velero.io/v1` custom resources.
//!
//! Only the fields the watchdog reads are modelled; everything else in the
//! resource is ignored.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::domain::{BackupPhase, BackupRecord, ScheduleRecord};
use crate::{Error, Result};

/// Label Velero puts on every backup created by a schedule.
pub const SCHEDULE_NAME_LABEL: &str = "velero.io/schedule-name";

/// Expiry description used when no day count can be derived.
pub const EXPIRE_NOT_AVAILABLE: &str = "N/A";

/// Expiry description for a backup still being written.
pub const EXPIRE_IN_PROGRESS: &str = "in progress";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Schedule {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: Option<ScheduleSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSpec {
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub template: Option<BackupTemplate>,
    /// Older manifests carry the resource filter at spec level.
    #[serde(default)]
    pub included_resources: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupTemplate {
    #[serde(default)]
    pub included_namespaces: Option<Vec<String>>,
    #[serde(default)]
    pub included_resources: Option<Vec<String>>,
    #[serde(default)]
    pub default_volumes_to_fs_backup: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Backup {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: Option<BackupStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStatus {
    #[serde(default)]
    pub phase: Option<String>,
    /// Velero reports counts here; older tooling wrote message lists.
    #[serde(default)]
    pub errors: Option<Value>,
    #[serde(default)]
    pub warnings: Option<Value>,
    #[serde(default)]
    pub expiration: Option<String>,
    #[serde(default)]
    pub completion_timestamp: Option<String>,
    #[serde(default)]
    pub progress: Option<Value>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl BackupStatus {
    /// A status object with no fields at all (`status: {}`).
    pub fn is_empty(&self) -> bool {
        self.phase.is_none()
            && self.errors.is_none()
            && self.warnings.is_none()
            && self.expiration.is_none()
            && self.completion_timestamp.is_none()
            && self.progress.is_none()
            && self.other.is_empty()
    }

    fn expire_description(&self, now: DateTime<Utc>) -> String {
        if self.phase.is_none() {
            return match self.progress {
                Some(_) => EXPIRE_IN_PROGRESS.to_string(),
                None => EXPIRE_NOT_AVAILABLE.to_string(),
            };
        }

        self.expiration
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|expiration| {
                let days = (expiration.with_timezone(&Utc) - now).num_days();
                format!("{}d", days)
            })
            .unwrap_or_else(|| EXPIRE_NOT_AVAILABLE.to_string())
    }
}

impl Schedule {
    /// Convert into the schedule name and its record.
    pub fn into_record(self) -> Result<(String, ScheduleRecord)> {
        let name = self
            .metadata
            .name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::malformed("schedule without metadata.name"))?;

        let Some(spec) = self.spec else {
            return Ok((name, ScheduleRecord::default()));
        };

        let template = spec.template.unwrap_or_default();
        let record = ScheduleRecord {
            included_namespaces: template.included_namespaces.unwrap_or_default(),
            included_resources: template
                .included_resources
                .or(spec.included_resources)
                .unwrap_or_default(),
            default_volumes_to_fs_backup: template.default_volumes_to_fs_backup,
            cron_time: spec.schedule.unwrap_or_default(),
        };

        Ok((name, record))
    }
}

impl Backup {
    /// Convert into a backup record, evaluating expiry relative to `now`.
    ///
    /// Returns `Ok(None)` for backups Velero has not written a status for.
    pub fn into_record(self, now: DateTime<Utc>) -> Result<Option<BackupRecord>> {
        let name = self
            .metadata
            .name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::malformed("backup without metadata.name"))?;

        let status = match self.status {
            Some(status) if !status.is_empty() => status,
            _ => return Ok(None),
        };

        let schedule = self
            .metadata
            .labels
            .and_then(|mut labels| labels.remove(SCHEDULE_NAME_LABEL))
            .filter(|schedule| !schedule.is_empty());

        let expire = status.expire_description(now);

        Ok(Some(BackupRecord {
            name,
            schedule,
            phase: BackupPhase::parse(status.phase.as_deref().unwrap_or_default()),
            errors: messages(status.errors.as_ref()),
            warnings: messages(status.warnings.as_ref()),
            completion_timestamp: status.completion_timestamp,
            expire,
        }))
    }
}

/// Flatten an error/warning field into display strings.
fn messages(value: Option<&Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Number(count)) if count.as_u64() == Some(0) => Vec::new(),
        Some(Value::Number(count)) => vec![count.to_string()],
        Some(Value::String(message)) if message.is_empty() => Vec::new(),
        Some(Value::String(message)) => vec![message.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(message) => message.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(other) => vec![other.to_string()],
    }
}
