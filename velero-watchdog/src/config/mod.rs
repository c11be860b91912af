//! Process configuration.
//!
//! Configuration is read once at start-up from the environment (after
//! loading an optional `.env` file) and never reloaded. Invalid values
//! fall back to their defaults with a warning.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::{info, warn};

use crate::logging::LoggingSettings;
use crate::notification::TelegramConfig;
use crate::source::KubeSourceConfig;
use crate::utils::text::mask_secret;

/// Default poll cycle length in seconds.
pub const DEFAULT_CYCLE_SECONDS: u64 = 120;

/// Default near-expiry warning threshold in days.
pub const DEFAULT_EXPIRES_DAYS_WARNING: u32 = 20;

/// Default heartbeat interval in hours.
pub const DEFAULT_ALIVE_MESSAGE_HOURS: u32 = 24;

/// Upper bound for the heartbeat interval in hours.
pub const MAX_ALIVE_MESSAGE_HOURS: u32 = 100;

/// Cluster connection and poll cadence.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Seconds between the end of one poll cycle and the start of the next.
    pub cycle_seconds: u64,
    /// Display name of the cluster; discovered from the connection when unset.
    pub cluster_name: Option<String>,
    pub kube: KubeSourceConfig,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            cycle_seconds: DEFAULT_CYCLE_SECONDS,
            cluster_name: None,
            kube: KubeSourceConfig::default(),
        }
    }
}

/// What to poll and how to report it.
#[derive(Debug, Clone)]
pub struct VeleroConfig {
    pub backup_enable: bool,
    pub schedule_enable: bool,
    /// Collect every alert of a cycle into a single report.
    pub aggregated_report: bool,
    pub expires_days_warning: u32,
}

impl Default for VeleroConfig {
    fn default() -> Self {
        Self {
            backup_enable: true,
            schedule_enable: true,
            aggregated_report: true,
            expires_days_warning: DEFAULT_EXPIRES_DAYS_WARNING,
        }
    }
}

/// Heartbeat and channel settings.
#[derive(Debug, Clone)]
pub struct NotificationSettings {
    /// Hours without any alert before a heartbeat is sent; 0 disables it.
    pub alive_message_hours: u32,
    pub telegram: TelegramConfig,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            alive_message_hours: DEFAULT_ALIVE_MESSAGE_HOURS,
            telegram: TelegramConfig::default(),
        }
    }
}

/// Complete watchdog configuration.
#[derive(Debug, Clone, Default)]
pub struct WatchdogConfig {
    pub process: ProcessConfig,
    pub velero: VeleroConfig,
    pub notification: NotificationSettings,
    pub logging: LoggingSettings,
}

impl WatchdogConfig {
    /// Load from `.env` (if present) and the process environment.
    pub fn from_env() -> Self {
        let dotenv = dotenvy::dotenv();
        let config = Self::from_lookup(|key| std::env::var(key).ok());
        if let Err(e) = dotenv
            && !e.not_found()
        {
            warn!("Failed to load .env file: {}", e);
        }
        config
    }

    /// Load using `lookup` to resolve each key.
    ///
    /// Supported keys:
    /// - `PROCESS_CYCLE_SEC`, `PROCESS_CLUSTER_NAME`, `PROCESS_KUBE_CONFIG`,
    ///   `K8S_INCLUSTER_MODE`, `VELERO_NAMESPACE`
    /// - `BACKUP_ENABLE`, `SCHEDULE_ENABLE`, `REPORT_AGGREGATED`,
    ///   `EXPIRES_DAYS_WARNING`
    /// - `NOTIFICATION_ALIVE_MSG_HOURS`, `TELEGRAM_ENABLE`, `TELEGRAM_TOKEN`,
    ///   `TELEGRAM_CHAT_ID`, `TELEGRAM_MAX_MSG_LEN`, `TELEGRAM_MAX_MSG_MINUTE`
    /// - `LOG_LEVEL`, `DEBUG`, `LOG_SAVE`, `LOG_DEST_FOLDER`, `LOG_FILENAME`,
    ///   `LOG_FILES_BACKUP`
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };
        let defaults = Self::default();

        let process = ProcessConfig {
            cycle_seconds: env.number("PROCESS_CYCLE_SEC", defaults.process.cycle_seconds),
            cluster_name: env.string("PROCESS_CLUSTER_NAME"),
            kube: KubeSourceConfig {
                in_cluster: env.flag("K8S_INCLUSTER_MODE", defaults.process.kube.in_cluster),
                kube_config_file: env.string("PROCESS_KUBE_CONFIG").map(PathBuf::from),
                velero_namespace: env
                    .string("VELERO_NAMESPACE")
                    .unwrap_or(defaults.process.kube.velero_namespace),
            },
        };

        let velero = VeleroConfig {
            backup_enable: env.flag("BACKUP_ENABLE", defaults.velero.backup_enable),
            schedule_enable: env.flag("SCHEDULE_ENABLE", defaults.velero.schedule_enable),
            aggregated_report: env.flag("REPORT_AGGREGATED", defaults.velero.aggregated_report),
            expires_days_warning: env
                .number("EXPIRES_DAYS_WARNING", defaults.velero.expires_days_warning),
        };

        let alive_message_hours: i64 = env.number(
            "NOTIFICATION_ALIVE_MSG_HOURS",
            i64::from(defaults.notification.alive_message_hours),
        );

        let telegram_defaults = defaults.notification.telegram;
        let telegram = TelegramConfig {
            enabled: env.flag("TELEGRAM_ENABLE", telegram_defaults.enabled),
            bot_token: env.string("TELEGRAM_TOKEN").unwrap_or_default(),
            chat_id: env.string("TELEGRAM_CHAT_ID").unwrap_or_default(),
            max_message_len: env.number("TELEGRAM_MAX_MSG_LEN", telegram_defaults.max_message_len),
            messages_per_minute: env.number(
                "TELEGRAM_MAX_MSG_MINUTE",
                telegram_defaults.messages_per_minute,
            ),
            ..telegram_defaults
        };

        let notification = NotificationSettings {
            alive_message_hours: alive_message_hours.clamp(0, i64::from(MAX_ALIVE_MESSAGE_HOURS))
                as u32,
            telegram,
        };

        let level = if env.flag("DEBUG", false) {
            "debug".to_string()
        } else {
            env.string("LOG_LEVEL")
                .and_then(|raw| normalize_level(&raw))
                .unwrap_or(defaults.logging.level)
        };

        let logging = LoggingSettings {
            level,
            save_to_file: env.flag("LOG_SAVE", defaults.logging.save_to_file),
            folder: env
                .string("LOG_DEST_FOLDER")
                .map(PathBuf::from)
                .unwrap_or(defaults.logging.folder),
            filename: env
                .string("LOG_FILENAME")
                .unwrap_or(defaults.logging.filename),
            max_files: env.number("LOG_FILES_BACKUP", defaults.logging.max_files),
        };

        Self {
            process,
            velero,
            notification,
            logging,
        }
    }

    /// Log the effective configuration with secrets masked.
    pub fn log_summary(&self) {
        info!(
            cycle_seconds = self.process.cycle_seconds,
            cluster_name = self.process.cluster_name.as_deref().unwrap_or("<discover>"),
            in_cluster = self.process.kube.in_cluster,
            kube_config = ?self.process.kube.kube_config_file,
            velero_namespace = %self.process.kube.velero_namespace,
            "Process setup"
        );
        info!(
            backup_enable = self.velero.backup_enable,
            schedule_enable = self.velero.schedule_enable,
            aggregated_report = self.velero.aggregated_report,
            expires_days_warning = self.velero.expires_days_warning,
            "Velero setup"
        );

        let telegram = &self.notification.telegram;
        info!(
            alive_message_hours = self.notification.alive_message_hours,
            telegram = telegram.enabled,
            "Notification setup"
        );
        if telegram.enabled {
            info!(
                chat_id = %mask_secret(&telegram.chat_id),
                token = %mask_secret(&telegram.bot_token),
                max_message_len = telegram.max_message_len,
                messages_per_minute = telegram.messages_per_minute,
                "Telegram setup"
            );
        }
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-empty trimmed value of `key`.
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        match self.string(key) {
            Some(value) => matches!(value.to_ascii_lowercase().as_str(), "true" | "1"),
            None => default,
        }
    }

    fn number<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr + std::fmt::Display + Copy,
    {
        let Some(raw) = self.string(key) else {
            return default;
        };

        match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(
                    "Config error: {} of '{}' is invalid - using default of '{}'",
                    key, raw, default
                );
                default
            }
        }
    }
}

/// Accept `trace`/`debug`/`info`/`warn`/`error` or the numeric levels
/// 10/20/30/40/50.
fn normalize_level(raw: &str) -> Option<String> {
    let level = match raw.trim().to_ascii_lowercase().as_str() {
        "trace" | "5" => "trace",
        "debug" | "10" => "debug",
        "info" | "20" => "info",
        "warn" | "warning" | "30" => "warn",
        "error" | "critical" | "40" | "50" => "error",
        other => {
            warn!("Config error: LOG_LEVEL of '{}' is invalid - using default", other);
            return None;
        }
    };
    Some(level.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> WatchdogConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WatchdogConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]);
        assert_eq!(config.process.cycle_seconds, 120);
        assert!(config.process.cluster_name.is_none());
        assert!(!config.process.kube.in_cluster);
        assert_eq!(config.process.kube.velero_namespace, "velero");
        assert!(config.velero.backup_enable);
        assert!(config.velero.schedule_enable);
        assert!(config.velero.aggregated_report);
        assert_eq!(config.velero.expires_days_warning, 20);
        assert_eq!(config.notification.alive_message_hours, 24);
        assert!(!config.notification.telegram.enabled);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.save_to_file);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("PROCESS_CYCLE_SEC", "30"),
            ("PROCESS_CLUSTER_NAME", "prod-eu"),
            ("K8S_INCLUSTER_MODE", "1"),
            ("BACKUP_ENABLE", "False"),
            ("REPORT_AGGREGATED", "false"),
            ("EXPIRES_DAYS_WARNING", "7"),
            ("TELEGRAM_ENABLE", "TRUE"),
            ("TELEGRAM_TOKEN", "123:abc"),
            ("TELEGRAM_CHAT_ID", "-100"),
            ("TELEGRAM_MAX_MSG_LEN", "2000"),
            ("LOG_LEVEL", "10"),
        ]);

        assert_eq!(config.process.cycle_seconds, 30);
        assert_eq!(config.process.cluster_name.as_deref(), Some("prod-eu"));
        assert!(config.process.kube.in_cluster);
        assert!(!config.velero.backup_enable);
        assert!(!config.velero.aggregated_report);
        assert_eq!(config.velero.expires_days_warning, 7);
        assert!(config.notification.telegram.enabled);
        assert_eq!(config.notification.telegram.bot_token, "123:abc");
        assert_eq!(config.notification.telegram.max_message_len, 2000);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = load(&[("PROCESS_CYCLE_SEC", "soon"), ("EXPIRES_DAYS_WARNING", "-4")]);
        assert_eq!(config.process.cycle_seconds, DEFAULT_CYCLE_SECONDS);
        assert_eq!(config.velero.expires_days_warning, DEFAULT_EXPIRES_DAYS_WARNING);
    }

    #[test]
    fn test_alive_hours_clamped() {
        let config = load(&[("NOTIFICATION_ALIVE_MSG_HOURS", "500")]);
        assert_eq!(config.notification.alive_message_hours, MAX_ALIVE_MESSAGE_HOURS);

        let config = load(&[("NOTIFICATION_ALIVE_MSG_HOURS", "-3")]);
        assert_eq!(config.notification.alive_message_hours, 0);
    }

    #[test]
    fn test_debug_flag_wins_over_level() {
        let config = load(&[("DEBUG", "true"), ("LOG_LEVEL", "error")]);
        assert_eq!(config.logging.level, "debug");
    }
}
