use async_trait::async_trait;
use tracing::info;

use super::NotificationChannel;
use crate::Result;

/// Writes every notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn channel_type(&self) -> &'static str {
        "log"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn send(&self, text: &str) -> Result<()> {
        info!(target: "velero_watchdog::notification", "\n{}", text);
        Ok(())
    }
}
