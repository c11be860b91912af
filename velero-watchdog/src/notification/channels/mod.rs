//! Notification channels.
//!
//! - Log (always on)
//! - Telegram Bot API

mod logger;
mod telegram;

pub use logger::LogChannel;
pub use telegram::{TelegramChannel, TelegramConfig};

use async_trait::async_trait;

use crate::Result;

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Get the channel type name.
    fn channel_type(&self) -> &'static str;

    /// Check if the channel is enabled.
    fn is_enabled(&self) -> bool;

    /// Deliver one rendered notification.
    async fn send(&self, text: &str) -> Result<()>;
}
