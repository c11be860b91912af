//! Telegram Bot API notification channel.
//!
//! Sends plain-text messages via `POST /bot<token>/sendMessage`. Long
//! notifications are split on line boundaries; every chunk consumes one
//! token of the per-minute budget. Handles 429 rate limits by respecting
//! the `parameters.retry_after` field returned in the JSON response body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::NotificationChannel;
use crate::notification::rate_limiter::RateLimiter;
use crate::utils::http_client::build_http_client;
use crate::utils::text::split_message;
use crate::{Error, Result};

/// Maximum number of retries for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Telegram `sendMessage` text limit (UTF-8 characters).
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Telegram channel configuration.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub bot_token: String,
    /// Target chat ID (user, group, or channel).
    pub chat_id: String,
    /// Chunk size for long notifications, capped at the API limit.
    pub max_message_len: usize,
    /// Messages allowed per minute; 0 disables local rate limiting.
    pub messages_per_minute: u32,
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: String::new(),
            chat_id: String::new(),
            max_message_len: 3000,
            messages_per_minute: 20,
            api_base: "https://api.telegram.org".to_string(),
        }
    }
}

/// Telegram notification channel.
pub struct TelegramChannel {
    config: TelegramConfig,
    client: Client,
    limiter: Mutex<Option<RateLimiter>>,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        crate::utils::http_client::install_rustls_provider();
        let limiter = RateLimiter::per_minute(config.messages_per_minute);
        Self {
            config,
            client: build_http_client(REQUEST_TIMEOUT),
            limiter: Mutex::new(limiter),
        }
    }

    fn chunk_len(&self) -> usize {
        match self.config.max_message_len {
            0 => TELEGRAM_MESSAGE_LIMIT,
            len => len.min(TELEGRAM_MESSAGE_LIMIT),
        }
    }

    /// Send request with rate limit handling.
    async fn send_with_retry(&self, payload: &serde_json::Value) -> Result<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        );
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self.client.post(&url).json(payload).send().await?;
            let status = response.status();

            if status.is_success() {
                return Ok(());
            }

            if status.as_u16() == 429 {
                let body: serde_json::Value = response.json().await.unwrap_or_default();
                let retry_after = retry_after(&body);

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        "Telegram rate limit: max retries ({}) exceeded, last retry_after was {:?}",
                        MAX_RATE_LIMIT_RETRIES, retry_after
                    );
                    return Err(Error::Other(format!(
                        "Telegram rate limit exceeded after {} retries",
                        MAX_RATE_LIMIT_RETRIES
                    )));
                }

                let wait_duration = retry_after.unwrap_or(Duration::from_secs(1));
                debug!(
                    "Telegram rate limited (429), waiting {:?} before retry (attempt {}/{})",
                    wait_duration, attempts, MAX_RATE_LIMIT_RETRIES
                );
                tokio::time::sleep(wait_duration).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(Error::Other(format!(
                "Telegram sendMessage failed: {} - {}",
                status, body
            )));
        }
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn channel_type(&self) -> &'static str {
        "telegram"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.bot_token.is_empty() && !self.config.chat_id.is_empty()
    }

    async fn send(&self, text: &str) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let chunks = split_message(text, self.chunk_len());
        let total = chunks.len();

        for (index, chunk) in chunks.into_iter().enumerate() {
            if let Some(limiter) = self.limiter.lock().await.as_mut() {
                let waited = limiter.acquire().await;
                if !waited.is_zero() {
                    debug!("Telegram budget exhausted, waited {:?}", waited);
                }
            }

            let payload = json!({
                "chat_id": self.config.chat_id,
                "text": chunk,
                "disable_web_page_preview": true,
            });
            self.send_with_retry(&payload).await?;
            debug!(chunk = index + 1, total, "Telegram message sent");
        }

        Ok(())
    }
}

/// `parameters.retry_after` of a 429 response body.
fn retry_after(body: &serde_json::Value) -> Option<Duration> {
    body.get("parameters")
        .and_then(|p| p.get("retry_after"))
        .and_then(|v| v.as_u64())
        .map(Duration::from_secs)
}
