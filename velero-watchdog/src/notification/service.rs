//! Outbound queue consumer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::channels::{LogChannel, NotificationChannel, TelegramChannel, TelegramConfig};

/// Delivery counters.
#[derive(Debug, Default)]
pub struct DispatchStats {
    received: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl DispatchStats {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Successful channel deliveries.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Failed channel deliveries.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// The log channel plus Telegram when it is configured.
pub fn configured_channels(telegram: &TelegramConfig) -> Vec<Arc<dyn NotificationChannel>> {
    let mut channels: Vec<Arc<dyn NotificationChannel>> = vec![Arc::new(LogChannel)];

    let telegram = TelegramChannel::new(telegram.clone());
    if telegram.is_enabled() {
        channels.push(Arc::new(telegram));
    }

    channels
}

/// Fans each outbound text out to every enabled channel.
pub struct Dispatcher {
    channels: Vec<Arc<dyn NotificationChannel>>,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self {
            channels,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }

    /// Deliver `text` to every enabled channel, in channel order.
    pub async fn dispatch(&self, text: &str) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        for channel in self.channels.iter().filter(|c| c.is_enabled()) {
            match channel.send(text).await {
                Ok(()) => {
                    self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                    debug!(channel = channel.channel_type(), "Notification delivered");
                }
                Err(e) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        channel = channel.channel_type(),
                        "Failed to deliver notification: {}", e
                    );
                }
            }
        }
    }

    /// Drain `rx` until every sender is dropped.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<String>) {
        let enabled: Vec<&'static str> = self
            .channels
            .iter()
            .filter(|c| c.is_enabled())
            .map(|c| c.channel_type())
            .collect();
        info!(channels = ?enabled, "Dispatcher started");

        while let Some(text) = rx.recv().await {
            if text.is_empty() {
                continue;
            }
            self.dispatch(&text).await;
        }

        info!(
            received = self.stats.received(),
            failed = self.stats.failed(),
            "Outbound queue closed, dispatcher stopping"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::Result;

    struct Recorder {
        name: &'static str,
        enabled: bool,
        fail: bool,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl NotificationChannel for Recorder {
        fn channel_type(&self) -> &'static str {
            self.name
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }

        async fn send(&self, text: &str) -> Result<()> {
            self.seen.lock().unwrap().push(text.to_string());
            if self.fail {
                Err(crate::Error::Other("forced failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn recorder(
        name: &'static str,
        enabled: bool,
        fail: bool,
    ) -> (Arc<dyn NotificationChannel>, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let channel = Recorder {
            name,
            enabled,
            fail,
            seen: Arc::clone(&seen),
        };
        (Arc::new(channel), seen)
    }

    #[tokio::test]
    async fn test_run_delivers_in_order_and_stops_on_close() {
        let (ok, ok_seen) = recorder("ok", true, false);
        let (disabled, disabled_seen) = recorder("off", false, false);
        let dispatcher = Dispatcher::new(vec![ok, disabled]);
        let stats = dispatcher.stats();

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send("first".to_string()).unwrap();
        tx.send(String::new()).unwrap();
        tx.send("second".to_string()).unwrap();
        drop(tx);

        dispatcher.run(rx).await;

        assert_eq!(*ok_seen.lock().unwrap(), vec!["first", "second"]);
        assert!(disabled_seen.lock().unwrap().is_empty());
        assert_eq!(stats.received(), 2);
        assert_eq!(stats.delivered(), 2);
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_block_others() {
        let (bad, _) = recorder("bad", true, true);
        let (good, good_seen) = recorder("good", true, false);
        let dispatcher = Dispatcher::new(vec![bad, good]);
        let stats = dispatcher.stats();

        dispatcher.dispatch("alert").await;

        assert_eq!(*good_seen.lock().unwrap(), vec!["alert"]);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.delivered(), 1);
    }

    #[test]
    fn test_configured_channels_skip_unconfigured_telegram() {
        let channels = configured_channels(&TelegramConfig::default());
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].channel_type(), "log");
    }
}
