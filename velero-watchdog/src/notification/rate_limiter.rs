//! Token bucket limiting how many messages a channel may send per minute.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Token bucket rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    tokens: f64,
    /// Burst capacity.
    max_tokens: u32,
    /// Tokens added per second.
    refill_rate: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Allow `messages` per minute with a burst of the same size.
    ///
    /// Returns `None` for a zero budget, meaning "unlimited".
    pub fn per_minute(messages: u32) -> Option<Self> {
        if messages == 0 {
            return None;
        }

        Some(Self {
            tokens: f64::from(messages),
            max_tokens: messages,
            refill_rate: f64::from(messages) / 60.0,
            last_refill: Instant::now(),
        })
    }

    /// Try to acquire a token without waiting.
    pub fn try_acquire(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Acquire a token, waiting if necessary. Returns the time waited.
    pub async fn acquire(&mut self) -> Duration {
        let mut total_wait = Duration::ZERO;

        loop {
            if self.try_acquire() {
                return total_wait;
            }

            let wait = Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate)
                .max(Duration::from_millis(1));
            debug!("Rate limited, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
            total_wait += wait;
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);

        self.tokens =
            (self.tokens + elapsed.as_secs_f64() * self.refill_rate).min(f64::from(self.max_tokens));
        self.last_refill = now;
    }
}
