//! Pipeline restart backoff.
//!
//! - Up to `failure_threshold` failures within the failure window restart
//!   immediately
//! - Beyond that: backoff = base * 2^(failures - threshold - 1)
//! - Backoff is capped at `max_backoff`
//! - Failures older than the window are forgotten

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(300);
pub const DEFAULT_FAILURE_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_FAILURE_THRESHOLD: usize = 3;

/// Maximum exponent to prevent overflow.
const MAX_EXPONENT: u32 = 10;

#[derive(Debug, Clone)]
pub struct RestartPolicy {
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Window for counting failures.
    pub failure_window: Duration,
    /// Failures restarted without delay.
    pub failure_threshold: usize,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            base_backoff: DEFAULT_BASE_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            failure_window: DEFAULT_FAILURE_WINDOW,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

/// Failure history of the pipeline.
#[derive(Debug)]
pub struct RestartTracker {
    policy: RestartPolicy,
    failures: Vec<Instant>,
    total_restarts: u64,
}

impl RestartTracker {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            failures: Vec::new(),
            total_restarts: 0,
        }
    }

    /// Record a failure and return how long to wait before restarting.
    pub fn record_failure(&mut self) -> Duration {
        let now = Instant::now();
        let window = self.policy.failure_window;
        self.failures.retain(|&t| now.duration_since(t) < window);
        self.failures.push(now);
        self.total_restarts += 1;

        let failures = self.failures.len();
        let backoff = self.backoff_for(failures);

        if backoff.is_zero() {
            debug!("Pipeline failed ({} times in window), immediate restart", failures);
        } else {
            info!(
                "Pipeline failed ({} times in window), backoff: {:?}",
                failures, backoff
            );
        }

        backoff
    }

    pub fn total_restarts(&self) -> u64 {
        self.total_restarts
    }

    fn backoff_for(&self, failures: usize) -> Duration {
        if failures <= self.policy.failure_threshold {
            return Duration::ZERO;
        }

        let exponent = (failures - self.policy.failure_threshold - 1).min(MAX_EXPONENT as usize) as u32;
        self.policy
            .base_backoff
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.policy.max_backoff)
    }
}
