//! Poll Scheduler.
//!
//! Samples the cluster on a fixed cycle and pushes every partial result to
//! the change detector as a [`WatchdogMessage`]. A failed fetch skips its
//! step; only a closed inbound queue stops the scheduler.

mod cycle;
pub mod messages;

pub use cycle::{CycleState, CycleStep, MAX_LOOP_COUNTER};
pub use messages::WatchdogMessage;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WatchdogConfig;
use crate::source::SnapshotSource;
use crate::{Error, Result};

/// Delay before the first message after start-up.
pub const STARTUP_GRACE: Duration = Duration::from_secs(2);

/// Wall-clock pacing of the cycle.
pub const TICK: Duration = Duration::from_secs(1);

/// Progress is logged every this many elapsed seconds.
const PROGRESS_LOG_SECONDS: u64 = 30;

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub cycle_seconds: u64,
    pub schedule_enable: bool,
    pub backup_enable: bool,
    /// Bracket every cycle with report start/end markers.
    pub aggregated_report: bool,
    /// Overrides the name discovered from the cluster connection.
    pub cluster_name: Option<String>,
}

impl From<&WatchdogConfig> for PollerConfig {
    fn from(config: &WatchdogConfig) -> Self {
        Self {
            cycle_seconds: config.process.cycle_seconds,
            schedule_enable: config.velero.schedule_enable,
            backup_enable: config.velero.backup_enable,
            aggregated_report: config.velero.aggregated_report,
            cluster_name: config.process.cluster_name.clone(),
        }
    }
}

pub struct PollScheduler {
    config: PollerConfig,
    source: SnapshotSource,
    tx: mpsc::UnboundedSender<WatchdogMessage>,
    cancel: CancellationToken,
    state: CycleState,
}

impl PollScheduler {
    pub fn new(
        config: PollerConfig,
        source: SnapshotSource,
        tx: mpsc::UnboundedSender<WatchdogMessage>,
        cancel: CancellationToken,
    ) -> Self {
        let state = CycleState::new(config.cycle_seconds);
        Self {
            config,
            source,
            tx,
            cancel,
            state,
        }
    }

    /// Run until cancelled or until the change detector goes away.
    ///
    /// On cancellation a [`WatchdogMessage::Shutdown`] is queued before
    /// returning.
    pub async fn run(mut self) -> Result<()> {
        info!(cycle_seconds = self.config.cycle_seconds, "Poll scheduler started");

        tokio::select! {
            _ = self.cancel.cancelled() => return self.shutdown(),
            _ = tokio::time::sleep(STARTUP_GRACE) => {}
        }

        let cluster_name = self
            .config
            .cluster_name
            .clone()
            .or_else(|| self.source.cluster_name());
        self.emit(WatchdogMessage::ClusterName(cluster_name))?;

        loop {
            if let Some(step) = self.state.due_step() {
                self.run_step(step).await?;
                self.state.complete(step);
            }

            if self.state.elapsed_seconds() % PROGRESS_LOG_SECONDS == 0 {
                info!(
                    "...wait next check in {} sec",
                    self.state.seconds_to_next_round()
                );
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return self.shutdown(),
                _ = tokio::time::sleep(TICK) => {}
            }
            self.state.tick();
        }
    }

    async fn run_step(&mut self, step: CycleStep) -> Result<()> {
        debug!(?step, loop_counter = self.state.loop_counter(), "Cycle step");

        match step {
            CycleStep::ReportStart => {
                info!(loop_counter = self.state.loop_counter() + 1, "Starting poll round");
                if self.config.aggregated_report {
                    self.emit(WatchdogMessage::ReportStart)?;
                }
            }
            CycleStep::Schedules if self.config.schedule_enable => {
                match self.source.fetch_schedules().await {
                    Ok(snapshot) => self.emit(WatchdogMessage::Schedules(snapshot))?,
                    Err(e) => warn!("Failed to fetch schedules: {}", e),
                }
            }
            CycleStep::Backups if self.config.backup_enable => {
                match self.source.fetch_backups().await {
                    Ok(snapshot) => self.emit(WatchdogMessage::Backups(snapshot))?,
                    Err(e) => warn!("Failed to fetch backups: {}", e),
                }
            }
            CycleStep::ReportEnd if self.config.aggregated_report => {
                self.emit(WatchdogMessage::ReportEnd)?;
            }
            CycleStep::Rest => debug!("Poll round finished"),
            _ => {}
        }

        Ok(())
    }

    fn emit(&self, message: WatchdogMessage) -> Result<()> {
        debug!(kind = message.kind(), "Queueing message");
        self.tx
            .send(message)
            .map_err(|_| Error::QueueClosed("inbound"))
    }

    fn shutdown(&self) -> Result<()> {
        info!("Poll scheduler stopping");
        // The detector may already be gone during shutdown.
        let _ = self.tx.send(WatchdogMessage::Shutdown);
        Ok(())
    }
}
