//! Pipeline supervisor.
//!
//! Wires poll scheduler, change detector and dispatcher together with
//! unbounded queues and runs them as one unit. When any task ends without
//! a shutdown request, the others are aborted and the whole pipeline is
//! rebuilt with empty state.

mod restart;

pub use restart::{RestartPolicy, RestartTracker};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::Result;
use crate::checker::{ChangeDetector, CheckerConfig};
use crate::config::WatchdogConfig;
use crate::notification::{Dispatcher, NotificationChannel};
use crate::scheduler::{PollScheduler, PollerConfig};
use crate::source::{ClusterSource, SnapshotSource};

/// How long a graceful shutdown may take before tasks are aborted.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

type TaskResult = (&'static str, Result<()>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineExit {
    Shutdown,
    Failed,
}

pub struct Watchdog {
    poller: PollerConfig,
    checker: CheckerConfig,
    source: SnapshotSource,
    channels: Vec<Arc<dyn NotificationChannel>>,
    restart_policy: RestartPolicy,
    cancel: CancellationToken,
}

impl Watchdog {
    pub fn new(
        config: &WatchdogConfig,
        source: Arc<dyn ClusterSource>,
        channels: Vec<Arc<dyn NotificationChannel>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            poller: PollerConfig::from(config),
            checker: CheckerConfig::from(config),
            source: SnapshotSource::new(source),
            channels,
            restart_policy: RestartPolicy::default(),
            cancel,
        }
    }

    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    /// Run until the cancellation token fires.
    pub async fn run(self) -> Result<()> {
        let mut tracker = RestartTracker::new(self.restart_policy.clone());
        let mut generation: u64 = 0;

        loop {
            generation += 1;
            info!(generation, "Starting watchdog pipeline");

            if self.run_pipeline().await == PipelineExit::Shutdown {
                info!("Watchdog stopped");
                return Ok(());
            }

            let backoff = tracker.record_failure();
            warn!(
                restarts = tracker.total_restarts(),
                "Pipeline stopped unexpectedly, restarting in {:?}", backoff
            );

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Watchdog stopped during restart backoff");
                    return Ok(());
                }
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    async fn run_pipeline(&self) -> PipelineExit {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let scheduler = PollScheduler::new(
            self.poller.clone(),
            self.source.clone(),
            inbound_tx,
            self.cancel.clone(),
        );
        let detector = ChangeDetector::new(self.checker.clone(), outbound_tx);
        let dispatcher = Dispatcher::new(self.channels.clone());

        let mut tasks: JoinSet<TaskResult> = JoinSet::new();
        tasks.spawn(
            async move { ("poller", scheduler.run().await) }.instrument(info_span!("poller")),
        );
        tasks.spawn(
            async move {
                detector.run(inbound_rx).await;
                ("checker", Ok(()))
            }
            .instrument(info_span!("checker")),
        );
        tasks.spawn(
            async move {
                dispatcher.run(outbound_rx).await;
                ("dispatcher", Ok(()))
            }
            .instrument(info_span!("dispatcher")),
        );

        let first = tokio::select! {
            joined = tasks.join_next() => joined,
            _ = self.cancel.cancelled() => None,
        };

        if self.cancel.is_cancelled() {
            if let Some(joined) = first {
                log_task_exit(joined);
            }
            drain(&mut tasks).await;
            return PipelineExit::Shutdown;
        }

        match first {
            Some(joined) => log_task_exit(joined),
            None => error!("Pipeline has no tasks"),
        }

        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
        PipelineExit::Failed
    }
}

/// Wait for the remaining tasks to finish on their own, aborting them
/// after [`SHUTDOWN_TIMEOUT`].
async fn drain(tasks: &mut JoinSet<TaskResult>) {
    let graceful = async {
        while let Some(joined) = tasks.join_next().await {
            log_task_exit(joined);
        }
    };

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, graceful).await.is_err() {
        warn!("Pipeline did not stop within {:?}, aborting", SHUTDOWN_TIMEOUT);
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }
}

fn log_task_exit(joined: std::result::Result<TaskResult, tokio::task::JoinError>) {
    match joined {
        Ok((task, Ok(()))) => debug!(task, "Task finished"),
        Ok((task, Err(e))) => error!(task, "Task failed: {}", e),
        Err(e) if e.is_panic() => error!("Task panicked: {}", e),
        Err(e) => debug!("Task cancelled: {}", e),
    }
}
