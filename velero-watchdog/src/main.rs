use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use velero_watchdog::config::WatchdogConfig;
use velero_watchdog::logging::init_logging;
use velero_watchdog::notification::configured_channels;
use velero_watchdog::services::Watchdog;
use velero_watchdog::source::KubeClusterSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WatchdogConfig::from_env();

    // Keep the guard alive so buffered file output is flushed on exit.
    let _log_guard = init_logging(&config.logging)?;

    info!(version = env!("CARGO_PKG_VERSION"), "velero-watchdog starting");
    config.log_summary();

    let source = KubeClusterSource::connect(&config.process.kube).await?;
    let channels = configured_channels(&config.notification.telegram);

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    Watchdog::new(&config, Arc::new(source), channels, cancel)
        .run()
        .await?;

    info!("velero-watchdog exited");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }

    cancel.cancel();
}
