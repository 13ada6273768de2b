use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vidgrab::api::{ApiServer, AppState};
use vidgrab::config::AppConfig;
use vidgrab::downloader::{DownloadEngine, DownloadManager, YtDlpEngine};
use vidgrab::logging::init_logging;

/// How long live downloads get to stop after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env_or_default();

    // Keep the guard alive so buffered log lines are flushed on exit.
    let (logging_config, _log_guard) = init_logging(&config.log_dir)?;

    let cancel = CancellationToken::new();
    logging_config.start_retention_cleanup(cancel.child_token());

    let engine = YtDlpEngine::with_config(config.engine_config());
    match engine.version() {
        Some(version) => info!(version = %version, "Using yt-dlp"),
        None => warn!(
            path = %config.ytdlp_path,
            "yt-dlp not found, downloads will fail until it is installed"
        ),
    }

    let manager = Arc::new(DownloadManager::new(
        config.manager_config(),
        Arc::new(engine),
    ));
    let janitor = manager.start_janitor(cancel.child_token());

    let state = AppState::new(Arc::clone(&manager))
        .with_logging_config(logging_config)
        .with_progress_interval(config.progress_interval());
    let server = Arc::new(ApiServer::new(config.server_config(), state));

    let shutdown_server = Arc::clone(&server);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received");
        shutdown_server.shutdown();
    });

    info!(
        downloads_dir = %config.downloads_dir.display(),
        max_concurrent = config.max_concurrent_downloads,
        "vidgrab starting"
    );
    server.run().await?;

    manager.shutdown(SHUTDOWN_GRACE).await;
    cancel.cancel();
    let _ = janitor.await;

    info!("vidgrab stopped");
    Ok(())
}
