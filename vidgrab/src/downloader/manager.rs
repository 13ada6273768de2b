//! Download Manager: the control API over all jobs.
//!
//! Every operation validates the job identifier first and touches only the
//! addressed job's entry. Long-running work is handed to the job runner;
//! no operation waits for a download.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::engine::{DownloadEngine, ProbeInfo};
use super::job::{JobEntry, JobId, JobStatus, ProgressSnapshot};
use super::registry::JobRegistry;
use super::runner::{RunnerContext, cancel_if_idle, run_attempt};
use super::stream_selector::{FormatSelectionConfig, ProbeResponse, StreamSelector, compose_selector};
use crate::utils::fs::ensure_dir_all_with_op;
use crate::{Error, Result};

/// Configuration for the Download Manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadManagerConfig {
    /// Parent of the per-job working directories.
    pub downloads_dir: PathBuf,
    /// Maximum concurrent downloads.
    pub max_concurrent_downloads: usize,
    /// Seconds without progress before an attempt is aborted (0 = never).
    pub stall_timeout_secs: u64,
    /// Seconds a finished or cancelled job stays visible.
    pub job_retention_secs: u64,
    /// Probe table preferences.
    #[serde(default)]
    pub format_selection: FormatSelectionConfig,
}

impl Default for DownloadManagerConfig {
    fn default() -> Self {
        Self {
            downloads_dir: PathBuf::from("./downloads"),
            max_concurrent_downloads: 3,
            stall_timeout_secs: 300,
            job_retention_secs: 3600,
            format_selection: FormatSelectionConfig::default(),
        }
    }
}

/// The Download Manager service.
pub struct DownloadManager {
    config: DownloadManagerConfig,
    registry: Arc<JobRegistry>,
    selector: StreamSelector,
    ctx: Arc<RunnerContext>,
}

impl DownloadManager {
    /// Create a manager driving `engine`.
    pub fn new(config: DownloadManagerConfig, engine: Arc<dyn DownloadEngine>) -> Self {
        let stall_timeout = match config.stall_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let ctx = Arc::new(RunnerContext {
            engine,
            slots: Arc::new(Semaphore::new(config.max_concurrent_downloads.max(1))),
            stall_timeout,
        });

        Self {
            selector: StreamSelector::with_config(config.format_selection.clone()),
            config,
            registry: Arc::new(JobRegistry::new()),
            ctx,
        }
    }

    pub fn config(&self) -> &DownloadManagerConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn DownloadEngine> {
        &self.ctx.engine
    }

    /// Number of jobs currently tracked.
    pub fn job_count(&self) -> usize {
        self.registry.len()
    }

    fn entry(&self, job_id: &str) -> Result<Arc<JobEntry>> {
        JobId::parse(job_id)
            .and_then(|id| self.registry.get(&id))
            .ok_or_else(|| Error::job_not_found(job_id))
    }

    async fn probe_info(&self, url: &str) -> Result<ProbeInfo> {
        let engine = Arc::clone(&self.ctx.engine);
        let url = url.to_string();
        tokio::task::spawn_blocking(move || engine.probe(&url))
            .await
            .map_err(|e| Error::Other(format!("Probe worker failed: {}", e)))?
            .map_err(Error::ProbeFailure)
    }

    /// Fetch metadata and the format table for `url` without downloading.
    pub async fn probe(&self, url: &str) -> Result<ProbeResponse> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::validation("url is required"));
        }
        let info = self.probe_info(url).await?;
        Ok(self.selector.probe_response(info))
    }

    /// Create a job and start its first attempt.
    ///
    /// Returns as soon as the attempt is spawned. A failing pre-flight probe
    /// creates nothing.
    pub async fn start(&self, url: &str, format_id: &str, dest_path: &str) -> Result<JobId> {
        let (url, format_id, dest_path) = (url.trim(), format_id.trim(), dest_path.trim());
        if url.is_empty() || format_id.is_empty() || dest_path.is_empty() {
            return Err(Error::validation(
                "url, format_id and dest_path are required",
            ));
        }

        let info = self.probe_info(url).await?;
        let selector = compose_selector(format_id, &info.formats);

        let job_id = JobId::new();
        let work_dir = self.config.downloads_dir.join(job_id.to_string());
        ensure_dir_all_with_op("creating working directory", &work_dir).await?;

        let snapshot = ProgressSnapshot::new(url, selector.as_str(), dest_path, info.title);
        let entry = Arc::new(JobEntry::new(job_id, snapshot, work_dir));
        let guard = entry
            .try_begin_attempt()
            .ok_or_else(|| Error::Other("new job is already running".to_string()))?;
        self.registry.insert(Arc::clone(&entry));

        info!(job_id = %job_id, url = %url, format = %selector, "Download job created");
        let handle = tokio::spawn(run_attempt(Arc::clone(&self.ctx), guard, false));
        entry.set_task(handle);

        Ok(job_id)
    }

    /// Ask the live attempt to pause. No-op when nothing is running.
    pub fn pause(&self, job_id: &str) -> Result<()> {
        let entry = self.entry(job_id)?;
        if entry.request_pause_if_live() {
            debug!(job_id = %entry.id(), "Pause requested");
        } else {
            debug!(job_id = %entry.id(), status = %entry.status(), "Pause ignored, no live attempt");
        }
        Ok(())
    }

    /// Start a new attempt for a paused or failed job, continuing its
    /// partial output.
    pub async fn resume(&self, job_id: &str) -> Result<()> {
        let entry = self.entry(job_id)?;

        let guard = entry.try_begin_attempt().ok_or_else(|| {
            Error::invalid_state(format!(
                "job is {} and an attempt is still running",
                entry.status()
            ))
        })?;
        if entry.is_retired() {
            return Err(Error::invalid_state("job was cancelled or already completed"));
        }
        let status = entry.status();
        if !status.is_resumable() {
            return Err(Error::invalid_state(format!(
                "job is {}, only paused or failed jobs can be resumed",
                status
            )));
        }

        entry.flags().clear_pause();
        if let Some(dir) = entry.work_dir() {
            ensure_dir_all_with_op("recreating working directory", &dir).await?;
        }
        entry.set_status(JobStatus::Queued);

        info!(job_id = %entry.id(), "Resuming download");
        let handle = tokio::spawn(run_attempt(Arc::clone(&self.ctx), guard, true));
        entry.set_task(handle);
        Ok(())
    }

    /// Cancel a job.
    ///
    /// A live attempt is signalled and discards its output at the next
    /// checkpoint. A job with no live attempt is torn down immediately.
    /// Cancelling a completed or already cancelled job is a no-op.
    pub async fn cancel(&self, job_id: &str) -> Result<()> {
        let entry = self.entry(job_id)?;
        if entry.is_retired() {
            return Ok(());
        }

        entry.flags().request_cancel();
        if !cancel_if_idle(&entry).await {
            debug!(job_id = %entry.id(), "Cancel requested");
        }
        Ok(())
    }

    /// Current snapshot of a job.
    pub fn snapshot(&self, job_id: &str) -> Result<ProgressSnapshot> {
        Ok(self.entry(job_id)?.snapshot())
    }

    /// Snapshot lookup that treats malformed identifiers as unknown.
    pub fn try_snapshot(&self, job_id: &str) -> Option<ProgressSnapshot> {
        JobId::parse(job_id).and_then(|id| self.registry.snapshot(&id))
    }

    /// All jobs, most recently updated first.
    pub fn list(&self) -> Vec<(JobId, ProgressSnapshot)> {
        self.registry.list()
    }

    /// Number of live attempts for a job (0 or 1).
    pub fn live_attempts(&self, job_id: &str) -> Result<usize> {
        Ok(usize::from(self.entry(job_id)?.is_live()))
    }

    /// Wait for the job's current attempt task to finish.
    pub async fn wait(&self, job_id: &str) -> Result<()> {
        let entry = self.entry(job_id)?;
        if let Some(task) = entry.task() {
            task.await;
        }
        Ok(())
    }

    /// Periodically evict retired jobs until `cancel` fires.
    pub fn start_janitor(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let retention = Duration::from_secs(self.config.job_retention_secs);
        let period = retention.clamp(Duration::from_secs(1), Duration::from_secs(60));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = registry.evict_retired(retention);
                        if !evicted.is_empty() {
                            debug!(count = evicted.len(), "Evicted retired jobs");
                        }
                    }
                }
            }
            debug!("Job janitor stopped");
        })
    }

    /// Cancel every live attempt and wait up to `grace` for them to stop.
    pub async fn shutdown(&self, grace: Duration) {
        let live = self.registry.live_entries();
        if live.is_empty() {
            return;
        }
        info!(count = live.len(), "Cancelling live downloads");

        let handles: Vec<_> = live
            .iter()
            .filter_map(|entry| {
                entry.flags().request_cancel();
                entry.task()
            })
            .collect();

        let all = futures::future::join_all(handles);
        if tokio::time::timeout(grace, all).await.is_err() {
            warn!("Timed out waiting for downloads to stop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::engine::{
        Checkpoint, DownloadRequest, EngineError, FormatDescriptor,
    };

    struct ProbeOnlyEngine;

    impl DownloadEngine for ProbeOnlyEngine {
        fn name(&self) -> &'static str {
            "probe-only"
        }

        fn probe(&self, url: &str) -> std::result::Result<ProbeInfo, EngineError> {
            if url.contains("bad") {
                return Err(EngineError::Failed("Unsupported URL".to_string()));
            }
            let mut audio = FormatDescriptor::new("140");
            audio.resolution = Some("audio only".to_string());
            Ok(ProbeInfo {
                title: Some("Clip".to_string()),
                formats: vec![audio.with_derived_markers()],
                ..Default::default()
            })
        }

        fn download(
            &self,
            _request: &DownloadRequest,
            _checkpoint: &dyn Checkpoint,
        ) -> std::result::Result<(), EngineError> {
            Err(EngineError::Failed("not supported".to_string()))
        }

        fn is_available(&self) -> bool {
            true
        }

        fn version(&self) -> Option<String> {
            Some("test".to_string())
        }
    }

    fn manager(dir: &std::path::Path) -> DownloadManager {
        DownloadManager::new(
            DownloadManagerConfig {
                downloads_dir: dir.to_path_buf(),
                ..Default::default()
            },
            Arc::new(ProbeOnlyEngine),
        )
    }

    #[test]
    fn test_config_default() {
        let config = DownloadManagerConfig::default();
        assert_eq!(config.max_concurrent_downloads, 3);
        assert_eq!(config.stall_timeout_secs, 300);
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_ids() {
        let temp = tempfile::tempdir().unwrap();
        let manager = manager(temp.path());

        let unknown = JobId::new().to_string();
        for id in ["not-a-uuid", unknown.as_str()] {
            assert!(matches!(manager.pause(id), Err(Error::JobNotFound(_))));
            assert!(matches!(manager.resume(id).await, Err(Error::JobNotFound(_))));
            assert!(matches!(manager.cancel(id).await, Err(Error::JobNotFound(_))));
            assert!(matches!(manager.snapshot(id), Err(Error::JobNotFound(_))));
            assert!(manager.try_snapshot(id).is_none());
        }
    }

    #[tokio::test]
    async fn test_start_validation() {
        let temp = tempfile::tempdir().unwrap();
        let manager = manager(temp.path());

        assert!(matches!(
            manager.start("", "137", "/tmp").await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            manager.start("https://x", " ", "/tmp").await,
            Err(Error::Validation(_))
        ));
        assert_eq!(manager.job_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_probe_creates_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let manager = manager(temp.path());

        let err = manager
            .start("https://bad.example", "137", "/tmp/out")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProbeFailure(_)));
        assert_eq!(manager.job_count(), 0);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_engine_failure_keeps_work_dir() {
        let temp = tempfile::tempdir().unwrap();
        let manager = manager(temp.path());

        let id = manager
            .start("https://ok.example", "137", "/tmp/out")
            .await
            .unwrap()
            .to_string();
        manager.wait(&id).await.unwrap();

        let s = manager.snapshot(&id).unwrap();
        assert_eq!(s.status, JobStatus::Error);
        assert_eq!(s.message.as_deref(), Some("not supported"));
        assert_eq!(s.selected_format, "137+140");
        assert_eq!(s.video_title.as_deref(), Some("Clip"));
        assert!(temp.path().join(&id).is_dir());
        assert_eq!(manager.live_attempts(&id).unwrap(), 0);
    }
}
