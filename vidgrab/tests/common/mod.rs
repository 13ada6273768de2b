//! Shared fixtures: a scripted engine and polling helpers.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use vidgrab::downloader::engine::{
    Checkpoint, DownloadEngine, DownloadRequest, EngineError, FormatDescriptor, ProbeInfo,
    ProgressEvent,
};
use vidgrab::downloader::{DownloadManager, DownloadManagerConfig, JobStatus, ProgressSnapshot};

pub const CHUNK: u64 = 1_000;
/// Steps of a `slow` download.
pub const SLOW_STEPS: u64 = 250;

/// Engine whose behavior is picked by the URL:
///
/// - `bad` in the URL: the probe fails
/// - `stall`: the download never reports and waits for the abort token
/// - `fail`: the download reports once, then fails
/// - `slow`: many small steps, long enough to pause or cancel
///
/// Successful runs sit in the starting phase for three step delays before
/// the first report.
/// - anything else: a short successful download
pub struct ScriptedEngine {
    pub step_delay: Duration,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(20),
        }
    }
}

fn format(id: &str, ext: &str, height: Option<u32>, vcodec: &str, acodec: &str) -> FormatDescriptor {
    let mut f = FormatDescriptor::new(id);
    f.ext = Some(ext.to_string());
    f.height = height;
    f.width = height.map(|h| h * 16 / 9);
    f.fps = height.map(|_| 30.0);
    f.tbr = Some(f64::from(height.unwrap_or(128)) * 2.0);
    f.vcodec = Some(vcodec.to_string());
    f.acodec = Some(acodec.to_string());
    if height.is_none() {
        f.resolution = Some("audio only".to_string());
    }
    f.with_derived_markers()
}

/// The format list every probe returns.
pub fn sample_formats() -> Vec<FormatDescriptor> {
    vec![
        format("251", "webm", None, "none", "opus"),
        format("140", "m4a", None, "none", "mp4a.40.2"),
        format("18", "mp4", Some(360), "avc1.42001E", "mp4a.40.2"),
        format("136", "mp4", Some(720), "avc1.4d401f", "none"),
        format("137", "mp4", Some(1080), "avc1.640028", "none"),
        format("248", "webm", Some(1080), "vp9", "none"),
    ]
}

impl ScriptedEngine {
    fn part_file(request: &DownloadRequest) -> PathBuf {
        request.work_dir.join("clip.mp4.part")
    }

    fn run_steps(
        &self,
        request: &DownloadRequest,
        checkpoint: &dyn Checkpoint,
        steps: u64,
    ) -> Result<(), EngineError> {
        let part = Self::part_file(request);
        let mut downloaded = if request.resume_existing {
            std::fs::metadata(&part).map(|m| m.len()).unwrap_or(0)
        } else {
            0
        };
        let total = steps * CHUNK;

        std::thread::sleep(self.step_delay * 3);
        while downloaded < total {
            if request.abort.is_cancelled() {
                return Err(EngineError::Aborted);
            }
            // The part file only grows by chunks the checkpoint accepted, so
            // after an interrupt its size equals the last reported count.
            let next = downloaded + CHUNK;
            checkpoint.report(ProgressEvent::Downloading {
                downloaded_bytes: next,
                total_bytes: Some(total),
                total_bytes_estimate: None,
                speed: Some(50_000.0),
                eta: Some((total - next) / CHUNK),
                filename: Some("clip.mp4".to_string()),
            })?;
            std::fs::write(&part, vec![0u8; next as usize])?;
            downloaded = next;
            std::thread::sleep(self.step_delay);
        }

        std::fs::rename(&part, request.work_dir.join("clip.mp4"))?;
        checkpoint.report(ProgressEvent::Finished {
            filename: Some("clip.mp4".to_string()),
        })?;
        // Post-processing window, so the finished state is observable.
        std::thread::sleep(self.step_delay * 5);
        Ok(())
    }
}

impl DownloadEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn probe(&self, url: &str) -> Result<ProbeInfo, EngineError> {
        if url.contains("bad") {
            return Err(EngineError::Failed(format!("Unsupported URL: {}", url)));
        }
        Ok(ProbeInfo {
            title: Some("Test Clip".to_string()),
            uploader: Some("Tester".to_string()),
            thumbnail: None,
            duration: Some(75.0),
            formats: sample_formats(),
        })
    }

    fn download(
        &self,
        request: &DownloadRequest,
        checkpoint: &dyn Checkpoint,
    ) -> Result<(), EngineError> {
        let url = request.url.as_str();
        if url.contains("stall") {
            let deadline = Instant::now() + Duration::from_secs(30);
            while Instant::now() < deadline {
                if request.abort.is_cancelled() {
                    return Err(EngineError::Aborted);
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            return Err(EngineError::Failed("stall fixture timed out".to_string()));
        }
        if url.contains("fail") {
            std::fs::write(Self::part_file(request), b"partial")?;
            checkpoint.report(ProgressEvent::Downloading {
                downloaded_bytes: 7,
                total_bytes: None,
                total_bytes_estimate: Some(70),
                speed: None,
                eta: None,
                filename: None,
            })?;
            return Err(EngineError::Failed("HTTP Error 403: Forbidden".to_string()));
        }
        let steps = if url.contains("slow") { SLOW_STEPS } else { 3 };
        self.run_steps(request, checkpoint, steps)
    }

    fn is_available(&self) -> bool {
        true
    }

    fn version(&self) -> Option<String> {
        Some("scripted-1.0".to_string())
    }
}

pub struct Fixture {
    pub manager: Arc<DownloadManager>,
    pub temp: tempfile::TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(tweak: impl FnOnce(&mut DownloadManagerConfig)) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut config = DownloadManagerConfig {
            downloads_dir: temp.path().join("downloads"),
            ..Default::default()
        };
        tweak(&mut config);
        let manager = Arc::new(DownloadManager::new(
            config,
            Arc::new(ScriptedEngine::default()),
        ));
        Self { manager, temp }
    }

    pub fn dest(&self) -> PathBuf {
        self.temp.path().join("videos")
    }

    pub fn dest_str(&self) -> String {
        self.dest().to_string_lossy().into_owned()
    }

    pub fn work_dir(&self, job_id: &str) -> PathBuf {
        self.manager.config().downloads_dir.join(job_id)
    }
}

/// Poll the job until `pred` holds or `timeout` passes.
pub async fn wait_for(
    manager: &DownloadManager,
    job_id: &str,
    timeout: Duration,
    pred: impl Fn(&ProgressSnapshot) -> bool,
) -> ProgressSnapshot {
    let deadline = Instant::now() + timeout;
    loop {
        let snapshot = manager.snapshot(job_id).expect("job exists");
        if pred(&snapshot) {
            return snapshot;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting, last snapshot: {:?}",
            snapshot
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn wait_for_status(
    manager: &DownloadManager,
    job_id: &str,
    status: JobStatus,
) -> ProgressSnapshot {
    wait_for(manager, job_id, Duration::from_secs(10), |s| s.status == status).await
}

pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
