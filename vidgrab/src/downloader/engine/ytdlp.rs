//! yt-dlp download engine implementation.

use std::process::Stdio;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use process_utils::{KillOnDrop, ProcessGroupExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use super::traits::{
    Checkpoint, DownloadEngine, DownloadRequest, EngineError, FormatDescriptor, ProbeInfo,
    ProgressEvent,
};
use super::utils::{
    OutputTail, for_each_line, last_error_line, parse_progress_line, progress_template,
};

/// How often the download loop wakes up to check the abort token when
/// yt-dlp is silent.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Lines of stderr kept for error reporting.
const STDERR_TAIL_LINES: usize = 50;

/// yt-dlp engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YtDlpEngineConfig {
    /// Path to the yt-dlp executable.
    pub binary_path: String,
    /// Fragments fetched in parallel for HLS/DASH downloads.
    pub concurrent_fragments: u32,
    /// Additional arguments appended before the URL.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for YtDlpEngineConfig {
    fn default() -> Self {
        Self {
            binary_path: "yt-dlp".to_string(),
            concurrent_fragments: 4,
            extra_args: Vec::new(),
        }
    }
}

/// Subset of `yt-dlp -J` output the service uses.
#[derive(Debug, Deserialize)]
struct RawInfo {
    title: Option<String>,
    uploader: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

/// Numeric fields are read as `f64` since extractors disagree on whether
/// they print integers or floats.
#[derive(Debug, Deserialize)]
struct RawFormat {
    #[serde(default)]
    format_id: String,
    ext: Option<String>,
    width: Option<f64>,
    height: Option<f64>,
    fps: Option<f64>,
    tbr: Option<f64>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
    vcodec: Option<String>,
    acodec: Option<String>,
    resolution: Option<String>,
}

fn non_negative(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

impl From<RawFormat> for FormatDescriptor {
    fn from(raw: RawFormat) -> Self {
        let mut format = FormatDescriptor::new(raw.format_id);
        format.ext = raw.ext;
        format.width = non_negative(raw.width).map(|v| v as u32);
        format.height = non_negative(raw.height).map(|v| v as u32);
        format.fps = non_negative(raw.fps);
        format.tbr = non_negative(raw.tbr);
        format.filesize = non_negative(raw.filesize)
            .or_else(|| non_negative(raw.filesize_approx))
            .map(|v| v as u64);
        format.vcodec = raw.vcodec;
        format.acodec = raw.acodec;
        format.resolution = raw.resolution;
        format.with_derived_markers()
    }
}

impl From<RawInfo> for ProbeInfo {
    fn from(raw: RawInfo) -> Self {
        Self {
            title: raw.title,
            uploader: raw.uploader,
            thumbnail: raw.thumbnail,
            duration: non_negative(raw.duration),
            formats: raw
                .formats
                .into_iter()
                .filter(|f| !f.format_id.is_empty())
                .map(FormatDescriptor::from)
                .collect(),
        }
    }
}

/// Parse the JSON document printed by `yt-dlp -J`.
pub fn parse_probe_output(json: &[u8]) -> Result<ProbeInfo, EngineError> {
    let raw: RawInfo =
        serde_json::from_slice(json).map_err(|e| EngineError::Parse(e.to_string()))?;
    Ok(raw.into())
}

/// yt-dlp-based download engine.
///
/// Each call runs the executable as a child process on the calling thread.
/// The child is killed as soon as the checkpoint interrupts the transfer or
/// the request's abort token fires.
pub struct YtDlpEngine {
    config: YtDlpEngineConfig,
    /// Cached version string.
    version: Option<String>,
}

impl YtDlpEngine {
    /// Create a new engine with default configuration.
    pub fn new() -> Self {
        Self::with_config(YtDlpEngineConfig::default())
    }

    /// Create with a custom configuration.
    pub fn with_config(config: YtDlpEngineConfig) -> Self {
        let version = Self::detect_version(&config.binary_path);
        Self { config, version }
    }

    /// Engine configuration.
    pub fn config(&self) -> &YtDlpEngineConfig {
        &self.config
    }

    fn detect_version(path: &str) -> Option<String> {
        let mut cmd = process_utils::std_command(path);
        cmd.arg("--version").stdin(Stdio::null());
        cmd.output()
            .ok()
            .filter(|output| output.status.success())
            .and_then(|output| String::from_utf8(output.stdout).ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn build_probe_args(url: &str) -> Vec<String> {
        vec![
            "-J".to_string(),
            "--no-playlist".to_string(),
            "--skip-download".to_string(),
            "--no-warnings".to_string(),
            "--".to_string(),
            url.to_string(),
        ]
    }

    /// Build yt-dlp command arguments for a download.
    fn build_download_args(&self, request: &DownloadRequest) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            request.format_selector.clone(),
            "-o".to_string(),
            request.output_path().to_string_lossy().into_owned(),
            "--newline".to_string(),
            "--quiet".to_string(),
            "--progress".to_string(),
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "--progress-template".to_string(),
            progress_template(),
            "--concurrent-fragments".to_string(),
            self.config.concurrent_fragments.max(1).to_string(),
        ];

        // Partial fragments are only reused when resuming.
        if request.resume_existing {
            args.push("--continue".to_string());
        } else {
            args.push("--no-continue".to_string());
        }

        args.extend(self.config.extra_args.iter().cloned());

        args.push("--".to_string());
        args.push(request.url.clone());
        args
    }

    fn failure_message(tail: &[String], status: std::process::ExitStatus) -> String {
        last_error_line(tail).unwrap_or_else(|| format!("yt-dlp exited with {}", status))
    }
}

impl Default for YtDlpEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadEngine for YtDlpEngine {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn probe(&self, url: &str) -> Result<ProbeInfo, EngineError> {
        let mut cmd = process_utils::std_command(&self.config.binary_path);
        cmd.args(Self::build_probe_args(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(url = %url, "Probing with yt-dlp");
        let output = cmd.output().map_err(|source| EngineError::Spawn {
            program: self.config.binary_path.clone(),
            source,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<String> = stderr.lines().map(str::to_string).collect();
            return Err(EngineError::Failed(Self::failure_message(
                &lines,
                output.status,
            )));
        }

        let info = parse_probe_output(&output.stdout)?;
        debug!(
            url = %url,
            title = ?info.title,
            formats = info.formats.len(),
            "Probe complete"
        );
        Ok(info)
    }

    fn download(
        &self,
        request: &DownloadRequest,
        checkpoint: &dyn Checkpoint,
    ) -> Result<(), EngineError> {
        let args = self.build_download_args(request);
        debug!(
            binary = %self.config.binary_path,
            args = ?args,
            "Starting yt-dlp"
        );

        let mut cmd = process_utils::std_command(&self.config.binary_path);
        cmd.args(&args)
            .current_dir(&request.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .own_process_group();

        let child = cmd.spawn().map_err(|source| EngineError::Spawn {
            program: self.config.binary_path.clone(),
            source,
        })?;
        // yt-dlp runs ffmpeg for merges and HLS; killing the group stops
        // those too, before a resumed attempt writes the same files.
        let mut child = KillOnDrop::process_group(child);
        info!(pid = child.id(), url = %request.url, "yt-dlp started");

        let stdout = child
            .child_mut()
            .stdout
            .take()
            .ok_or_else(|| EngineError::Parse("stdout was not captured".to_string()))?;
        let stderr = child
            .child_mut()
            .stderr
            .take()
            .ok_or_else(|| EngineError::Parse("stderr was not captured".to_string()))?;

        let stderr_tail = OutputTail::spawn(stderr, STDERR_TAIL_LINES);

        // stdout is read on a helper thread so this loop can keep polling
        // the abort token while yt-dlp prints nothing.
        let (tx, rx) = mpsc::channel::<String>();
        let reader = std::thread::spawn(move || {
            for_each_line(stdout, |line| tx.send(line).is_ok());
        });

        let mut saw_finished = false;
        let mut last_filename: Option<String> = None;

        loop {
            if request.abort.is_cancelled() {
                warn!(pid = child.id(), "Abort requested, killing yt-dlp");
                let _ = child.kill();
                return Err(EngineError::Aborted);
            }

            let line = match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => line,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let Some(event) = parse_progress_line(&line) else {
                trace!(target: "vidgrab::engine::stdout", "{}", line);
                continue;
            };

            match &event {
                ProgressEvent::Downloading { filename, .. } => {
                    if filename.is_some() {
                        last_filename.clone_from(filename);
                    }
                }
                ProgressEvent::Finished { filename } => {
                    saw_finished = true;
                    if filename.is_some() {
                        last_filename.clone_from(filename);
                    }
                }
            }

            if let Err(interrupt) = checkpoint.report(event) {
                info!(pid = child.id(), reason = %interrupt.reason, "Stopping yt-dlp");
                let _ = child.kill();
                return Err(interrupt.into());
            }
        }

        let status = child.wait()?;
        let _ = reader.join();
        let tail = stderr_tail.finish();

        if request.abort.is_cancelled() {
            return Err(EngineError::Aborted);
        }

        if !status.success() {
            return Err(EngineError::Failed(Self::failure_message(&tail, status)));
        }

        // Already-complete files produce no progress lines at all.
        if !saw_finished {
            checkpoint.report(ProgressEvent::Finished {
                filename: last_filename,
            })?;
        }

        info!(url = %request.url, "yt-dlp finished");
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.version.is_some()
    }

    fn version(&self) -> Option<String> {
        self.version.clone()
    }
}
