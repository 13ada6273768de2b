//! Download engine trait and related types.
//!
//! An engine wraps an external downloader whose transfer call blocks for
//! the whole download and cannot be interrupted from outside. The only way
//! back into the job is the [`Checkpoint`] the engine must call for every
//! progress event; returning an [`Interrupt`] from it is how pause and
//! cancel requests reach the transfer.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why a checkpoint stopped the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptReason {
    /// The user cancelled the job; partial output is discarded.
    Cancelled,
    /// The user paused the job; partial output is kept for resumption.
    Paused,
    /// The job already gave up on this call (stall).
    Aborted,
}

impl InterruptReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled by user",
            Self::Paused => "paused by user",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for InterruptReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned by a checkpoint to make the engine stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("download {reason}")]
pub struct Interrupt {
    pub reason: InterruptReason,
}

impl Interrupt {
    pub fn cancelled() -> Self {
        Self {
            reason: InterruptReason::Cancelled,
        }
    }

    pub fn paused() -> Self {
        Self {
            reason: InterruptReason::Paused,
        }
    }

    pub fn aborted() -> Self {
        Self {
            reason: InterruptReason::Aborted,
        }
    }
}

/// Errors produced by download engines.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A checkpoint asked the engine to stop.
    #[error("download {0}")]
    Interrupted(InterruptReason),

    /// The request's abort token fired (stall watchdog).
    #[error("download aborted")]
    Aborted,

    /// The engine ran but reported a failure.
    #[error("{0}")]
    Failed(String),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected engine output: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Interrupt> for EngineError {
    fn from(interrupt: Interrupt) -> Self {
        Self::Interrupted(interrupt.reason)
    }
}

/// One progress notification from an engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Bytes are being transferred.
    Downloading {
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        total_bytes_estimate: Option<u64>,
        /// Bytes per second.
        speed: Option<f64>,
        /// Seconds remaining.
        eta: Option<u64>,
        filename: Option<String>,
    },
    /// The engine finished transferring a file; post-processing may follow.
    Finished { filename: Option<String> },
}

/// Hook the engine calls synchronously for every progress event.
///
/// Returning `Err` means the engine must stop the transfer and return
/// [`EngineError::Interrupted`].
pub trait Checkpoint: Send + Sync {
    fn report(&self, event: ProgressEvent) -> Result<(), Interrupt>;
}

impl<F> Checkpoint for F
where
    F: Fn(ProgressEvent) -> Result<(), Interrupt> + Send + Sync,
{
    fn report(&self, event: ProgressEvent) -> Result<(), Interrupt> {
        self(event)
    }
}

/// A single media format as reported by a probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub format_id: String,
    pub ext: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    /// Total bitrate in kbit/s.
    pub tbr: Option<f64>,
    /// Exact size when known, otherwise the engine's approximation.
    pub filesize: Option<u64>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub resolution: Option<String>,
    /// Derived: the format carries audio and no video.
    pub audio_only: bool,
}

fn codec_present(codec: Option<&str>) -> bool {
    !matches!(codec, None | Some("none"))
}

impl FormatDescriptor {
    /// Create a descriptor and derive its `audio_only` marker.
    pub fn new(format_id: impl Into<String>) -> Self {
        Self {
            format_id: format_id.into(),
            ext: None,
            width: None,
            height: None,
            fps: None,
            tbr: None,
            filesize: None,
            vcodec: None,
            acodec: None,
            resolution: None,
            audio_only: false,
        }
    }

    /// Recompute `audio_only` from the codec and resolution fields.
    pub fn with_derived_markers(mut self) -> Self {
        let labelled = self
            .resolution
            .as_deref()
            .is_some_and(|r| r.eq_ignore_ascii_case("audio only"));
        let codecs = !codec_present(self.vcodec.as_deref())
            && codec_present(self.acodec.as_deref());
        self.audio_only = labelled || codecs;
        self
    }

    /// Has a video stream and no (known) audio stream.
    pub fn is_video_only(&self) -> bool {
        codec_present(self.vcodec.as_deref())
            && matches!(self.acodec.as_deref(), None | Some("none") | Some("unknown"))
    }
}

/// Metadata returned by a probe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeInfo {
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub thumbnail: Option<String>,
    /// Seconds.
    pub duration: Option<f64>,
    pub formats: Vec<FormatDescriptor>,
}

/// Parameters for one blocking download call.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub format_selector: String,
    /// Scratch directory the engine writes into.
    pub work_dir: PathBuf,
    /// Engine-specific output template, relative to `work_dir`.
    pub output_template: String,
    /// Continue partial files already present in `work_dir`.
    pub resume_existing: bool,
    /// Fired when the job gives up on the call (stall). Engines should poll it.
    pub abort: CancellationToken,
}

impl DownloadRequest {
    pub fn new(
        url: impl Into<String>,
        format_selector: impl Into<String>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            url: url.into(),
            format_selector: format_selector.into(),
            work_dir: work_dir.into(),
            output_template: "%(title).150s.%(ext)s".to_string(),
            resume_existing: false,
            abort: CancellationToken::new(),
        }
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume_existing = resume;
        self
    }

    pub fn with_abort(mut self, abort: CancellationToken) -> Self {
        self.abort = abort;
        self
    }

    /// Full output path template handed to the engine.
    pub fn output_path(&self) -> PathBuf {
        self.work_dir.join(&self.output_template)
    }
}

/// Trait for download engines.
///
/// Both calls block the current thread; callers dispatch them to the
/// blocking pool.
pub trait DownloadEngine: Send + Sync {
    /// Short engine name for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Fetch metadata and the list of available formats without downloading.
    fn probe(&self, url: &str) -> Result<ProbeInfo, EngineError>;

    /// Download `request.url` into `request.work_dir`, calling `checkpoint`
    /// for every progress event.
    fn download(
        &self,
        request: &DownloadRequest,
        checkpoint: &dyn Checkpoint,
    ) -> Result<(), EngineError>;

    /// Check if the engine is usable (e.g. the binary exists).
    fn is_available(&self) -> bool;

    /// Engine version string, if it can be determined.
    fn version(&self) -> Option<String>;
}
