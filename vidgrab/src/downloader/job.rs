//! Job model: identifiers, status, progress snapshots and per-job state.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Unique job identifier (random v4 UUID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a client-supplied identifier. Anything that is not a UUID can
    /// never name a job.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for a concurrency slot.
    Queued,
    /// Attempt initialised, engine not yet reporting.
    Starting,
    Downloading,
    /// Engine done transferring; relocation pending.
    Finished,
    /// Files are in the destination directory.
    Done,
    Paused,
    /// Cancelled or failed; `message` says which.
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Starting => "starting",
            Self::Downloading => "downloading",
            Self::Finished => "finished",
            Self::Done => "done",
            Self::Paused => "paused",
            Self::Error => "error",
        }
    }

    /// Statuses a new attempt may be started from.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Paused | Self::Error)
    }

    /// Statuses that only occur while an attempt is live.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Queued | Self::Starting | Self::Downloading | Self::Finished
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const MSG_PAUSED: &str = "Paused. You can resume.";
pub const MSG_CANCELLED: &str = "Download cancelled.";
pub const MSG_FINALIZING: &str = "Download finished. Finalizing...";

pub fn done_message(dest: &str) -> String {
    format!("Done. Saved to {}", dest)
}

/// Observable state of a job, serialized as-is to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub status: JobStatus,
    /// Percentage in `[0, 100]`.
    pub progress: f64,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    /// Bytes per second.
    pub speed: Option<f64>,
    /// Seconds remaining.
    pub eta: Option<u64>,
    pub filename: Option<String>,
    pub message: Option<String>,
    pub video_title: Option<String>,
    pub dest_path: String,
    pub source_url: String,
    pub selected_format: String,
    pub resumed: bool,
    /// Number of run attempts started.
    pub attempt: u32,
    pub updated_at: DateTime<Utc>,
}

impl ProgressSnapshot {
    pub fn new(
        source_url: impl Into<String>,
        selected_format: impl Into<String>,
        dest_path: impl Into<String>,
        video_title: Option<String>,
    ) -> Self {
        Self {
            status: JobStatus::Queued,
            progress: 0.0,
            downloaded_bytes: 0,
            total_bytes: None,
            speed: None,
            eta: None,
            filename: None,
            message: None,
            video_title,
            dest_path: dest_path.into(),
            source_url: source_url.into(),
            selected_format: selected_format.into(),
            resumed: false,
            attempt: 0,
            updated_at: Utc::now(),
        }
    }

    /// Reset the transfer fields at the start of an attempt.
    ///
    /// Byte counters survive a resume so the client does not see the bar
    /// jump back to zero before the engine reports again.
    pub fn begin_attempt(&mut self, resumed: bool) {
        self.status = JobStatus::Starting;
        self.progress = 0.0;
        self.speed = None;
        self.eta = None;
        self.message = None;
        self.resumed = resumed;
        self.attempt += 1;
        if !resumed {
            self.downloaded_bytes = 0;
            self.total_bytes = None;
            self.filename = None;
        }
    }
}

/// Pause and cancel requests for the live attempt.
#[derive(Debug, Default)]
pub struct ControlFlags {
    pause: AtomicBool,
    cancel: AtomicBool,
}

impl ControlFlags {
    pub fn request_pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn pause_requested(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn clear_pause(&self) {
        self.pause.store(false, Ordering::SeqCst);
    }

    pub fn clear_cancel(&self) {
        self.cancel.store(false, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.clear_pause();
        self.clear_cancel();
    }
}

/// Completion of a job's newest attempt task; any number of waiters can
/// await a clone.
pub type AttemptTask = Shared<BoxFuture<'static, ()>>;

/// Registry entry for one job.
///
/// Every field carries its own synchronization; nothing here is locked
/// across jobs.
pub struct JobEntry {
    id: JobId,
    snapshot: RwLock<ProgressSnapshot>,
    flags: ControlFlags,
    /// Attempt token; see [`AttemptGuard`].
    live: AtomicBool,
    /// Serializes pause requests with the release of the token.
    control: Mutex<()>,
    work_dir: Mutex<Option<PathBuf>>,
    task: Mutex<Option<AttemptTask>>,
    retired_at: Mutex<Option<Instant>>,
}

impl fmt::Debug for JobEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobEntry")
            .field("id", &self.id)
            .field("status", &self.snapshot.read().status)
            .field("live", &self.is_live())
            .field("work_dir", &*self.work_dir.lock())
            .finish()
    }
}

impl JobEntry {
    pub fn new(id: JobId, snapshot: ProgressSnapshot, work_dir: PathBuf) -> Self {
        Self {
            id,
            snapshot: RwLock::new(snapshot),
            flags: ControlFlags::default(),
            live: AtomicBool::new(false),
            control: Mutex::new(()),
            work_dir: Mutex::new(Some(work_dir)),
            task: Mutex::new(None),
            retired_at: Mutex::new(None),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn flags(&self) -> &ControlFlags {
        &self.flags
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot.read().clone()
    }

    pub fn status(&self) -> JobStatus {
        self.snapshot.read().status
    }

    /// Mutate the snapshot and bump `updated_at`.
    pub fn update<R>(&self, f: impl FnOnce(&mut ProgressSnapshot) -> R) -> R {
        let mut snapshot = self.snapshot.write();
        let result = f(&mut snapshot);
        snapshot.updated_at = Utc::now();
        result
    }

    pub fn set_status(&self, status: JobStatus) {
        self.update(|s| s.status = status);
    }

    pub fn work_dir(&self) -> Option<PathBuf> {
        self.work_dir.lock().clone()
    }

    /// Store the handle of the newest attempt, replacing the previous one.
    pub fn set_task(&self, handle: JoinHandle<()>) {
        let task = handle.map(|_| ()).boxed().shared();
        *self.task.lock() = Some(task);
    }

    /// The newest attempt task, if one was ever spawned. Stays stored after
    /// completion.
    pub fn task(&self) -> Option<AttemptTask> {
        self.task.lock().clone()
    }

    /// Set the pause flag if, and only if, an attempt is live.
    ///
    /// The token is released under the same lock after the flag is cleared,
    /// so a pause can never outlive the attempt it was meant for.
    pub fn request_pause_if_live(&self) -> bool {
        let _control = self.control.lock();
        if self.is_live() {
            self.flags.request_pause();
            true
        } else {
            false
        }
    }

    /// Whether an attempt currently holds the token.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Acquire the attempt token. Returns `None` while another attempt
    /// (or a teardown) holds it.
    pub fn try_begin_attempt(self: &Arc<Self>) -> Option<AttemptGuard> {
        self.live
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| AttemptGuard {
                entry: Arc::clone(self),
            })
    }

    /// Terminal success or cancel: forget the working directory and start
    /// the eviction clock. The snapshot stays readable.
    pub fn retire(&self) {
        *self.work_dir.lock() = None;
        let mut retired = self.retired_at.lock();
        if retired.is_none() {
            *retired = Some(Instant::now());
        }
    }

    pub fn is_retired(&self) -> bool {
        self.retired_at.lock().is_some()
    }

    /// Time since retirement, `None` if the job is not retired.
    pub fn retired_for(&self) -> Option<Duration> {
        self.retired_at.lock().map(|at| at.elapsed())
    }
}

/// Proof that the holder is the single live attempt of a job.
///
/// Dropping the guard clears the pause flag and releases the token.
#[derive(Debug)]
pub struct AttemptGuard {
    entry: Arc<JobEntry>,
}

impl AttemptGuard {
    pub fn entry(&self) -> &Arc<JobEntry> {
        &self.entry
    }
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        let _control = self.entry.control.lock();
        self.entry.flags.clear_pause();
        self.entry.live.store(false, Ordering::SeqCst);
    }
}
