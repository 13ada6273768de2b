//! Job runner: one download attempt from slot acquisition to final state.
//!
//! The runner owns the attempt token for its whole lifetime. It drives the
//! blocking engine call on the blocking pool, watches for stalls, classifies
//! the outcome and applies exactly one terminal transition.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::checkpoint::{Heartbeat, JobCheckpoint};
use super::engine::{DownloadEngine, DownloadRequest, EngineError, InterruptReason};
use super::job::{AttemptGuard, JobEntry, JobStatus, MSG_CANCELLED, MSG_PAUSED, done_message};
use crate::utils::fs::{
    ensure_dir_all_with_op, list_visible_files, move_file, remove_dir_all_quiet,
};

/// Why an attempt did not end in `done`.
///
/// Failures never reach callers of the control API; they end up in the
/// job's snapshot message.
#[derive(Debug, Error)]
pub enum JobFailure {
    #[error("Download cancelled by user")]
    UserCancelled,

    #[error("Download paused by user")]
    UserPaused,

    #[error("No output files found in {}", .0.display())]
    NoOutput(PathBuf),

    #[error("Failed to move downloaded files: {0}")]
    Relocation(#[source] crate::Error),

    #[error("Download stalled: no progress for {0} seconds")]
    Stalled(u64),

    #[error("{0}")]
    Engine(#[source] EngineError),

    #[error("Download worker failed: {0}")]
    Worker(String),

    #[error("{0}")]
    Setup(#[source] crate::Error),
}

impl From<EngineError> for JobFailure {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Interrupted(InterruptReason::Cancelled) => Self::UserCancelled,
            EngineError::Interrupted(InterruptReason::Paused) => Self::UserPaused,
            other => Self::Engine(other),
        }
    }
}

/// Shared, per-manager state every attempt needs.
pub struct RunnerContext {
    pub engine: Arc<dyn DownloadEngine>,
    /// Global concurrency limit across jobs.
    pub slots: Arc<Semaphore>,
    /// `None` disables the stall watchdog.
    pub stall_timeout: Option<Duration>,
}

impl RunnerContext {
    fn watchdog_period(&self) -> Option<Duration> {
        self.stall_timeout
            .map(|t| (t / 4).clamp(Duration::from_millis(10), Duration::from_secs(1)))
    }
}

/// Run one attempt of the job owning `guard`.
///
/// The token is released when this future completes, after the engine call
/// has returned.
pub async fn run_attempt(ctx: Arc<RunnerContext>, guard: AttemptGuard, resume: bool) {
    let entry = Arc::clone(guard.entry());
    let job_id = entry.id();

    entry.set_status(JobStatus::Queued);
    let permit = match Arc::clone(&ctx.slots).acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => {
            error!(job_id = %job_id, error = %e, "Download slots closed");
            finalize_failure(&entry, JobFailure::Worker(e.to_string())).await;
            return;
        }
    };

    let outcome = if entry.flags().cancel_requested() {
        Err(JobFailure::UserCancelled)
    } else if entry.flags().pause_requested() {
        Err(JobFailure::UserPaused)
    } else {
        execute(&ctx, &entry, resume).await
    };

    match outcome {
        Ok(dest) => info!(job_id = %job_id, dest = %dest, "Download complete"),
        Err(failure) => finalize_failure(&entry, failure).await,
    }

    drop(permit);
    debug!(job_id = %job_id, "Attempt finished");
    drop(guard);

    // A cancel that arrived after the outcome was classified found the
    // token still taken; nobody else will act on it.
    if entry.flags().cancel_requested() {
        cancel_if_idle(&entry).await;
    }
}

/// Tear down a job with a pending cancel if no attempt is live.
///
/// Returns `false` when an attempt holds the token; that attempt will
/// observe the cancel flag itself.
pub(crate) async fn cancel_if_idle(entry: &Arc<JobEntry>) -> bool {
    let Some(guard) = entry.try_begin_attempt() else {
        return false;
    };
    if entry.is_retired() {
        entry.flags().clear_cancel();
    } else if entry.flags().cancel_requested() {
        info!(job_id = %entry.id(), "Cancelling idle job");
        teardown_cancelled(entry).await;
    }
    drop(guard);
    true
}

async fn execute(
    ctx: &RunnerContext,
    entry: &Arc<JobEntry>,
    resume: bool,
) -> Result<String, JobFailure> {
    let job_id = entry.id();

    let (url, selector, dest) = entry.update(|s| {
        s.begin_attempt(resume);
        (
            s.source_url.clone(),
            s.selected_format.clone(),
            s.dest_path.clone(),
        )
    });
    info!(
        job_id = %job_id,
        url = %url,
        format = %selector,
        resume,
        "Starting download attempt"
    );

    let work_dir = entry.work_dir().ok_or_else(|| {
        JobFailure::Setup(crate::Error::invalid_state("job has no working directory"))
    })?;
    ensure_dir_all_with_op("creating working directory", &work_dir)
        .await
        .map_err(JobFailure::Setup)?;

    download(ctx, entry, &url, &selector, &work_dir, resume).await?;

    relocate(&work_dir, Path::new(&dest)).await?;

    entry.update(|s| {
        s.status = JobStatus::Done;
        s.progress = 100.0;
        s.speed = None;
        s.eta = None;
        s.message = Some(done_message(&dest));
    });
    remove_dir_all_quiet(&work_dir).await;
    entry.flags().reset();
    entry.retire();

    Ok(dest)
}

/// Run the blocking engine call under the stall watchdog.
async fn download(
    ctx: &RunnerContext,
    entry: &Arc<JobEntry>,
    url: &str,
    selector: &str,
    work_dir: &Path,
    resume: bool,
) -> Result<(), JobFailure> {
    let heartbeat = Arc::new(Heartbeat::new());
    let abort = CancellationToken::new();
    let request = DownloadRequest::new(url, selector, work_dir)
        .with_resume(resume)
        .with_abort(abort.clone());
    let checkpoint = JobCheckpoint::new(Arc::clone(entry), Arc::clone(&heartbeat), abort.clone());
    let engine = Arc::clone(&ctx.engine);

    let mut handle =
        tokio::task::spawn_blocking(move || engine.download(&request, &checkpoint));

    let (Some(timeout), Some(period)) = (ctx.stall_timeout, ctx.watchdog_period()) else {
        return classify(handle.await);
    };

    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            result = &mut handle => return classify(result),
            _ = ticker.tick() => {
                if heartbeat.elapsed() < timeout {
                    continue;
                }
                warn!(
                    job_id = %entry.id(),
                    timeout_secs = timeout.as_secs(),
                    "No progress within stall timeout, aborting engine"
                );
                abort.cancel();

                // Observers learn about the stall now; the engine may take
                // a while to notice the abort.
                let failure = JobFailure::Stalled(timeout.as_secs());
                mark_failed(entry, &failure);

                // The token must stay held until the engine call is gone.
                if let Err(e) = handle.await {
                    error!(job_id = %entry.id(), error = %e, "Download worker failed after stall");
                }
                return Err(failure);
            }
        }
    }
}

fn classify(
    result: std::result::Result<std::result::Result<(), EngineError>, tokio::task::JoinError>,
) -> Result<(), JobFailure> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(JobFailure::Worker(e.to_string())),
    }
}

/// Move every visible file from `work_dir` into `dest`.
async fn relocate(work_dir: &Path, dest: &Path) -> Result<Vec<PathBuf>, JobFailure> {
    let files = list_visible_files(work_dir)
        .await
        .map_err(JobFailure::Relocation)?;
    if files.is_empty() {
        return Err(JobFailure::NoOutput(work_dir.to_path_buf()));
    }

    ensure_dir_all_with_op("creating destination directory", dest)
        .await
        .map_err(JobFailure::Relocation)?;

    let mut moved = Vec::with_capacity(files.len());
    for file in files {
        let Some(name) = file.file_name() else {
            continue;
        };
        let target = dest.join(name);
        move_file(&file, &target)
            .await
            .map_err(JobFailure::Relocation)?;
        debug!(src = %file.display(), dest = %target.display(), "Moved output file");
        moved.push(target);
    }
    Ok(moved)
}

/// Apply the terminal transition for a failed attempt.
///
/// A pending cancel request wins over a pause or a fault.
async fn finalize_failure(entry: &Arc<JobEntry>, failure: JobFailure) {
    let job_id = entry.id();

    if entry.flags().cancel_requested() || matches!(failure, JobFailure::UserCancelled) {
        info!(job_id = %job_id, "Download cancelled");
        teardown_cancelled(entry).await;
        return;
    }

    match failure {
        JobFailure::UserPaused => {
            info!(job_id = %job_id, "Download paused");
            entry.update(|s| {
                s.status = JobStatus::Paused;
                s.speed = None;
                s.eta = None;
                s.message = Some(MSG_PAUSED.to_string());
            });
        }
        failure => {
            error!(job_id = %job_id, error = %failure, "Download failed");
            mark_failed(entry, &failure);
        }
    }
}

fn mark_failed(entry: &JobEntry, failure: &JobFailure) {
    entry.update(|s| {
        s.status = JobStatus::Error;
        s.speed = None;
        s.eta = None;
        s.message = Some(failure.to_string());
    });
}

/// Cancel path: discard partial output, record the cancel and retire the job.
///
/// The caller must hold the job's attempt token.
pub(crate) async fn teardown_cancelled(entry: &Arc<JobEntry>) {
    if let Some(dir) = entry.work_dir() {
        remove_dir_all_quiet(&dir).await;
    }
    entry.update(|s| {
        s.status = JobStatus::Error;
        s.speed = None;
        s.eta = None;
        s.message = Some(MSG_CANCELLED.to_string());
    });
    entry.flags().reset();
    entry.retire();
}
