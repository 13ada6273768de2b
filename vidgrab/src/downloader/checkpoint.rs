//! The checkpoint a running engine calls for every progress event.
//!
//! This is the only place the blocking transfer and the job's control
//! flags meet: the checkpoint reads the flags and either merges the event
//! into the snapshot or tells the engine to stop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::engine::{Checkpoint, Interrupt, ProgressEvent};
use super::job::{JobEntry, JobStatus, MSG_FINALIZING};

/// Last time the engine showed signs of life.
#[derive(Debug)]
pub struct Heartbeat(Mutex<Instant>);

impl Heartbeat {
    pub fn new() -> Self {
        Self(Mutex::new(Instant::now()))
    }

    pub fn beat(&self) {
        *self.0.lock() = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.0.lock().elapsed()
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

/// Checkpoint bound to one job attempt.
pub struct JobCheckpoint {
    entry: Arc<JobEntry>,
    heartbeat: Arc<Heartbeat>,
    /// Once fired, late events from the engine are dropped.
    abort: CancellationToken,
}

impl JobCheckpoint {
    pub fn new(entry: Arc<JobEntry>, heartbeat: Arc<Heartbeat>, abort: CancellationToken) -> Self {
        Self {
            entry,
            heartbeat,
            abort,
        }
    }

    fn merge(&self, event: ProgressEvent) {
        self.entry.update(|s| match event {
            ProgressEvent::Downloading {
                downloaded_bytes,
                total_bytes,
                total_bytes_estimate,
                speed,
                eta,
                filename,
            } => {
                let total = total_bytes.or(total_bytes_estimate).filter(|t| *t > 0);
                s.status = JobStatus::Downloading;
                s.downloaded_bytes = downloaded_bytes;
                s.total_bytes = total;
                s.progress = match total {
                    Some(total) => (downloaded_bytes as f64 / total as f64 * 100.0).clamp(0.0, 100.0),
                    None => 0.0,
                };
                s.speed = speed;
                s.eta = eta;
                if filename.is_some() {
                    s.filename = filename;
                }
                s.message = None;
            }
            ProgressEvent::Finished { filename } => {
                s.status = JobStatus::Finished;
                s.progress = 100.0;
                s.speed = None;
                s.eta = None;
                if filename.is_some() {
                    s.filename = filename;
                }
                s.message = Some(MSG_FINALIZING.to_string());
            }
        });
    }
}

impl Checkpoint for JobCheckpoint {
    fn report(&self, event: ProgressEvent) -> Result<(), Interrupt> {
        if self.abort.is_cancelled() {
            return Err(Interrupt::aborted());
        }
        self.heartbeat.beat();

        let flags = self.entry.flags();
        if flags.cancel_requested() {
            return Err(Interrupt::cancelled());
        }
        if flags.pause_requested() {
            return Err(Interrupt::paused());
        }

        self.merge(event);
        Ok(())
    }
}
