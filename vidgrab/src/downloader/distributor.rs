//! Progress distributor: periodic snapshot push to one observer.
//!
//! Each observer gets its own loop. The loop only reads snapshots, so any
//! number of observers can watch the same job.

use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::job::ProgressSnapshot;
use super::manager::DownloadManager;

pub const NOT_FOUND_MESSAGE: &str = "job_id not found";

/// One message pushed to an observer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProgressFrame {
    Snapshot(ProgressSnapshot),
    NotFound { error: &'static str },
}

impl ProgressFrame {
    pub fn not_found() -> Self {
        Self::NotFound {
            error: NOT_FOUND_MESSAGE,
        }
    }
}

/// Current frame for `job_key`, which may be any client-supplied string.
pub fn frame_for(manager: &DownloadManager, job_key: &str) -> ProgressFrame {
    manager
        .try_snapshot(job_key)
        .map(ProgressFrame::Snapshot)
        .unwrap_or_else(ProgressFrame::not_found)
}

/// Push a frame every `interval` until the sink fails or `cancel` fires.
///
/// An unknown job is not an error: the observer keeps receiving not-found
/// frames, so it can attach before the job exists.
pub async fn run<S>(
    manager: Arc<DownloadManager>,
    job_key: String,
    interval: Duration,
    mut sink: S,
    cancel: CancellationToken,
) where
    S: Sink<ProgressFrame> + Unpin,
    S::Error: std::fmt::Display,
{
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(job_key = %job_key, "Observer cancelled");
                break;
            }
            _ = ticker.tick() => {
                let frame = frame_for(&manager, &job_key);
                if let Err(e) = sink.send(frame).await {
                    debug!(job_key = %job_key, error = %e, "Observer gone");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::engine::{
        Checkpoint, DownloadEngine, DownloadRequest, EngineError, ProbeInfo,
    };
    use crate::downloader::manager::DownloadManagerConfig;
    use futures::StreamExt;
    use futures::channel::mpsc;

    struct IdleEngine;

    impl DownloadEngine for IdleEngine {
        fn name(&self) -> &'static str {
            "idle"
        }

        fn probe(&self, _url: &str) -> Result<ProbeInfo, EngineError> {
            Ok(ProbeInfo::default())
        }

        fn download(
            &self,
            _request: &DownloadRequest,
            _checkpoint: &dyn Checkpoint,
        ) -> Result<(), EngineError> {
            Ok(())
        }

        fn is_available(&self) -> bool {
            true
        }

        fn version(&self) -> Option<String> {
            None
        }
    }

    fn manager() -> Arc<DownloadManager> {
        Arc::new(DownloadManager::new(
            DownloadManagerConfig::default(),
            Arc::new(IdleEngine),
        ))
    }

    #[test]
    fn test_not_found_frame_json() {
        let json = serde_json::to_string(&ProgressFrame::not_found()).unwrap();
        assert_eq!(json, r#"{"error":"job_id not found"}"#);
    }

    #[tokio::test]
    async fn test_pushes_frames_until_cancelled() {
        let (tx, mut rx) = mpsc::unbounded::<ProgressFrame>();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            manager(),
            "missing".to_string(),
            Duration::from_millis(10),
            tx,
            cancel.clone(),
        ));

        for _ in 0..3 {
            assert_eq!(rx.next().await, Some(ProgressFrame::not_found()));
        }
        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stops_when_observer_leaves() {
        let (tx, rx) = mpsc::unbounded::<ProgressFrame>();
        drop(rx);
        let task = tokio::spawn(run(
            manager(),
            "missing".to_string(),
            Duration::from_millis(10),
            tx,
            CancellationToken::new(),
        ));
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
