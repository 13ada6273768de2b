//! Download job orchestration.
//!
//! - [`manager::DownloadManager`] is the control API (start, pause, resume,
//!   cancel, probe).
//! - [`runner`] executes one attempt of a job on top of a blocking
//!   [`engine::DownloadEngine`].
//! - [`checkpoint`] is the bridge the engine calls back into.
//! - [`distributor`] streams snapshots to observers.

pub mod checkpoint;
pub mod distributor;
pub mod engine;
pub mod job;
pub mod manager;
pub mod registry;
pub mod runner;
pub mod stream_selector;

pub use distributor::ProgressFrame;
pub use engine::{DownloadEngine, YtDlpEngine, YtDlpEngineConfig};
pub use job::{JobId, JobStatus, ProgressSnapshot};
pub use manager::{DownloadManager, DownloadManagerConfig};
pub use stream_selector::{ProbeResponse, TableFormat};
