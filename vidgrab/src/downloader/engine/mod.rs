//! Download engine abstraction and implementations.
//!
//! Engines are blocking: callers run them on the blocking thread pool and
//! talk back to the job only through the [`Checkpoint`] they pass in.

mod traits;
pub mod utils;
mod ytdlp;

pub use traits::{
    Checkpoint, DownloadEngine, DownloadRequest, EngineError, FormatDescriptor, Interrupt,
    InterruptReason, ProbeInfo, ProgressEvent,
};
pub use ytdlp::{YtDlpEngine, YtDlpEngineConfig, parse_probe_output};
