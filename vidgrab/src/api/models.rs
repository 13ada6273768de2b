//! API request and response types.

use serde::{Deserialize, Serialize};

use crate::downloader::{JobId, ProgressSnapshot};

/// `GET /api/probe` query.
#[derive(Debug, Deserialize)]
pub struct ProbeQuery {
    #[serde(default)]
    pub url: String,
}

/// `POST /api/start_download` body.
///
/// Missing fields deserialize as empty and are rejected by validation.
#[derive(Debug, Deserialize)]
pub struct StartDownloadRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub format_id: String,
    #[serde(default)]
    pub dest_path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartDownloadResponse {
    pub job_id: String,
}

/// Body of pause, resume and cancel requests.
#[derive(Debug, Deserialize)]
pub struct JobControlRequest {
    #[serde(default)]
    pub job_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// One entry of `GET /api/jobs`.
#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub job_id: JobId,
    #[serde(flatten)]
    pub snapshot: ProgressSnapshot,
}

#[derive(Debug, Serialize)]
pub struct EngineHealth {
    pub name: String,
    pub available: bool,
    pub version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub jobs: usize,
    pub engine: EngineHealth,
}

/// Request to update the log filter.
#[derive(Debug, Deserialize)]
pub struct UpdateLogFilterRequest {
    pub filter: String,
}

/// Response for logging configuration.
#[derive(Debug, Serialize)]
pub struct LoggingConfigResponse {
    pub filter: String,
    pub available_modules: Vec<ModuleInfo>,
}

/// Information about an available logging module.
#[derive(Debug, Serialize)]
pub struct ModuleInfo {
    pub name: String,
    pub description: String,
}
