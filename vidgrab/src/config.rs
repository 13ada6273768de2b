//! Application configuration.
//!
//! Defaults are overridden by environment variables (a `.env` file is
//! loaded by `main` first). Values that fail to parse are logged and the
//! default is kept.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::server::ApiServerConfig;
use crate::downloader::{DownloadManagerConfig, YtDlpEngineConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// `API_BIND_ADDRESS`
    pub bind_address: String,
    /// `API_PORT`
    pub port: u16,
    /// `DOWNLOADS_DIR`: parent of the per-job working directories.
    pub downloads_dir: PathBuf,
    /// `LOG_DIR`
    pub log_dir: PathBuf,
    /// `YTDLP_PATH`
    pub ytdlp_path: String,
    /// `MAX_CONCURRENT_DOWNLOADS`
    pub max_concurrent_downloads: usize,
    /// `PROGRESS_INTERVAL_MS`: push period of the progress channel.
    pub progress_interval_ms: u64,
    /// `STALL_TIMEOUT_SECS` (0 disables the watchdog)
    pub stall_timeout_secs: u64,
    /// `JOB_RETENTION_SECS`
    pub job_retention_secs: u64,
    /// `CONCURRENT_FRAGMENTS`
    pub concurrent_fragments: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8000,
            downloads_dir: PathBuf::from("./downloads"),
            log_dir: PathBuf::from("./logs"),
            ytdlp_path: "yt-dlp".to_string(),
            max_concurrent_downloads: 3,
            progress_interval_ms: 500,
            stall_timeout_secs: 300,
            job_retention_secs: 3600,
            concurrent_fragments: 4,
        }
    }
}

/// Parse `key` with `lookup`, warning (and returning `None`) on bad input.
fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key = %key, value = %raw, error = %e, "Ignoring invalid configuration value");
            None
        }
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl AppConfig {
    /// Load from the process environment, falling back to defaults.
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key/value source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(bind_address) = non_empty(&lookup, "API_BIND_ADDRESS") {
            config.bind_address = bind_address;
        }
        if let Some(port) = parse_var(&lookup, "API_PORT") {
            config.port = port;
        }
        if let Some(dir) = non_empty(&lookup, "DOWNLOADS_DIR") {
            config.downloads_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty(&lookup, "LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }
        if let Some(path) = non_empty(&lookup, "YTDLP_PATH") {
            config.ytdlp_path = path;
        }
        if let Some(max) = parse_var::<usize, _>(&lookup, "MAX_CONCURRENT_DOWNLOADS")
            && max > 0
        {
            config.max_concurrent_downloads = max;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "PROGRESS_INTERVAL_MS")
            && ms > 0
        {
            config.progress_interval_ms = ms;
        }
        if let Some(secs) = parse_var(&lookup, "STALL_TIMEOUT_SECS") {
            config.stall_timeout_secs = secs;
        }
        if let Some(secs) = parse_var(&lookup, "JOB_RETENTION_SECS") {
            config.job_retention_secs = secs;
        }
        if let Some(n) = parse_var::<u32, _>(&lookup, "CONCURRENT_FRAGMENTS")
            && n > 0
        {
            config.concurrent_fragments = n;
        }

        config
    }

    pub fn server_config(&self) -> ApiServerConfig {
        ApiServerConfig {
            bind_address: self.bind_address.clone(),
            port: self.port,
            ..Default::default()
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn manager_config(&self) -> DownloadManagerConfig {
        DownloadManagerConfig {
            downloads_dir: self.downloads_dir.clone(),
            max_concurrent_downloads: self.max_concurrent_downloads,
            stall_timeout_secs: self.stall_timeout_secs,
            job_retention_secs: self.job_retention_secs,
            ..Default::default()
        }
    }

    pub fn engine_config(&self) -> YtDlpEngineConfig {
        YtDlpEngineConfig {
            binary_path: self.ytdlp_path.clone(),
            concurrent_fragments: self.concurrent_fragments,
            ..Default::default()
        }
    }
}
