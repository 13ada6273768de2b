//! Format selection for probe tables and download selectors.
//!
//! The probe table offers only video-only formats; at start time the chosen
//! video format is paired with an audio-only format so the engine merges
//! both into one file.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::engine::{FormatDescriptor, ProbeInfo};
use crate::utils::format::{format_hhmmss, format_kbps};

/// Preferences for building the probe table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatSelectionConfig {
    /// Container extensions offered to the user (case-sensitive, as
    /// reported by the engine).
    pub allowed_video_exts: Vec<String>,
}

impl Default for FormatSelectionConfig {
    fn default() -> Self {
        Self {
            allowed_video_exts: ["mp4", "webm", "mkv", "m3u8", "mov"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// One row of the probe table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableFormat {
    pub format_id: String,
    pub ext: Option<String>,
    /// `"{height}p{fps}"`, e.g. `1080p30`; `-p` when the height is unknown.
    pub resolution: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    pub tbr: Option<f64>,
    /// Bitrate label, e.g. `4400 kb/s`, or `-`.
    pub kbps: String,
    pub filesize: Option<u64>,
    pub acodec: Option<String>,
    pub vcodec: Option<String>,
}

impl From<&FormatDescriptor> for TableFormat {
    fn from(f: &FormatDescriptor) -> Self {
        let fps = f.fps.filter(|v| *v > 0.0).map(|v| v.round() as u32);
        let mut resolution = match f.height {
            Some(h) if h > 0 => format!("{}p", h),
            _ => "-p".to_string(),
        };
        if let Some(fps) = fps {
            resolution.push_str(&fps.to_string());
        }

        Self {
            format_id: f.format_id.clone(),
            ext: f.ext.clone(),
            resolution,
            width: f.width,
            height: f.height,
            fps,
            tbr: f.tbr,
            kbps: format_kbps(f.tbr),
            filesize: f.filesize,
            acodec: f.acodec.clone(),
            vcodec: f.vcodec.clone(),
        }
    }
}

/// Probe result as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResponse {
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub thumbnail: Option<String>,
    /// `HH:MM:SS`.
    pub duration: Option<String>,
    /// Every format the engine reported.
    pub all_formats_raw: Vec<FormatDescriptor>,
    /// Video-only formats, best first.
    pub table_formats: Vec<TableFormat>,
}

/// Filters and orders formats.
#[derive(Debug, Clone, Default)]
pub struct StreamSelector {
    config: FormatSelectionConfig,
}

impl StreamSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FormatSelectionConfig) -> Self {
        Self { config }
    }

    fn ext_allowed(&self, format: &FormatDescriptor) -> bool {
        format
            .ext
            .as_deref()
            .is_some_and(|ext| self.config.allowed_video_exts.iter().any(|a| a == ext))
    }

    /// Video-only formats with an allowed extension, sorted by height then
    /// bitrate, highest first.
    pub fn table_formats(&self, formats: &[FormatDescriptor]) -> Vec<TableFormat> {
        let mut candidates: Vec<&FormatDescriptor> = formats
            .iter()
            .filter(|f| f.is_video_only() && self.ext_allowed(f))
            .collect();

        candidates.sort_by(|a, b| compare_quality(b, a));
        candidates.into_iter().map(TableFormat::from).collect()
    }

    /// Build the client-facing probe result.
    pub fn probe_response(&self, info: ProbeInfo) -> ProbeResponse {
        let table_formats = self.table_formats(&info.formats);
        ProbeResponse {
            title: info.title,
            uploader: info.uploader,
            thumbnail: info.thumbnail,
            duration: info.duration.map(format_hhmmss),
            all_formats_raw: info.formats,
            table_formats,
        }
    }
}

fn compare_quality(a: &FormatDescriptor, b: &FormatDescriptor) -> Ordering {
    a.height
        .unwrap_or(0)
        .cmp(&b.height.unwrap_or(0))
        .then_with(|| {
            a.tbr
                .unwrap_or(0.0)
                .partial_cmp(&b.tbr.unwrap_or(0.0))
                .unwrap_or(Ordering::Equal)
        })
}

/// The audio-only format with the lexicographically smallest identifier.
pub fn pick_best_audio(formats: &[FormatDescriptor]) -> Option<&str> {
    let chosen = formats
        .iter()
        .filter(|f| f.audio_only)
        .map(|f| f.format_id.as_str())
        .min();

    match chosen {
        Some(id) => debug!(format_id = %id, "Selected audio format"),
        None => debug!("No audio-only formats available"),
    }
    chosen
}

/// `video+audio` when an audio-only format exists, else the bare video id.
pub fn compose_selector(video_format_id: &str, formats: &[FormatDescriptor]) -> String {
    match pick_best_audio(formats) {
        Some(audio) => format!("{}+{}", video_format_id, audio),
        None => video_format_id.to_string(),
    }
}
