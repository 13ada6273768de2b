//! yt-dlp progress output parsing.
//!
//! The engine asks yt-dlp to print one machine-readable line per progress
//! hook call using `--progress-template`. Fields are `|`-separated and
//! missing values are printed as `NA`.

use crate::downloader::engine::ProgressEvent;

/// Marker that prefixes every templated progress line.
pub const PROGRESS_PREFIX: &str = "[vidgrab]";

/// Template passed to `--progress-template`.
///
/// Keep the field order in sync with [`parse_progress_line`]. The filename
/// goes last so a `|` inside it cannot shift the other fields.
pub fn progress_template() -> String {
    format!(
        "download:{} %(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress.eta)s|%(progress.filename)s",
        PROGRESS_PREFIX
    )
}

/// Parse an optional numeric field. yt-dlp prints integers for some
/// counters and floats for estimates, so everything goes through `f64`.
fn parse_number(field: &str) -> Option<f64> {
    let field = field.trim();
    if field.is_empty() || field == "NA" || field == "None" {
        return None;
    }
    field.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

fn parse_count(field: &str) -> Option<u64> {
    parse_number(field).map(|v| v.round() as u64)
}

fn parse_text(field: &str) -> Option<String> {
    let field = field.trim();
    if field.is_empty() || field == "NA" {
        None
    } else {
        Some(field.to_string())
    }
}

/// Parse one line of yt-dlp stdout.
///
/// # Returns
/// * `Some(ProgressEvent)` - for templated `downloading`/`finished` lines
/// * `None` - for any other output (including `error` progress lines, which
///   are reported through the process exit status instead)
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let body = line.trim().strip_prefix(PROGRESS_PREFIX)?.trim_start();
    let mut fields = body.splitn(7, '|');

    let status = fields.next()?.trim();
    let downloaded = fields.next().and_then(parse_count);
    let total = fields.next().and_then(parse_count);
    let estimate = fields.next().and_then(parse_count);
    let speed = fields.next().and_then(parse_number);
    let eta = fields.next().and_then(parse_count);
    let filename = fields.next().and_then(parse_text);

    match status {
        "downloading" => Some(ProgressEvent::Downloading {
            downloaded_bytes: downloaded.unwrap_or(0),
            total_bytes: total,
            total_bytes_estimate: estimate,
            speed,
            eta,
            filename,
        }),
        "finished" => Some(ProgressEvent::Finished { filename }),
        _ => None,
    }
}
