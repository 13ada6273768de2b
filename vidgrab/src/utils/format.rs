//! Human-readable formatting for probe tables and log lines.

/// Format a duration in seconds as `HH:MM:SS`.
pub fn format_hhmmss(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}

/// Format a total bitrate (kbit/s) for the format table, `-` when unknown.
pub fn format_kbps(tbr: Option<f64>) -> String {
    match tbr {
        Some(v) if v > 0.0 => format!("{} kb/s", v.round() as u64),
        _ => "-".to_string(),
    }
}
