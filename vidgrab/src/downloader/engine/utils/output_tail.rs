//! Bounded capture of a child process's diagnostic output.
//!
//! yt-dlp reports failures on stderr. The stream is drained on a helper
//! thread (so the child never blocks on a full pipe) and only the last lines
//! are kept for the error message.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::thread::JoinHandle;

use tracing::debug;

/// Feed every line of `reader` to `f` until the stream ends, a read
/// fails, or `f` returns `false`.
///
/// Bytes that are not valid UTF-8 are replaced rather than ending the
/// stream: yt-dlp prints titles and filenames in whatever encoding the
/// console uses, and a reader that stops early leaves the child blocked on
/// a full pipe.
pub fn for_each_line<R: Read>(reader: R, mut f: impl FnMut(String) -> bool) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                if !f(line.trim_end_matches(['\r', '\n']).to_string()) {
                    break;
                }
            }
        }
    }
}

/// Collects the last `capacity` lines of a stream on a background thread.
pub struct OutputTail {
    handle: JoinHandle<VecDeque<String>>,
}

impl OutputTail {
    pub fn spawn<R>(reader: R, capacity: usize) -> Self
    where
        R: Read + Send + 'static,
    {
        let handle = std::thread::spawn(move || {
            let mut lines = VecDeque::with_capacity(capacity);
            for_each_line(reader, |line| {
                debug!(target: "vidgrab::engine::stderr", "{}", line);
                if lines.len() == capacity {
                    lines.pop_front();
                }
                lines.push_back(line);
                true
            });
            lines
        });
        Self { handle }
    }

    /// Wait for the stream to close and return the captured lines.
    pub fn finish(self) -> Vec<String> {
        self.handle
            .join()
            .map(|lines| lines.into_iter().collect())
            .unwrap_or_default()
    }
}

/// Pick the most useful error description from captured output: the last
/// `ERROR:` line, otherwise the last non-empty line.
pub fn last_error_line(lines: &[String]) -> Option<String> {
    lines
        .iter()
        .rev()
        .find_map(|l| l.trim().strip_prefix("ERROR:").map(|m| m.trim().to_string()))
        .or_else(|| {
            lines
                .iter()
                .rev()
                .map(|l| l.trim())
                .find(|l| !l.is_empty())
                .map(str::to_string)
        })
}
