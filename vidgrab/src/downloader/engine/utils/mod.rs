//! Utility modules for download engines.

mod output_tail;
mod progress_parser;

pub use output_tail::{OutputTail, for_each_line, last_error_line};
pub use progress_parser::{PROGRESS_PREFIX, parse_progress_line, progress_template};
