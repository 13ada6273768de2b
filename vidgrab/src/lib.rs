//! vidgrab library crate.
//!
//! Runs video downloads as background jobs that can be paused, resumed and
//! cancelled while clients watch their progress live.

pub mod api;
pub mod config;
pub mod downloader;
pub mod error;
pub mod logging;
pub mod utils;

pub use error::{Error, Result};
