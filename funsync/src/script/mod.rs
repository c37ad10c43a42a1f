//! Funscript loading and timeline indexing
//!
//! A funscript is a JSON document carrying a sparse list of timed target
//! positions ("actions") authored against a specific video. This module
//! parses the document and builds the sorted [`ActionTimeline`] index used
//! during playback.

pub mod timeline;

pub use timeline::ActionTimeline;

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// One scripted action: a target position at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Action {
    /// Timestamp in milliseconds from the start of the video
    pub at: i64,
    /// Target position in percent: 0 (bottom) to 100 (top)
    pub pos: u8,
}

/// Top-level funscript document
///
/// Only the action list is used; metadata fields (`inverted`, `range`,
/// authoring tool tags) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Funscript {
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// Derive the script path for a video file
///
/// The convention is the video's own path with its extension replaced by
/// `.funscript` (e.g. `movie.mp4` -> `movie.funscript`).
pub fn script_path_for(video: &Path) -> PathBuf {
    video.with_extension("funscript")
}

/// Load and parse a funscript file
///
/// Missing or malformed files are reported with the offending path so the
/// error is actionable before any playback starts.
pub fn load_script(path: &Path) -> Result<Funscript> {
    if !path.exists() {
        return Err(Error::Script(format!(
            "script file not found: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Script(format!("cannot parse {}: {}", path.display(), e)))
}
