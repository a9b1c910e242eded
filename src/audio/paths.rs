//! Segment file naming
//!
//! Every segment gets `<UTC timestamp>_<uuid>.<ext>` inside the recordings
//! directory, so a merge source can never collide with its destination.

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::format::OutputFormat;

/// Generator of fresh file paths inside one recordings directory
#[derive(Debug, Clone)]
pub struct SegmentPaths {
    dir: PathBuf,
    format: OutputFormat,
}

impl SegmentPaths {
    pub fn new(dir: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the recordings directory if it doesn't exist
    pub fn ensure_dir(&self) -> std::io::Result<&Path> {
        fs::create_dir_all(&self.dir)?;
        Ok(&self.dir)
    }

    /// A path that does not exist yet
    pub fn next_path(&self) -> PathBuf {
        loop {
            let filename = format!(
                "{}_{}.{}",
                Utc::now().format("%Y%m%dT%H%M%S"),
                Uuid::new_v4(),
                self.format.extension()
            );
            let candidate = self.dir.join(filename);
            if !candidate.exists() {
                return candidate;
            }
        }
    }
}
