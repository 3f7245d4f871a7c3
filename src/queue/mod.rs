//! Local queue of numbered Markdown work items
//!
//! Work items live in one directory as `<NNN>-<slug>.md`. The numeric prefix
//! defines the order in which they are promoted to the tracker.

mod parse;

pub use parse::{extract_sequence_number, parse_labels, sequence_from_filename, split_title_body};

use crate::error::{Error, Result};
use crate::types::WorkItem;
use std::collections::HashSet;
use std::fs;
use std::hash::BuildHasher;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Reads work items from a directory
#[derive(Debug, Clone)]
pub struct QueueReader {
    dir: PathBuf,
}

impl QueueReader {
    /// Create a reader for `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory being read
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All work items, ordered by sequence number ascending
    ///
    /// Files without a positive numeric prefix or `.md` extension are
    /// ignored. Files that cannot be parsed are logged and skipped.
    pub fn list_pending_items(&self) -> Result<Vec<WorkItem>> {
        if !self.dir.is_dir() {
            return Err(Error::QueueDirNotFound(self.dir.clone()));
        }

        let mut items = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != "md") {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(sequence_number) = sequence_from_filename(filename) else {
                debug!(filename, "skipping file without numeric prefix");
                continue;
            };
            match read_work_item(&path, filename, sequence_number) {
                Ok(item) => items.push(item),
                Err(Error::InvalidWorkItem { path, reason }) => {
                    warn!(path = %path.display(), %reason, "skipping invalid work item");
                }
                Err(e) => return Err(e),
            }
        }

        items.sort_by(|a, b| {
            a.sequence_number
                .cmp(&b.sequence_number)
                .then_with(|| a.filename.cmp(&b.filename))
        });
        debug!(dir = %self.dir.display(), count = items.len(), "listed work items");
        Ok(items)
    }

    /// First work item whose filename is not in `recorded`
    pub fn next_unprocessed<S: BuildHasher>(
        &self,
        recorded: &HashSet<String, S>,
    ) -> Result<Option<WorkItem>> {
        Ok(self
            .list_pending_items()?
            .into_iter()
            .find(|item| !recorded.contains(&item.filename)))
    }
}

fn read_work_item(path: &Path, filename: &str, sequence_number: u32) -> Result<WorkItem> {
    let content = fs::read_to_string(path)?;
    let (title, body) = split_title_body(&content).ok_or_else(|| Error::InvalidWorkItem {
        path: path.to_path_buf(),
        reason: "file is empty".to_string(),
    })?;

    Ok(WorkItem {
        sequence_number,
        filename: filename.to_string(),
        title,
        body,
        labels: parse_labels(&content),
    })
}
