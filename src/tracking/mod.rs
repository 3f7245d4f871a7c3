//! Durable record of which work items were dispatched and resolved
//!
//! The state is a list of [`QueueRecord`]s correlating local filenames with
//! tracker issue numbers. It is never trusted blindly: [`reconcile`] re-derives
//! it from the tracker before every dispatch decision.

mod reconcile;
mod storage;

pub use reconcile::{ReconcileReport, reconcile};
pub use storage::JsonFileStore;

use crate::error::{Error, Result};
use crate::queue::sequence_from_filename;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Status of a dispatched work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Issue created, resolution pending
    Processing,
    /// Resolution verified
    Completed,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// One dispatched work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRecord {
    /// Work item filename
    pub filename: String,
    /// Tracker issue number
    pub issue_number: u64,
    /// Current status
    pub status: RecordStatus,
    /// When the issue was created
    pub created_at: DateTime<Utc>,
    /// When resolution was verified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueueRecord {
    /// Sequence number from the filename prefix
    pub fn sequence_number(&self) -> Option<u32> {
        sequence_from_filename(&self.filename)
    }
}

/// All queue records (the JSON state document)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueState {
    /// Records in dispatch order
    #[serde(default)]
    pub processed_files: Vec<QueueRecord>,
    /// Filename of the most recently completed item
    #[serde(default)]
    pub last_completed_file: Option<String>,
}

impl QueueState {
    /// Create empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Record for a filename
    pub fn get(&self, filename: &str) -> Option<&QueueRecord> {
        self.processed_files.iter().find(|r| r.filename == filename)
    }

    /// Record for a tracker issue number
    pub fn by_issue(&self, issue_number: u64) -> Option<&QueueRecord> {
        self.processed_files
            .iter()
            .find(|r| r.issue_number == issue_number)
    }

    /// The active record, if any
    ///
    /// Only one record should be processing. If out-of-band tracker changes
    /// produced more, the lowest sequence number wins so promotion stays in
    /// queue order.
    pub fn processing(&self) -> Option<&QueueRecord> {
        self.processed_files
            .iter()
            .filter(|r| r.status == RecordStatus::Processing)
            .min_by_key(|r| (r.sequence_number().unwrap_or(u32::MAX), r.filename.clone()))
    }

    /// Number of processing records
    pub fn processing_count(&self) -> usize {
        self.processed_files
            .iter()
            .filter(|r| r.status == RecordStatus::Processing)
            .count()
    }

    /// Filenames of completed records
    pub fn completed_filenames(&self) -> HashSet<String> {
        self.processed_files
            .iter()
            .filter(|r| r.status == RecordStatus::Completed)
            .map(|r| r.filename.clone())
            .collect()
    }

    /// Filenames of every record, whatever its status
    pub fn recorded_filenames(&self) -> HashSet<String> {
        self.processed_files
            .iter()
            .map(|r| r.filename.clone())
            .collect()
    }

    /// Mark `filename` as dispatched to `issue_number`
    ///
    /// Fails if a different record is already processing.
    pub fn mark_processing(
        &mut self,
        filename: &str,
        issue_number: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(active) = self
            .processed_files
            .iter()
            .find(|r| r.status == RecordStatus::Processing && r.filename != filename)
        {
            return Err(Error::Tracking(format!(
                "cannot dispatch {filename}: {} (issue #{}) is still processing",
                active.filename, active.issue_number
            )));
        }

        if let Some(record) = self.processed_files.iter_mut().find(|r| r.filename == filename) {
            record.issue_number = issue_number;
            record.status = RecordStatus::Processing;
            record.completed_at = None;
        } else {
            self.processed_files.push(QueueRecord {
                filename: filename.to_string(),
                issue_number,
                status: RecordStatus::Processing,
                created_at: now,
                completed_at: None,
            });
        }
        Ok(())
    }

    /// Mark `filename` as completed
    pub fn mark_completed(&mut self, filename: &str, now: DateTime<Utc>) -> Result<()> {
        let record = self
            .processed_files
            .iter_mut()
            .find(|r| r.filename == filename)
            .ok_or_else(|| Error::Tracking(format!("no record for {filename}")))?;
        if record.status != RecordStatus::Completed {
            record.status = RecordStatus::Completed;
            record.completed_at = Some(now);
        }
        self.last_completed_file = Some(filename.to_string());
        Ok(())
    }
}

/// Persistence for [`QueueState`]
///
/// `save` replaces the whole document.
pub trait StateStore: Send + Sync {
    /// Load the state (empty state if nothing was saved yet)
    fn load(&self) -> Result<QueueState>;

    /// Replace the stored state
    fn save(&self, state: &QueueState) -> Result<()>;
}
