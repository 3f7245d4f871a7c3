//! Shared command context for CLI commands
//!
//! Builds the collaborators every mode needs from one [`Config`].

use issue_queue::config::Config;
use issue_queue::error::Result;
use issue_queue::platform::{TrackerService, create_tracker_service};
use issue_queue::queue::QueueReader;
use issue_queue::tracking::JsonFileStore;
use issue_queue::workflow::Orchestrator;
use tracing::debug;

/// Shared context for CLI commands that talk to the tracker
pub struct CommandContext {
    /// Validated configuration
    pub config: Config,
    /// Tracker service (GitHub/GitLab)
    pub tracker: Box<dyn TrackerService>,
    /// State file
    pub store: JsonFileStore,
    /// Work item directory
    pub queue: QueueReader,
}

impl CommandContext {
    /// Create the context, failing on invalid configuration
    pub fn new(config: Config) -> Result<Self> {
        let tracker = create_tracker_service(&config)?;
        let store = JsonFileStore::new(&config.state_file);
        let queue = QueueReader::new(&config.issues_dir);
        debug!(
            platform = %config.platform,
            owner = %config.owner,
            repo = %config.repo,
            issues_dir = %config.issues_dir.display(),
            state_file = %config.state_file.display(),
            "command context ready"
        );
        Ok(Self {
            config,
            tracker,
            store,
            queue,
        })
    }

    /// Orchestrator borrowing this context
    pub fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(
            self.tracker.as_ref(),
            &self.store,
            &self.queue,
            &self.config.workflow,
        )
    }
}
