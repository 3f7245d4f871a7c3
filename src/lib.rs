//! issue-queue - feed numbered work items to an issue tracker one at a time
//!
//! Reads `<NNN>-<slug>.md` files from a directory, promotes the next one to a
//! GitHub or GitLab issue once the previous one is resolved, watches the
//! automated agent's pull/merge request for it, and approves and merges that
//! request when it is safe to do so.
//!
//! # Architecture
//!
//! - [`queue`] - local work item files
//! - [`tracking`] - durable record of dispatched items, reconciled with the tracker
//! - [`platform`] - GitHub and GitLab behind [`platform::TrackerService`]
//! - [`matcher`] - correlate an issue with the requests that resolve it
//! - [`readiness`] - decide whether a request may be merged
//! - [`workflow`] - plan and execute one decision cycle

pub mod config;
pub mod error;
pub mod matcher;
pub mod platform;
pub mod queue;
pub mod readiness;
pub mod tracking;
pub mod types;
pub mod workflow;

pub use config::Config;
pub use error::{Error, Result};
