//! CLI command implementations

pub mod context;
mod run;
mod status;
pub mod style;
mod sync;

pub use run::{run_continuous, run_once};
pub use status::run_status;
pub use sync::run_sync;
