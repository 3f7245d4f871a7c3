//! Sync command - rebuild local state from tracker history

use crate::cli::context::CommandContext;
use crate::cli::style::{Stylize, check};
use anstream::println;
use issue_queue::error::Result;

/// Discard the state file's contents and re-derive them from the tracker
pub async fn run_sync(ctx: &CommandContext) -> Result<()> {
    let report = ctx.orchestrator().force_sync().await?;

    for change in &report.changes {
        println!("  {}", change.muted());
    }
    println!(
        "{} Rebuilt {} from tracker history ({} record change(s))",
        check(),
        ctx.config.state_file.display().to_string().emphasis(),
        report.changes.len()
    );
    if !report.unmatched_open.is_empty() {
        let ids: Vec<String> = report
            .unmatched_open
            .iter()
            .map(|id| format!("#{id}"))
            .collect();
        println!(
            "{} open tracked issue(s) without a work item: {}",
            "!".warn(),
            ids.join(", ")
        );
    }
    Ok(())
}
