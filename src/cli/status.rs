//! Status command - describe the queue without acting on it

use crate::cli::context::CommandContext;
use crate::cli::style::{Stylize, arrow, check};
use anstream::println;
use issue_queue::error::Result;
use issue_queue::workflow::StatusReport;

/// Reconcile and print where the queue stands
pub async fn run_status(ctx: &CommandContext) -> Result<()> {
    let report = ctx.orchestrator().status().await?;
    print_report(ctx, &report);
    Ok(())
}

fn print_report(ctx: &CommandContext, report: &StatusReport) {
    println!(
        "{} {}/{} on {}",
        "Queue".emphasis(),
        ctx.config.owner,
        ctx.config.repo,
        ctx.config.platform
    );
    println!(
        "  {} of {} work item(s) completed",
        report.completed.to_string().emphasis(),
        report.total_items
    );
    if let Some(last) = &report.last_completed_file {
        println!("  {} last completed: {}", check(), last.muted());
    }

    match &report.active {
        Some((record, decision)) => {
            let request = decision
                .request
                .map(|n| format!(" (request #{n})"))
                .unwrap_or_default();
            println!(
                "  active: {} as issue {} - {}{}: {}",
                record.filename.emphasis(),
                format!("#{}", record.issue_number).emphasis(),
                decision.state.to_string().warn(),
                request,
                decision.reason.muted()
            );
        }
        None => println!("  {}", "no active issue".muted()),
    }

    match &report.next_item {
        Some(item) => println!("  {} next: {} ({})", arrow(), item.filename, item.title.muted()),
        None => println!("  {}", "no work items left".muted()),
    }

    if !report.unmatched_open.is_empty() {
        let ids: Vec<String> = report
            .unmatched_open
            .iter()
            .map(|id| format!("#{id}"))
            .collect();
        println!(
            "  {} open tracked issue(s) without a work item: {}",
            "!".warn(),
            ids.join(", ")
        );
    }
}
