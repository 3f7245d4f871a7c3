//! Run command - single-shot and continuous decision cycles

use crate::cli::context::CommandContext;
use crate::cli::style::{Stylize, check};
use anstream::println;
use issue_queue::error::Result;
use issue_queue::workflow::TickOutcome;
use tracing::{error, info, warn};

/// Run one decision cycle and report it
pub async fn run_once(ctx: &CommandContext) -> Result<TickOutcome> {
    info!("running single decision cycle");
    let outcome = ctx.orchestrator().tick().await?;
    print_outcome(&outcome);
    Ok(outcome)
}

/// Run decision cycles until interrupted
///
/// Errors end the current cycle only; the next cycle starts from a fresh
/// reconciliation.
pub async fn run_continuous(ctx: &CommandContext) -> Result<()> {
    let interval = ctx.config.poll_interval;
    info!(interval_secs = interval.as_secs(), "starting continuous mode");
    let orchestrator = ctx.orchestrator();

    loop {
        match orchestrator.tick().await {
            Ok(outcome) => {
                info!(outcome = %outcome, action = outcome.action_taken(), "cycle finished");
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "cycle failed, retrying next poll");
            }
            Err(e) => {
                error!(error = %e, "cycle failed");
            }
        }

        info!(interval_secs = interval.as_secs(), "sleeping");
        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "failed to listen for interrupt");
                }
                info!("interrupted, shutting down");
                return Ok(());
            }
        }
    }
}

fn print_outcome(outcome: &TickOutcome) {
    match outcome {
        TickOutcome::Dispatched { filename, issue } => {
            println!(
                "{} Dispatched {} as issue {}",
                check(),
                filename.emphasis(),
                format!("#{issue}").emphasis()
            );
        }
        TickOutcome::Merged {
            filename,
            issue,
            request,
        } => {
            println!(
                "{} {} {} resolving issue #{issue} ({})",
                check(),
                "Merged".success(),
                format!("#{request}").emphasis(),
                filename.muted()
            );
        }
        TickOutcome::Completed { filename, issue } => {
            println!(
                "{} Issue #{issue} ({}) completed; no work items left",
                check(),
                filename.muted()
            );
        }
        TickOutcome::Waiting {
            filename,
            issue,
            state,
            reason,
        } => {
            println!(
                "Issue {} ({}) is {}: {}",
                format!("#{issue}").emphasis(),
                filename.muted(),
                state.to_string().warn(),
                reason
            );
        }
        TickOutcome::Blocked { reason } => println!("{} {reason}", "Blocked:".warn()),
        TickOutcome::QueueEmpty => println!("{}", "Queue is empty - nothing to dispatch.".muted()),
    }
}
