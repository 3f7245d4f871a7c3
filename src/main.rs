//! issue-queue CLI

mod cli;

use anyhow::Context;
use clap::Parser;
use issue_queue::config::Config;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Exit code when a cycle is waiting, blocked or has nothing to do
const EXIT_NO_ACTION: u8 = 1;
/// Exit code for fatal configuration or runtime errors
const EXIT_FATAL: u8 = 2;

/// Promote numbered Markdown work items to tracker issues one at a time and
/// merge the agent's pull requests for them.
///
/// Without a mode flag a single decision cycle runs. Exit status 0 means an
/// issue was dispatched or a request merged, 1 means nothing was done, 2 means
/// a fatal error.
#[derive(Parser, Debug)]
#[command(name = "issue-queue", version, about, long_about = None)]
struct Cli {
    /// Keep running, one cycle every POLL_INTERVAL seconds
    #[arg(long, visible_alias = "daemon", conflicts_with_all = ["status", "sync"])]
    continuous: bool,

    /// Show queue and active issue status without acting
    #[arg(long, conflicts_with = "sync")]
    status: bool,

    /// Rebuild the state file from tracker history
    #[arg(long)]
    sync: bool,

    /// Directory with the numbered Markdown files (overrides ISSUES_DIR)
    #[arg(long, value_name = "DIR")]
    issues_dir: Option<PathBuf>,

    /// State file path (overrides STATE_FILE)
    #[arg(long, value_name = "FILE")]
    state_file: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("ISSUE_QUEUE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "issue_queue=debug,info"
        } else {
            "issue_queue=info,warn"
        })
    });

    let format = env::var("ISSUE_QUEUE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(dir) = cli.issues_dir {
        config.issues_dir = dir;
    }
    if let Some(file) = cli.state_file {
        config.state_file = file;
    }

    let ctx = cli::context::CommandContext::new(config)?;

    if cli.status {
        cli::run_status(&ctx).await?;
        return Ok(ExitCode::SUCCESS);
    }
    if cli.sync {
        cli::run_sync(&ctx).await?;
        return Ok(ExitCode::SUCCESS);
    }
    if cli.continuous {
        cli::run_continuous(&ctx).await?;
        return Ok(ExitCode::SUCCESS);
    }

    match cli::run_once(&ctx).await {
        Ok(outcome) if outcome.action_taken() => Ok(ExitCode::SUCCESS),
        Ok(_) => Ok(ExitCode::from(EXIT_NO_ACTION)),
        Err(e) if e.is_transient() => {
            warn!(error = %e, "cycle failed, no action taken");
            Ok(ExitCode::from(EXIT_NO_ACTION))
        }
        Err(e) => Err(e.into()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start async runtime: {e}");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "fatal");
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}
