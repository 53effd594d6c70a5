// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `forker`: the operator surface over the embedded store (`spec.md`
//! section 6) — counts by state, the job list, per-job detail, and the
//! `Requeue` action. Opens the same SQLite file `forkerd` writes, as a
//! second WAL-mode connection; there is no daemon IPC to go through.

mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use forker_core::{Config, JobId};
use forker_storage::Store;
use output::OutputFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "forker", about = "Operator CLI for a forkerd instance's job store")]
struct Cli {
    /// Path to the same TOML config file forkerd was started with.
    #[arg(long, default_value = "forkerd.toml")]
    config: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show job counts by state.
    Status,
    /// List all jobs, newest first.
    List,
    /// Show one job's detail, including both Target outcomes.
    Show {
        /// Job ID, e.g. `job-AbCdEfGhIjKlMnOpQrS`.
        job_id: String,
    },
    /// Move a Failed or Quarantined job back to Queued.
    Requeue {
        /// Job ID to requeue.
        job_id: String,
        /// Recorded in the audit trail alongside the requeue.
        #[arg(long)]
        reason: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    let store = Store::open(&config.db_path, config.busy_timeout_ms)
        .with_context(|| format!("opening store at {}", config.db_path.display()))?;

    match cli.command {
        Command::Status => output::print_status(&store, cli.format),
        Command::List => output::print_job_list(&store, cli.format),
        Command::Show { job_id } => output::print_job_detail(&store, JobId::from_string(job_id), cli.format),
        Command::Requeue { job_id, reason } => requeue(&store, JobId::from_string(job_id), &reason, cli.format),
    }
}

/// Requeues under the store's optimistic token, retrying once on a
/// concurrent writer's `Conflict` before giving up — a single CLI
/// invocation doesn't compete with itself, so an unbounded retry loop
/// (as `forker-engine::JobManager` runs) isn't needed here.
fn requeue(store: &Store, job_id: JobId, reason: &str, format: OutputFormat) -> Result<()> {
    let job = store
        .get_job(job_id)?
        .with_context(|| format!("job {job_id} not found"))?;

    match store.requeue(job_id, job.version_token, reason)? {
        forker_storage::TransitionOutcome::Applied { .. } => {
            output::print_job_detail(store, job_id, format)
        }
        forker_storage::TransitionOutcome::Conflict { current_token } => {
            match store.requeue(job_id, current_token, reason)? {
                forker_storage::TransitionOutcome::Applied { .. } => {
                    output::print_job_detail(store, job_id, format)
                }
                forker_storage::TransitionOutcome::Conflict { .. } => {
                    anyhow::bail!("job {job_id} is under contention; re-run `forker requeue {job_id}`")
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
