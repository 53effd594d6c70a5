// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use anyhow::Result;
use clap::ValueEnum;
use forker_core::JobId;
use forker_storage::Store;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

pub fn print_status(store: &Store, format: OutputFormat) -> Result<()> {
    let counts = store.counts_by_state()?;
    match format {
        OutputFormat::Json => {
            let by_state: std::collections::BTreeMap<String, u64> =
                counts.into_iter().map(|(state, n)| (state.to_string(), n)).collect();
            println!("{}", serde_json::to_string_pretty(&by_state)?);
        }
        OutputFormat::Text => {
            if counts.is_empty() {
                println!("No jobs");
                return Ok(());
            }
            let mut rows: Vec<(String, u64)> =
                counts.into_iter().map(|(state, n)| (state.to_string(), n)).collect();
            rows.sort();
            for (state, n) in rows {
                println!("{state:<16} {n}");
            }
        }
    }
    Ok(())
}

pub fn print_job_list(store: &Store, format: OutputFormat) -> Result<()> {
    let jobs = store.list_jobs()?;
    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = jobs
                .iter()
                .map(|j| {
                    serde_json::json!({
                        "id": j.id.to_string(),
                        "source_path": j.source_path,
                        "state": j.state.to_string(),
                        "initial_size": j.initial_size,
                        "created_utc": j.created_utc,
                        "version_token": j.version_token,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text => {
            if jobs.is_empty() {
                println!("No jobs");
                return Ok(());
            }
            println!("{:<24} {:<12} {:>12} {:<24} SOURCE", "ID", "STATE", "SIZE", "CREATED");
            for job in jobs {
                println!(
                    "{:<24} {:<12} {:>12} {:<24} {}",
                    job.id,
                    job.state.to_string(),
                    job.initial_size,
                    job.created_utc.to_rfc3339(),
                    job.source_path.display(),
                );
            }
        }
    }
    Ok(())
}

pub fn print_job_detail(store: &Store, job_id: JobId, format: OutputFormat) -> Result<()> {
    let Some(detail) = store.job_detail(job_id)? else {
        anyhow::bail!("job {job_id} not found");
    };
    match format {
        OutputFormat::Json => {
            let targets: Vec<_> = detail
                .targets
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "target_id": t.target_id.to_string(),
                        "copy_state": t.copy_state.to_string(),
                        "attempts": t.attempts,
                        "bytes_copied": t.bytes_copied,
                        "final_path": t.final_path,
                        "last_error": t.last_error,
                    })
                })
                .collect();
            let obj = serde_json::json!({
                "id": detail.job.id.to_string(),
                "source_path": detail.job.source_path,
                "state": detail.job.state.to_string(),
                "initial_size": detail.job.initial_size,
                "created_utc": detail.job.created_utc,
                "version_token": detail.job.version_token,
                "targets": targets,
            });
            println!("{}", serde_json::to_string_pretty(&obj)?);
        }
        OutputFormat::Text => {
            println!("Job:     {}", detail.job.id);
            println!("Source:  {}", detail.job.source_path.display());
            println!("State:   {}", detail.job.state);
            println!("Size:    {} bytes", detail.job.initial_size);
            println!("Created: {}", detail.job.created_utc.to_rfc3339());
            for target in &detail.targets {
                println!();
                println!("Target {}:", target.target_id);
                println!("  State:        {}", target.copy_state);
                println!("  Attempts:     {}", target.attempts);
                println!("  Bytes copied: {}", target.bytes_copied);
                if let Some(path) = &target.final_path {
                    println!("  Final path:   {}", path.display());
                }
                if let Some(err) = &target.last_error {
                    println!("  Last error:   {err}");
                }
            }
        }
    }
    Ok(())
}
