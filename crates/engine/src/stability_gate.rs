// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stability Gate (`spec.md` section 4.4): turns an unreliable stream of
//! filesystem notifications into exactly one admission per source file,
//! once that file has stopped changing.
//!
//! Owns its [`EventSource`] directly (it is the single consumer) and polls
//! a `path -> PendingFile` map on a fixed interval — the periodic-poll-over-
//! a-map shape is grounded on
//! `oj-engine/src/runtime/handlers/worker/polling.rs`.

use crate::copy_worker::CopyTask;
use crate::job_manager::JobManager;
use chrono::{DateTime, Utc};
use forker_adapters::{DiscoveryEvent, DiscoveryEventKind, EventSource, Filesystem};
use forker_core::{Clock, Config, TargetId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct StabilityGateConfig {
    pub include_patterns: Vec<String>,
    pub exclude_extensions: Vec<String>,
    pub minimum_file_age: Duration,
    pub stability_check_interval: Duration,
    pub max_stability_checks: u32,
    pub target_a_dir: PathBuf,
    pub target_b_dir: PathBuf,
}

impl From<&Config> for StabilityGateConfig {
    fn from(config: &Config) -> Self {
        Self {
            include_patterns: config.include_patterns.clone(),
            exclude_extensions: config.exclude_extensions.clone(),
            minimum_file_age: Duration::from_secs(config.minimum_file_age_s),
            stability_check_interval: Duration::from_secs(config.stability_check_interval_s),
            max_stability_checks: config.max_stability_checks,
            target_a_dir: config.target_a_dir.clone(),
            target_b_dir: config.target_b_dir.clone(),
        }
    }
}

struct PendingFile {
    first_seen_utc: DateTime<Utc>,
    last_sample: Option<(u64, SystemTime)>,
    checks: u32,
}

pub struct StabilityGate<E: EventSource, F: Filesystem, Clk: Clock> {
    events: E,
    filesystem: F,
    clock: Clk,
    job_manager: Arc<JobManager>,
    config: StabilityGateConfig,
    dispatch_tx: mpsc::Sender<CopyTask>,
    pending: HashMap<PathBuf, PendingFile>,
}

impl<E: EventSource, F: Filesystem, Clk: Clock> StabilityGate<E, F, Clk> {
    pub fn new(
        events: E,
        filesystem: F,
        clock: Clk,
        job_manager: Arc<JobManager>,
        config: StabilityGateConfig,
        dispatch_tx: mpsc::Sender<CopyTask>,
    ) -> Self {
        Self { events, filesystem, clock, job_manager, config, dispatch_tx, pending: HashMap::new() }
    }

    /// Runs until the `EventSource` closes, alternating between draining
    /// notifications and running a stability pass on `stability_check_interval`.
    pub async fn run(&mut self) {
        let mut ticker = tokio::time::interval(self.config.stability_check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = self.events.next_event() => {
                    match event {
                        Ok(event) => self.handle_event(event),
                        Err(_) => return,
                    }
                }
                _ = ticker.tick() => {
                    self.run_stability_pass().await;
                }
            }
        }
    }

    fn handle_event(&mut self, event: DiscoveryEvent) {
        match event.kind {
            DiscoveryEventKind::Removed => {
                self.pending.remove(&event.path);
            }
            DiscoveryEventKind::Created | DiscoveryEventKind::Modified => {
                if !passes_filters(&event.path, &self.config) {
                    return;
                }
                self.pending.entry(event.path).or_insert_with(|| PendingFile {
                    first_seen_utc: self.clock.utc_now(),
                    last_sample: None,
                    checks: 0,
                });
            }
        }
    }

    async fn run_stability_pass(&mut self) {
        let paths: Vec<PathBuf> = self.pending.keys().cloned().collect();
        for path in paths {
            self.check_one(&path).await;
        }
    }

    async fn check_one(&mut self, path: &Path) {
        let metadata = match self.filesystem.metadata(path).await {
            Ok(metadata) => metadata,
            Err(_) => {
                debug!(path = %path.display(), "source file vanished before stabilizing");
                self.pending.remove(path);
                return;
            }
        };

        let Some(entry) = self.pending.get_mut(path) else { return };
        entry.checks += 1;

        let size_stable = entry.last_sample.map(|(size, _)| size == metadata.len).unwrap_or(false);
        let age_stable = SystemTime::now()
            .duration_since(metadata.modified)
            .map(|age| age >= self.config.minimum_file_age)
            .unwrap_or(false);
        let writer_inactive = !self.filesystem.is_writer_active(path).await.unwrap_or(true);

        if size_stable && age_stable && writer_inactive {
            let size = metadata.len;
            let now = self.clock.utc_now();
            self.pending.remove(path);
            match self.job_manager.admit_discovered(path.to_path_buf(), size, now) {
                Ok(job_id) => {
                    info!(path = %path.display(), %job_id, "admitted stable source file");
                    for (target_id, target_dir) in
                        [(TargetId::A, &self.config.target_a_dir), (TargetId::B, &self.config.target_b_dir)]
                    {
                        let _ = self
                            .dispatch_tx
                            .send(CopyTask {
                                job_id,
                                target_id,
                                source_path: path.to_path_buf(),
                                expected_size: size,
                                target_dir: target_dir.clone(),
                            })
                            .await;
                    }
                }
                Err(e) => warn!(path = %path.display(), error = %e, "failed to admit stable source file"),
            }
            return;
        }

        if entry.checks >= self.config.max_stability_checks {
            warn!(path = %path.display(), checks = entry.checks, "dropping, never_stabilized");
            self.pending.remove(path);
            return;
        }

        entry.last_sample = Some((metadata.len, metadata.modified));
    }
}

fn passes_filters(path: &Path, config: &StabilityGateConfig) -> bool {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else { return false };

    let excluded = config
        .exclude_extensions
        .iter()
        .any(|ext| file_name.to_ascii_lowercase().ends_with(&ext.to_ascii_lowercase()));
    if excluded {
        return false;
    }

    config.include_patterns.iter().any(|pattern| {
        glob::Pattern::new(pattern).map(|p| p.matches(file_name)).unwrap_or(false)
    })
}

#[cfg(test)]
#[path = "stability_gate_tests.rs"]
mod tests;
