// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration surface (`spec.md` section 6), loaded from TOML.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

fn default_db_path() -> PathBuf {
    PathBuf::from("forker.db")
}
fn default_include_patterns() -> Vec<String> {
    vec!["*".into()]
}
fn default_exclude_extensions() -> Vec<String> {
    vec![".tmp".into(), ".temp".into(), ".part".into(), ".lock".into()]
}
fn default_minimum_file_age_s() -> u64 {
    5
}
fn default_stability_check_interval_s() -> u64 {
    1
}
fn default_max_stability_checks() -> u32 {
    10
}
fn default_max_concurrent_copies_per_target() -> usize {
    4
}
fn default_copy_buffer_size_bytes() -> usize {
    1 << 20
}
fn default_max_retry_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    500
}
fn default_retry_backoff_cap_ms() -> u64 {
    5 * 60 * 1000
}
fn default_state_log_max_records() -> u64 {
    1_000_000
}
fn default_state_log_retention_days() -> u32 {
    90
}
fn default_busy_timeout_ms() -> u64 {
    5_000
}
fn default_copy_progress_persist_interval_ms() -> u64 {
    2_000
}
fn default_copy_progress_persist_chunks() -> u32 {
    64
}

/// The full set of operator-tunable options (`spec.md` section 6).
///
/// Loaded once at startup with [`Config::load`]; every field carries the
/// documented default so a mostly-empty TOML file is valid. Not hot-reloaded
/// — a changed file takes effect on the next restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory watched by the Stability Gate.
    pub source_dir: PathBuf,
    /// First replication destination.
    pub target_a_dir: PathBuf,
    /// Second replication destination.
    pub target_b_dir: PathBuf,
    /// Where corrupt or mismatching target files are moved.
    pub quarantine_dir: PathBuf,

    /// Path to the embedded WAL-mode database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// SQLite `busy_timeout` in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_include_patterns")]
    pub include_patterns: Vec<String>,
    #[serde(default = "default_exclude_extensions")]
    pub exclude_extensions: Vec<String>,

    #[serde(default = "default_minimum_file_age_s")]
    pub minimum_file_age_s: u64,
    #[serde(default = "default_stability_check_interval_s")]
    pub stability_check_interval_s: u64,
    #[serde(default = "default_max_stability_checks")]
    pub max_stability_checks: u32,

    #[serde(default = "default_max_concurrent_copies_per_target")]
    pub max_concurrent_copies_per_target: usize,
    #[serde(default = "default_copy_buffer_size_bytes")]
    pub copy_buffer_size_bytes: usize,

    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_retry_backoff_cap_ms")]
    pub retry_backoff_cap_ms: u64,

    #[serde(default = "default_state_log_max_records")]
    pub state_log_max_records: u64,
    #[serde(default = "default_state_log_retention_days")]
    pub state_log_retention_days: u32,

    /// How often (at most) a copy worker persists `bytes_copied` mid-stream,
    /// whichever of this or `copy_progress_persist_chunks` elapses first.
    /// Advisory only — never read back to resume a copy (open question
    /// resolution, see DESIGN.md).
    #[serde(default = "default_copy_progress_persist_interval_ms")]
    pub copy_progress_persist_interval_ms: u64,
    /// Chunk-count companion to `copy_progress_persist_interval_ms`.
    #[serde(default = "default_copy_progress_persist_chunks")]
    pub copy_progress_persist_chunks: u32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, #[source] source: toml::de::Error },
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse { path, source })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
