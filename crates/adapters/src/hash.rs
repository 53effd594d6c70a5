// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hashing capability (`spec.md` sections 4.5, 4.6).

use async_trait::async_trait;
use forker_core::Sha256Hex;
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;
use tokio::io::AsyncReadExt;

const BLOCK_LEN: usize = 1 << 20;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("failed to read {path}: {source}")]
    Read { path: String, #[source] source: std::io::Error },
}

/// Computes a whole-file SHA-256 digest. Used twice per job: once (lazily,
/// cached) against the source to obtain `source_hash`, and once per target
/// by the Verifier as an independent re-read — the streaming hash the Copy
/// Worker accumulates while writing is never treated as authoritative.
#[async_trait]
pub trait Hasher: Clone + Send + Sync + 'static {
    async fn hash_file(&self, path: &Path) -> Result<Sha256Hex, HashError>;
}

#[derive(Clone, Copy, Default)]
pub struct Sha256Hasher;

#[async_trait]
impl Hasher for Sha256Hasher {
    async fn hash_file(&self, path: &Path) -> Result<Sha256Hex, HashError> {
        let path_owned = path.to_path_buf();
        let mut file = tokio::fs::File::open(&path_owned)
            .await
            .map_err(|source| HashError::Read { path: path_owned.display().to_string(), source })?;

        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; BLOCK_LEN];
        loop {
            let n = file
                .read(&mut buffer)
                .await
                .map_err(|source| HashError::Read { path: path_owned.display().to_string(), source })?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(Sha256Hex::from_bytes(hasher.finalize().into()))
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Arc;

    /// Fake hasher backed by a table of pre-seeded digests, keyed by path.
    /// Falls back to hashing the path's string bytes so unseeded calls are
    /// at least deterministic and distinct per path.
    #[derive(Clone, Default)]
    pub struct FakeHasher {
        seeded: Arc<Mutex<HashMap<PathBuf, Sha256Hex>>>,
    }

    impl FakeHasher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed(&self, path: impl Into<PathBuf>, hash: Sha256Hex) {
            self.seeded.lock().insert(path.into(), hash);
        }
    }

    #[async_trait]
    impl Hasher for FakeHasher {
        async fn hash_file(&self, path: &Path) -> Result<Sha256Hex, HashError> {
            if let Some(hash) = self.seeded.lock().get(path) {
                return Ok(hash.clone());
            }
            let mut hasher = Sha256::new();
            hasher.update(path.to_string_lossy().as_bytes());
            Ok(Sha256Hex::from_bytes(hasher.finalize().into()))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeHasher;

#[cfg(test)]
#[path = "hash_tests.rs"]
mod tests;
