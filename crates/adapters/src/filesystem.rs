// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem capability (`spec.md` sections 4.4, 4.5, design notes on
//! quarantine).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Debug, Clone, Copy)]
pub struct FileMetadata {
    pub len: u64,
    pub modified: SystemTime,
}

#[derive(Debug, Error)]
pub enum FilesystemError {
    #[error("{path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("source file missing: {0}")]
    NotFound(String),
}

/// Everything the Stability Gate, Copy Worker, and Adjudicator need from
/// the underlying OS filesystem.
///
/// `open_reader`/`create_temp_writer` return boxed `AsyncRead`/`AsyncWrite`
/// handles rather than a single `copy` primitive so the Copy Worker can
/// fold the streaming SHA-256 accumulation into the same read loop that
/// moves bytes, without the capability trait knowing about hashing.
#[async_trait]
pub trait Filesystem: Clone + Send + Sync + 'static {
    async fn metadata(&self, path: &Path) -> Result<FileMetadata, FilesystemError>;

    /// Whether some other process still holds an exclusive (write) lock on
    /// `path` — the stability precondition for admission (`spec.md` section 4.4).
    async fn is_writer_active(&self, path: &Path) -> Result<bool, FilesystemError>;

    async fn open_reader(
        &self,
        path: &Path,
    ) -> Result<Box<dyn AsyncRead + Unpin + Send>, FilesystemError>;

    /// Creates `dir/file_name` for writing, truncating if it already exists
    /// from a prior aborted attempt (recovery deletes stale temps first, but
    /// this guards the narrow race either way).
    async fn create_temp_writer(
        &self,
        dir: &Path,
        file_name: &str,
    ) -> Result<(PathBuf, Box<dyn AsyncWrite + Unpin + Send>), FilesystemError>;

    /// Atomically moves the completed temp file into its final location.
    async fn finalize(&self, temp_path: &Path, final_path: &Path) -> Result<(), FilesystemError>;

    async fn remove_file(&self, path: &Path) -> Result<(), FilesystemError>;

    /// Moves a corrupt/mismatching file into `quarantine_dir`, renamed to
    /// `<original>.<utc_timestamp>.quarantined` (`spec.md` section 4, design notes).
    async fn quarantine(
        &self,
        path: &Path,
        quarantine_dir: &Path,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, FilesystemError>;
}

#[derive(Clone, Copy, Default)]
pub struct OsFilesystem;

fn io_err(path: &Path, source: std::io::Error) -> FilesystemError {
    FilesystemError::Io { path: path.display().to_string(), source }
}

#[async_trait]
impl Filesystem for OsFilesystem {
    async fn metadata(&self, path: &Path) -> Result<FileMetadata, FilesystemError> {
        let meta = tokio::fs::metadata(path).await.map_err(|e| io_err(path, e))?;
        Ok(FileMetadata { len: meta.len(), modified: meta.modified().map_err(|e| io_err(path, e))? })
    }

    async fn is_writer_active(&self, path: &Path) -> Result<bool, FilesystemError> {
        let path = path.to_path_buf();
        let join_path = path.clone();
        tokio::task::spawn_blocking(move || {
            use fs2::FileExt;
            let file = std::fs::File::open(&path).map_err(|e| io_err(&path, e))?;
            match file.try_lock_shared() {
                Ok(()) => {
                    let _ = fs2::FileExt::unlock(&file);
                    Ok(false)
                }
                Err(_) => Ok(true),
            }
        })
        .await
        .unwrap_or_else(|join_err| {
            Err(io_err(&join_path, std::io::Error::other(join_err)))
        })
    }

    async fn open_reader(
        &self,
        path: &Path,
    ) -> Result<Box<dyn AsyncRead + Unpin + Send>, FilesystemError> {
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FilesystemError::NotFound(path.display().to_string())
            } else {
                io_err(path, e)
            }
        })?;
        Ok(Box::new(file))
    }

    async fn create_temp_writer(
        &self,
        dir: &Path,
        file_name: &str,
    ) -> Result<(PathBuf, Box<dyn AsyncWrite + Unpin + Send>), FilesystemError> {
        tokio::fs::create_dir_all(dir).await.map_err(|e| io_err(dir, e))?;
        let path = dir.join(file_name);
        let file = tokio::fs::File::create(&path).await.map_err(|e| io_err(&path, e))?;
        Ok((path, Box::new(file)))
    }

    async fn finalize(&self, temp_path: &Path, final_path: &Path) -> Result<(), FilesystemError> {
        // Idempotent resume (`spec.md` section 4.5 step 6): if `final_path`
        // already exists and matches the size of the temp file we just
        // finished streaming, a prior attempt already landed this rename and
        // crashed before the store caught up. Skip the rename rather than
        // clobbering it. A byte-for-byte content-hash comparison here would
        // duplicate work for no real safety gain: the Verifier immediately
        // re-reads and hashes `final_path` as the authoritative check
        // regardless of how it got there, so a same-size-but-corrupt landing
        // is still caught, just one step later than it would be here.
        if let (Ok(existing), Ok(temp_meta)) =
            (tokio::fs::metadata(final_path).await, tokio::fs::metadata(temp_path).await)
        {
            if existing.len() == temp_meta.len() {
                tokio::fs::remove_file(temp_path).await.map_err(|e| io_err(temp_path, e))?;
                return Ok(());
            }
        }

        // Fsync the temp file's data before it becomes visible under its
        // final name — otherwise a crash right after `rename` can leave the
        // final path pointing at a file whose last buffers never reached
        // disk, which `spec.md` section 1 rules out.
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(temp_path)
            .await
            .map_err(|e| io_err(temp_path, e))?;
        file.sync_all().await.map_err(|e| io_err(temp_path, e))?;
        drop(file);

        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| io_err(parent, e))?;
        }
        tokio::fs::rename(temp_path, final_path).await.map_err(|e| io_err(temp_path, e))?;

        // Fsync the containing directory so the rename's directory-entry
        // update itself survives a crash (POSIX rename durability; on
        // filesystems that don't support fsync on a directory fd this is a
        // best-effort no-op rather than a hard failure).
        if let Some(parent) = final_path.parent() {
            if let Ok(dir) = tokio::fs::File::open(parent).await {
                let _ = dir.sync_all().await;
            }
        }

        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> Result<(), FilesystemError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(path, e)),
        }
    }

    async fn quarantine(
        &self,
        path: &Path,
        quarantine_dir: &Path,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, FilesystemError> {
        tokio::fs::create_dir_all(quarantine_dir).await.map_err(|e| io_err(quarantine_dir, e))?;
        let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let dest = quarantine_dir
            .join(format!("{file_name}.{}.quarantined", now.format("%Y%m%dT%H%M%S%.fZ")));
        tokio::fs::rename(path, &dest).await.map_err(|e| io_err(path, e))?;
        Ok(dest)
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};

    #[derive(Default)]
    struct State {
        files: HashMap<PathBuf, Vec<u8>>,
        writer_active: std::collections::HashSet<PathBuf>,
    }

    /// In-memory filesystem for deterministic tests. Paths are keys into a
    /// shared map; no real I/O happens.
    #[derive(Clone, Default)]
    pub struct FakeFilesystem {
        state: Arc<Mutex<State>>,
    }

    impl FakeFilesystem {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn put_file(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
            self.state.lock().files.insert(path.into(), contents.into());
        }

        pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
            self.state.lock().files.get(path).cloned()
        }

        pub fn exists(&self, path: &Path) -> bool {
            self.state.lock().files.contains_key(path)
        }

        /// Marks `path` as having an active exclusive writer, for simulating
        /// a source file still being written by an external process.
        pub fn set_writer_active(&self, path: impl Into<PathBuf>, active: bool) {
            let path = path.into();
            let mut state = self.state.lock();
            if active {
                state.writer_active.insert(path);
            } else {
                state.writer_active.remove(&path);
            }
        }
    }

    struct MapWriter {
        state: Arc<Mutex<State>>,
        path: PathBuf,
    }

    impl AsyncWrite for MapWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            self.state.lock().files.entry(self.path.clone()).or_default().extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }
        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[async_trait]
    impl Filesystem for FakeFilesystem {
        async fn metadata(&self, path: &Path) -> Result<FileMetadata, FilesystemError> {
            let state = self.state.lock();
            let bytes = state
                .files
                .get(path)
                .ok_or_else(|| FilesystemError::NotFound(path.display().to_string()))?;
            Ok(FileMetadata { len: bytes.len() as u64, modified: SystemTime::now() })
        }

        async fn is_writer_active(&self, path: &Path) -> Result<bool, FilesystemError> {
            Ok(self.state.lock().writer_active.contains(path))
        }

        async fn open_reader(
            &self,
            path: &Path,
        ) -> Result<Box<dyn AsyncRead + Unpin + Send>, FilesystemError> {
            let bytes = self
                .state
                .lock()
                .files
                .get(path)
                .cloned()
                .ok_or_else(|| FilesystemError::NotFound(path.display().to_string()))?;
            Ok(Box::new(Cursor::new(bytes)))
        }

        async fn create_temp_writer(
            &self,
            dir: &Path,
            file_name: &str,
        ) -> Result<(PathBuf, Box<dyn AsyncWrite + Unpin + Send>), FilesystemError> {
            let path = dir.join(file_name);
            self.state.lock().files.insert(path.clone(), Vec::new());
            Ok((path.clone(), Box::new(MapWriter { state: self.state.clone(), path })))
        }

        async fn finalize(&self, temp_path: &Path, final_path: &Path) -> Result<(), FilesystemError> {
            let mut state = self.state.lock();
            let bytes = state
                .files
                .remove(temp_path)
                .ok_or_else(|| FilesystemError::NotFound(temp_path.display().to_string()))?;
            state.files.insert(final_path.to_path_buf(), bytes);
            Ok(())
        }

        async fn remove_file(&self, path: &Path) -> Result<(), FilesystemError> {
            self.state.lock().files.remove(path);
            Ok(())
        }

        async fn quarantine(
            &self,
            path: &Path,
            quarantine_dir: &Path,
            now: DateTime<Utc>,
        ) -> Result<PathBuf, FilesystemError> {
            let mut state = self.state.lock();
            let bytes = state
                .files
                .remove(path)
                .ok_or_else(|| FilesystemError::NotFound(path.display().to_string()))?;
            let file_name =
                path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let dest = quarantine_dir
                .join(format!("{file_name}.{}.quarantined", now.format("%Y%m%dT%H%M%S%.fZ")));
            state.files.insert(dest.clone(), bytes);
            Ok(dest)
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeFilesystem;

#[cfg(test)]
#[path = "filesystem_tests.rs"]
mod tests;
