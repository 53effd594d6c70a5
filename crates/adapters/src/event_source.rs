// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem discovery event capability (`spec.md` section 4.4: how the
//! Stability Gate learns that a candidate source file exists at all).

use async_trait::async_trait;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryEventKind {
    Created,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryEvent {
    pub path: PathBuf,
    pub kind: DiscoveryEventKind,
}

#[derive(Debug, Error)]
pub enum EventSourceError {
    #[error("failed to watch {path}: {source}")]
    Watch { path: String, #[source] source: notify::Error },
    #[error("event source closed")]
    Closed,
}

/// A single-consumer stream of discovery events. Unlike [`crate::Hasher`]
/// and [`crate::Filesystem`] this is drained by exactly one Stability Gate
/// task, so it takes `&mut self` rather than requiring `Clone`.
#[async_trait]
pub trait EventSource: Send + 'static {
    async fn next_event(&mut self) -> Result<DiscoveryEvent, EventSourceError>;
}

/// Watches a directory tree with the OS's native notification API via the
/// `notify` crate, bridging its synchronous callback onto an async channel.
pub struct NotifyEventSource {
    _watcher: notify::RecommendedWatcher,
    events: mpsc::UnboundedReceiver<DiscoveryEvent>,
}

impl NotifyEventSource {
    pub fn watch(root: &Path) -> Result<Self, EventSourceError> {
        let (tx, events) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else { return };
            let Some(kind) = classify(&event.kind) else { return };
            for path in event.paths {
                let _ = tx.send(DiscoveryEvent { path, kind });
            }
        })
        .map_err(|source| EventSourceError::Watch { path: root.display().to_string(), source })?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|source| EventSourceError::Watch { path: root.display().to_string(), source })?;

        Ok(Self { _watcher: watcher, events })
    }
}

fn classify(kind: &EventKind) -> Option<DiscoveryEventKind> {
    match kind {
        EventKind::Create(_) => Some(DiscoveryEventKind::Created),
        EventKind::Modify(_) => Some(DiscoveryEventKind::Modified),
        EventKind::Remove(_) => Some(DiscoveryEventKind::Removed),
        _ => None,
    }
}

#[async_trait]
impl EventSource for NotifyEventSource {
    async fn next_event(&mut self) -> Result<DiscoveryEvent, EventSourceError> {
        self.events.recv().await.ok_or(EventSourceError::Closed)
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;

    /// Manually-driven event source for deterministic Stability Gate tests.
    /// [`FakeEventSource::handle`] returns the sending half so a test can
    /// script a sequence of creates/modifies/removes and assert on what the
    /// gate does with them.
    pub struct FakeEventSource {
        events: mpsc::UnboundedReceiver<DiscoveryEvent>,
    }

    #[derive(Clone)]
    pub struct FakeEventSourceHandle {
        events: mpsc::UnboundedSender<DiscoveryEvent>,
    }

    impl FakeEventSourceHandle {
        pub fn push(&self, path: impl Into<PathBuf>, kind: DiscoveryEventKind) {
            let _ = self.events.send(DiscoveryEvent { path: path.into(), kind });
        }
    }

    impl FakeEventSource {
        pub fn new() -> (Self, FakeEventSourceHandle) {
            let (tx, rx) = mpsc::unbounded_channel();
            (Self { events: rx }, FakeEventSourceHandle { events: tx })
        }
    }

    #[async_trait]
    impl EventSource for FakeEventSource {
        async fn next_event(&mut self) -> Result<DiscoveryEvent, EventSourceError> {
            self.events.recv().await.ok_or(EventSourceError::Closed)
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeEventSource, FakeEventSourceHandle};

#[cfg(test)]
#[path = "event_source_tests.rs"]
mod tests;
