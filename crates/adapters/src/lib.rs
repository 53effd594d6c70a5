// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability traits at the boundary between the domain (`forker-core`,
//! `forker-storage`, `forker-engine`) and the outside world: hashing, raw
//! filesystem access, and OS file-change notifications. Each trait has one
//! real implementation and, behind `test-support`, one in-memory fake.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod event_source;
pub mod filesystem;
pub mod hash;

pub use event_source::{DiscoveryEvent, DiscoveryEventKind, EventSource, EventSourceError, NotifyEventSource};
pub use filesystem::{FileMetadata, Filesystem, FilesystemError, OsFilesystem};
pub use hash::{HashError, Hasher, Sha256Hasher};

#[cfg(any(test, feature = "test-support"))]
pub use event_source::{FakeEventSource, FakeEventSourceHandle};
#[cfg(any(test, feature = "test-support"))]
pub use filesystem::FakeFilesystem;
#[cfg(any(test, feature = "test-support"))]
pub use hash::FakeHasher;
