// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! keel daemon library
//!
//! Connection registry, reconciliation loops, snapshot scheduler and the
//! collaborators they drive. The `keeld` binary wires these together.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod backup;
pub mod env;
pub mod lifecycle;
pub mod listener;
pub mod reconcile;
pub mod registry;
pub mod render;
pub mod scheduler;
pub mod store;

pub use backup::{BackupError, BackupSystem, VeleroBackups};
pub use lifecycle::{startup, startup_with, Config, DaemonState, LifecycleError};
pub use listener::Listener;
pub use reconcile::{ReconcileConfig, ReconcileError, Reconciler};
pub use registry::{AgentConnection, ClusterSocket, Registry, RegistryError};
pub use render::{ArchiveRenderer, RenderError, RenderedVersion, Renderer};
pub use scheduler::{ScheduleOutcome, SchedulerError, SnapshotScheduler};
pub use store::{MemoryStore, SnapshotClaim, Store, StoreError, StoreState};

#[cfg(any(test, feature = "test-support"))]
pub use backup::{BackupCall, FakeBackupSystem};
#[cfg(any(test, feature = "test-support"))]
pub use render::FakeRenderer;
