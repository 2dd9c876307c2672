// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! keel-core: domain model and pure decision logic for the keel control plane

pub mod macros;

pub mod app;
pub mod backup;
pub mod clock;
pub mod downstream;
pub mod id;
pub mod restore;
pub mod schedule;
pub mod status;
pub mod support_bundle;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

#[cfg(any(test, feature = "test-support"))]
pub use app::AppBuilder;
pub use app::{App, InstallState, RestoreUndeployStatus};
pub use backup::{
    Backup, BackupPhase, Restore, RestorePhase, ScheduledSnapshot, APP_ID_ANNOTATION,
    APP_SEQUENCE_ANNOTATION,
};
pub use clock::{Clock, FakeClock, SystemClock};
pub use downstream::{
    Downstream, DownstreamCluster, DownstreamVersion, RegistryDetails, VersionArchive,
    VersionStatus,
};
pub use id::{short, AppId, ClusterId, ConnectionId, ScheduledSnapshotId, SupportBundleId};
pub use restore::{on_restore_observed, plan, RestoreAction, RestorePlan};
pub use schedule::{next_occurrence, ScheduleError, SnapshotSchedule};
pub use status::{aggregate_state, AppStatus, ResourceState, State};
pub use support_bundle::PendingSupportBundle;
