// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable state contract required by the reconciliation core.
//!
//! The control plane never assumes exclusive access to its store: several
//! `keeld` instances may share one backend. Implementations must therefore
//! make [`Store::claim_pending_scheduled_snapshots`] an exclusive claim (in
//! SQL terms, `FOR UPDATE SKIP LOCKED` inside a transaction that lives as
//! long as the returned [`SnapshotClaim`]).

mod memory;
mod snapshot;

pub use memory::{MemoryStore, StoreState};
pub use snapshot::{load_snapshot, save_snapshot, SnapshotError, CURRENT_SNAPSHOT_VERSION};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keel_core::{
    App, AppId, AppStatus, ClusterId, DownstreamCluster, DownstreamVersion, PendingSupportBundle,
    RegistryDetails, RestoreUndeployStatus, ScheduledSnapshot, ScheduledSnapshotId,
    SupportBundleId, VersionArchive, VersionStatus,
};
use thiserror::Error;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("deploy token does not match any cluster")]
    InvalidToken,
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound { kind, id: id.to_string() }
    }
}

/// Pending scheduled snapshots held exclusively by one scheduler tick.
///
/// Rows are released when the claim is dropped.
pub struct SnapshotClaim {
    pending: Vec<ScheduledSnapshot>,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl SnapshotClaim {
    /// A claim whose rows are released by `release` on drop.
    pub fn new(
        pending: Vec<ScheduledSnapshot>,
        release: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self { pending, release: Some(Box::new(release)) }
    }

    /// Pending rows, earliest first.
    pub fn pending(&self) -> &[ScheduledSnapshot] {
        &self.pending
    }
}

impl std::fmt::Debug for SnapshotClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotClaim").field("pending", &self.pending).finish_non_exhaustive()
    }
}

impl Drop for SnapshotClaim {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Store operations used by the registry, the reconciliation loops and the
/// snapshot scheduler.
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    // --- clusters and apps ---

    async fn get_cluster_id_from_deploy_token(&self, token: &str) -> Result<ClusterId, StoreError>;

    async fn list_apps(&self) -> Result<Vec<App>, StoreError>;

    async fn get_app(&self, app_id: &AppId) -> Result<App, StoreError>;

    /// Apps with a downstream on the cluster.
    async fn list_apps_for_downstream(&self, cluster_id: &ClusterId)
        -> Result<Vec<App>, StoreError>;

    /// Clusters the app has a downstream on, ordered by cluster id.
    async fn list_downstreams_for_app(&self, app_id: &AppId) -> Result<Vec<ClusterId>, StoreError>;

    async fn get_downstream(
        &self,
        cluster_id: &ClusterId,
    ) -> Result<Option<DownstreamCluster>, StoreError>;

    // --- versions ---

    /// Version the downstream's deployed pointer refers to.
    async fn get_current_version(
        &self,
        app_id: &AppId,
        cluster_id: &ClusterId,
    ) -> Result<Option<DownstreamVersion>, StoreError>;

    /// Version that was deployed before the current one.
    async fn get_previous_version(
        &self,
        app_id: &AppId,
        cluster_id: &ClusterId,
    ) -> Result<Option<DownstreamVersion>, StoreError>;

    async fn list_pending_preflight_versions(
        &self,
        app_id: &AppId,
        cluster_id: &ClusterId,
    ) -> Result<Vec<DownstreamVersion>, StoreError>;

    async fn set_downstream_version_status(
        &self,
        app_id: &AppId,
        cluster_id: &ClusterId,
        sequence: i64,
        status: VersionStatus,
        status_info: Option<String>,
    ) -> Result<(), StoreError>;

    async fn get_app_version_archive(
        &self,
        app_id: &AppId,
        sequence: i64,
    ) -> Result<VersionArchive, StoreError>;

    async fn get_registry_details_for_app(
        &self,
        app_id: &AppId,
    ) -> Result<Option<RegistryDetails>, StoreError>;

    async fn set_app_status(&self, status: AppStatus) -> Result<(), StoreError>;

    /// Point every downstream of the app at `sequence`.
    async fn deploy_version(&self, app_id: &AppId, sequence: i64) -> Result<(), StoreError>;

    // --- support bundles ---

    async fn list_pending_support_bundles_for_app(
        &self,
        app_id: &AppId,
    ) -> Result<Vec<PendingSupportBundle>, StoreError>;

    async fn clear_pending_support_bundle(&self, id: &SupportBundleId) -> Result<(), StoreError>;

    async fn queue_support_bundle(
        &self,
        app_id: &AppId,
        cluster_id: &ClusterId,
        created_at: DateTime<Utc>,
    ) -> Result<SupportBundleId, StoreError>;

    /// Publish a rendered support bundle spec; returns the URI agents fetch it from.
    async fn save_support_bundle_spec(
        &self,
        app_id: &AppId,
        spec: Vec<u8>,
    ) -> Result<String, StoreError>;

    // --- scheduled snapshots ---

    /// Pending rows for the app, earliest first, skipping rows another
    /// live claim holds.
    async fn claim_pending_scheduled_snapshots(
        &self,
        app_id: &AppId,
    ) -> Result<SnapshotClaim, StoreError>;

    async fn create_scheduled_snapshot(&self, snapshot: ScheduledSnapshot)
        -> Result<(), StoreError>;

    /// Stamp a row with the backup created for it, marking it handled.
    async fn update_scheduled_snapshot(
        &self,
        id: &ScheduledSnapshotId,
        backup_name: &str,
    ) -> Result<(), StoreError>;

    async fn delete_pending_scheduled_snapshots(&self, app_id: &AppId) -> Result<(), StoreError>;

    // --- restore ---

    async fn set_restore_undeploy_status(
        &self,
        app_id: &AppId,
        status: RestoreUndeployStatus,
    ) -> Result<(), StoreError>;

    /// Clear the restore marker and its undeploy status.
    async fn reset_restore(&self, app_id: &AppId) -> Result<(), StoreError>;
}
