// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process reference store.

use super::{SnapshotClaim, Store, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keel_core::{
    App, AppId, AppStatus, ClusterId, Downstream, DownstreamCluster, DownstreamVersion,
    PendingSupportBundle, RegistryDetails, RestoreUndeployStatus, ScheduledSnapshot,
    ScheduledSnapshotId, SupportBundleId, VersionArchive, VersionStatus,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Everything the memory store persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreState {
    #[serde(default)]
    pub apps: BTreeMap<AppId, App>,
    /// Deploy token -> cluster
    #[serde(default)]
    pub deploy_tokens: BTreeMap<String, ClusterId>,
    #[serde(default)]
    pub clusters: BTreeMap<ClusterId, DownstreamCluster>,
    #[serde(default)]
    pub downstreams: Vec<Downstream>,
    #[serde(default)]
    pub versions: Vec<DownstreamVersion>,
    #[serde(default)]
    pub archives: BTreeMap<AppId, BTreeMap<i64, VersionArchive>>,
    #[serde(default)]
    pub registry_details: BTreeMap<AppId, RegistryDetails>,
    #[serde(default)]
    pub app_statuses: BTreeMap<AppId, AppStatus>,
    #[serde(default)]
    pub pending_support_bundles: Vec<PendingSupportBundle>,
    /// Published support bundle specs, keyed by URI
    #[serde(default)]
    pub support_bundle_specs: BTreeMap<String, Vec<u8>>,
    #[serde(default)]
    pub scheduled_snapshots: Vec<ScheduledSnapshot>,
}

impl StoreState {
    fn app_mut(&mut self, app_id: &AppId) -> Result<&mut App, StoreError> {
        self.apps.get_mut(app_id).ok_or_else(|| StoreError::not_found("app", app_id))
    }

    fn downstream(&self, app_id: &AppId, cluster_id: &ClusterId) -> Option<&Downstream> {
        self.downstreams.iter().find(|d| &d.app_id == app_id && &d.cluster_id == cluster_id)
    }

    fn version(
        &self,
        app_id: &AppId,
        cluster_id: &ClusterId,
        sequence: i64,
    ) -> Option<&DownstreamVersion> {
        self.versions.iter().find(|v| {
            &v.app_id == app_id && &v.cluster_id == cluster_id && v.sequence == sequence
        })
    }
}

/// Store kept in memory and persisted through snapshots.
///
/// Claims on scheduled snapshots are tracked outside [`StoreState`]: they
/// belong to live scheduler ticks and never survive a restart.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
    claimed: Arc<Mutex<HashSet<ScheduledSnapshotId>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: StoreState) -> Self {
        Self { state: Arc::new(Mutex::new(state)), claimed: Arc::default() }
    }

    /// Copy of the persistent state, for checkpointing.
    pub fn state(&self) -> StoreState {
        self.state.lock().clone()
    }

    // --- administration (API layer) ---

    pub fn insert_app(&self, app: App) {
        self.state.lock().apps.insert(app.id.clone(), app);
    }

    pub fn add_cluster(&self, cluster: DownstreamCluster, deploy_token: impl Into<String>) {
        let mut state = self.state.lock();
        state.deploy_tokens.insert(deploy_token.into(), cluster.cluster_id.clone());
        state.clusters.insert(cluster.cluster_id.clone(), cluster);
    }

    pub fn add_downstream(&self, app_id: &AppId, cluster_id: &ClusterId) {
        let mut state = self.state.lock();
        if state.downstream(app_id, cluster_id).is_none() {
            state.downstreams.push(Downstream::new(app_id.clone(), cluster_id.clone()));
        }
    }

    /// Insert or replace a downstream version row.
    pub fn put_version(&self, version: DownstreamVersion) {
        let mut state = self.state.lock();
        state.versions.retain(|v| {
            !(v.app_id == version.app_id
                && v.cluster_id == version.cluster_id
                && v.sequence == version.sequence)
        });
        state.versions.push(version);
    }

    pub fn put_archive(&self, app_id: &AppId, sequence: i64, archive: VersionArchive) {
        self.state.lock().archives.entry(app_id.clone()).or_default().insert(sequence, archive);
    }

    /// Move one downstream's deployed pointer.
    pub fn promote(
        &self,
        app_id: &AppId,
        cluster_id: &ClusterId,
        sequence: i64,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let ds = state
            .downstreams
            .iter_mut()
            .find(|d| &d.app_id == app_id && &d.cluster_id == cluster_id)
            .ok_or_else(|| StoreError::not_found("downstream", format!("{app_id}/{cluster_id}")))?;
        ds.promote(sequence);
        Ok(())
    }

    pub fn set_registry_details(&self, app_id: &AppId, details: RegistryDetails) {
        self.state.lock().registry_details.insert(app_id.clone(), details);
    }

    /// Mark a restore from `backup_name` as requested.
    pub fn start_restore(&self, app_id: &AppId, backup_name: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let app = state.app_mut(app_id)?;
        app.restore_in_progress_name = Some(backup_name.to_string());
        app.restore_undeploy_status = RestoreUndeployStatus::Reset;
        Ok(())
    }

    // --- inspection ---

    pub fn app(&self, app_id: &AppId) -> Option<App> {
        self.state.lock().apps.get(app_id).cloned()
    }

    pub fn app_status(&self, app_id: &AppId) -> Option<AppStatus> {
        self.state.lock().app_statuses.get(app_id).cloned()
    }

    pub fn downstream(&self, app_id: &AppId, cluster_id: &ClusterId) -> Option<Downstream> {
        self.state.lock().downstream(app_id, cluster_id).cloned()
    }

    pub fn downstream_version(
        &self,
        app_id: &AppId,
        cluster_id: &ClusterId,
        sequence: i64,
    ) -> Option<DownstreamVersion> {
        self.state.lock().version(app_id, cluster_id, sequence).cloned()
    }

    pub fn scheduled_snapshots(&self, app_id: &AppId) -> Vec<ScheduledSnapshot> {
        let state = self.state.lock();
        state.scheduled_snapshots.iter().filter(|s| &s.app_id == app_id).cloned().collect()
    }

    pub fn pending_support_bundles(&self) -> Vec<PendingSupportBundle> {
        self.state.lock().pending_support_bundles.clone()
    }

    pub fn support_bundle_spec(&self, uri: &str) -> Option<Vec<u8>> {
        self.state.lock().support_bundle_specs.get(uri).cloned()
    }
}

/// URI a published support bundle spec is served from.
pub(crate) fn support_bundle_spec_uri(app_id: &AppId) -> String {
    format!("/api/v1/troubleshoot/app/{app_id}/spec")
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_cluster_id_from_deploy_token(&self, token: &str) -> Result<ClusterId, StoreError> {
        if token.is_empty() {
            return Err(StoreError::InvalidToken);
        }
        self.state.lock().deploy_tokens.get(token).cloned().ok_or(StoreError::InvalidToken)
    }

    async fn list_apps(&self) -> Result<Vec<App>, StoreError> {
        Ok(self.state.lock().apps.values().cloned().collect())
    }

    async fn get_app(&self, app_id: &AppId) -> Result<App, StoreError> {
        self.app(app_id).ok_or_else(|| StoreError::not_found("app", app_id))
    }

    async fn list_apps_for_downstream(
        &self,
        cluster_id: &ClusterId,
    ) -> Result<Vec<App>, StoreError> {
        let state = self.state.lock();
        let apps = state
            .downstreams
            .iter()
            .filter(|d| &d.cluster_id == cluster_id)
            .filter_map(|d| state.apps.get(&d.app_id).cloned())
            .collect();
        Ok(apps)
    }

    async fn list_downstreams_for_app(
        &self,
        app_id: &AppId,
    ) -> Result<Vec<ClusterId>, StoreError> {
        let state = self.state.lock();
        let mut clusters: Vec<ClusterId> = state
            .downstreams
            .iter()
            .filter(|d| &d.app_id == app_id)
            .map(|d| d.cluster_id.clone())
            .collect();
        clusters.sort();
        Ok(clusters)
    }

    async fn get_downstream(
        &self,
        cluster_id: &ClusterId,
    ) -> Result<Option<DownstreamCluster>, StoreError> {
        Ok(self.state.lock().clusters.get(cluster_id).cloned())
    }

    async fn get_current_version(
        &self,
        app_id: &AppId,
        cluster_id: &ClusterId,
    ) -> Result<Option<DownstreamVersion>, StoreError> {
        let state = self.state.lock();
        let Some(sequence) = state.downstream(app_id, cluster_id).and_then(|d| d.current_sequence)
        else {
            return Ok(None);
        };
        Ok(state.version(app_id, cluster_id, sequence).cloned())
    }

    async fn get_previous_version(
        &self,
        app_id: &AppId,
        cluster_id: &ClusterId,
    ) -> Result<Option<DownstreamVersion>, StoreError> {
        let state = self.state.lock();
        let Some(sequence) = state.downstream(app_id, cluster_id).and_then(|d| d.previous_sequence)
        else {
            return Ok(None);
        };
        Ok(state.version(app_id, cluster_id, sequence).cloned())
    }

    async fn list_pending_preflight_versions(
        &self,
        app_id: &AppId,
        cluster_id: &ClusterId,
    ) -> Result<Vec<DownstreamVersion>, StoreError> {
        let state = self.state.lock();
        let mut versions: Vec<_> = state
            .versions
            .iter()
            .filter(|v| {
                &v.app_id == app_id
                    && &v.cluster_id == cluster_id
                    && v.status == VersionStatus::PendingPreflight
            })
            .cloned()
            .collect();
        versions.sort_by_key(|v| v.sequence);
        Ok(versions)
    }

    async fn set_downstream_version_status(
        &self,
        app_id: &AppId,
        cluster_id: &ClusterId,
        sequence: i64,
        status: VersionStatus,
        status_info: Option<String>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let version = state
            .versions
            .iter_mut()
            .find(|v| &v.app_id == app_id && &v.cluster_id == cluster_id && v.sequence == sequence)
            .ok_or_else(|| {
                StoreError::not_found("version", format!("{app_id}/{cluster_id}/{sequence}"))
            })?;
        version.status = status;
        version.status_info = status_info;
        Ok(())
    }

    async fn get_app_version_archive(
        &self,
        app_id: &AppId,
        sequence: i64,
    ) -> Result<VersionArchive, StoreError> {
        self.state
            .lock()
            .archives
            .get(app_id)
            .and_then(|a| a.get(&sequence))
            .cloned()
            .ok_or_else(|| StoreError::not_found("archive", format!("{app_id}/{sequence}")))
    }

    async fn get_registry_details_for_app(
        &self,
        app_id: &AppId,
    ) -> Result<Option<RegistryDetails>, StoreError> {
        Ok(self.state.lock().registry_details.get(app_id).cloned())
    }

    async fn set_app_status(&self, status: AppStatus) -> Result<(), StoreError> {
        self.state.lock().app_statuses.insert(status.app_id.clone(), status);
        Ok(())
    }

    async fn deploy_version(&self, app_id: &AppId, sequence: i64) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if !state.apps.contains_key(app_id) {
            return Err(StoreError::not_found("app", app_id));
        }
        for ds in state.downstreams.iter_mut().filter(|d| &d.app_id == app_id) {
            ds.promote(sequence);
        }
        Ok(())
    }

    async fn list_pending_support_bundles_for_app(
        &self,
        app_id: &AppId,
    ) -> Result<Vec<PendingSupportBundle>, StoreError> {
        let state = self.state.lock();
        Ok(state.pending_support_bundles.iter().filter(|b| &b.app_id == app_id).cloned().collect())
    }

    async fn clear_pending_support_bundle(&self, id: &SupportBundleId) -> Result<(), StoreError> {
        self.state.lock().pending_support_bundles.retain(|b| &b.id != id);
        Ok(())
    }

    async fn queue_support_bundle(
        &self,
        app_id: &AppId,
        cluster_id: &ClusterId,
        created_at: DateTime<Utc>,
    ) -> Result<SupportBundleId, StoreError> {
        let id = SupportBundleId::generate();
        self.state.lock().pending_support_bundles.push(PendingSupportBundle {
            id: id.clone(),
            app_id: app_id.clone(),
            cluster_id: cluster_id.clone(),
            created_at,
        });
        Ok(id)
    }

    async fn save_support_bundle_spec(
        &self,
        app_id: &AppId,
        spec: Vec<u8>,
    ) -> Result<String, StoreError> {
        let uri = support_bundle_spec_uri(app_id);
        self.state.lock().support_bundle_specs.insert(uri.clone(), spec);
        Ok(uri)
    }

    async fn claim_pending_scheduled_snapshots(
        &self,
        app_id: &AppId,
    ) -> Result<SnapshotClaim, StoreError> {
        let state = self.state.lock();
        let mut claimed = self.claimed.lock();
        let mut pending: Vec<ScheduledSnapshot> = state
            .scheduled_snapshots
            .iter()
            .filter(|s| &s.app_id == app_id && s.is_pending() && !claimed.contains(&s.id))
            .cloned()
            .collect();
        pending.sort_by_key(|s| s.scheduled_timestamp);
        let ids: Vec<ScheduledSnapshotId> = pending.iter().map(|s| s.id.clone()).collect();
        claimed.extend(ids.iter().cloned());

        let held = Arc::clone(&self.claimed);
        Ok(SnapshotClaim::new(pending, move || {
            let mut held = held.lock();
            for id in &ids {
                held.remove(id);
            }
        }))
    }

    async fn create_scheduled_snapshot(
        &self,
        snapshot: ScheduledSnapshot,
    ) -> Result<(), StoreError> {
        self.state.lock().scheduled_snapshots.push(snapshot);
        Ok(())
    }

    async fn update_scheduled_snapshot(
        &self,
        id: &ScheduledSnapshotId,
        backup_name: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let row = state
            .scheduled_snapshots
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| StoreError::not_found("scheduled snapshot", id))?;
        row.backup_name = Some(backup_name.to_string());
        Ok(())
    }

    async fn delete_pending_scheduled_snapshots(&self, app_id: &AppId) -> Result<(), StoreError> {
        self.state.lock().scheduled_snapshots.retain(|s| !(&s.app_id == app_id && s.is_pending()));
        Ok(())
    }

    async fn set_restore_undeploy_status(
        &self,
        app_id: &AppId,
        status: RestoreUndeployStatus,
    ) -> Result<(), StoreError> {
        self.state.lock().app_mut(app_id)?.restore_undeploy_status = status;
        Ok(())
    }

    async fn reset_restore(&self, app_id: &AppId) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let app = state.app_mut(app_id)?;
        app.restore_in_progress_name = None;
        app.restore_undeploy_status = RestoreUndeployStatus::Reset;
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
