// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restore loop: drives apps with a restore in progress through the
//! decision table in [`keel_core::restore`].

use std::collections::BTreeMap;

use keel_core::{
    on_restore_observed, plan, App, AppId, ClusterId, Clock, RestoreAction, RestorePlan,
};
use keel_wire::{AgentEvent, DeployArgs, UNDEPLOY_RESULT_CALLBACK};
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::{join_all, ReconcileError, Reconciler};
use crate::backup::BackupSystem;
use crate::render::Renderer;
use crate::store::Store;

impl<S, R, B, C> Reconciler<S, R, B, C>
where
    S: Store,
    R: Renderer,
    B: BackupSystem,
    C: Clock,
{
    /// One pass over apps with a restore in progress on a connected cluster.
    ///
    /// An app targeting several connected clusters is handled by a single
    /// task so its restore state advances once per tick.
    pub async fn restore_tick(&self) {
        let mut restoring: BTreeMap<AppId, (App, Vec<ClusterId>)> = BTreeMap::new();
        for cluster_id in self.registry.clusters() {
            let apps = match self.store.list_apps_for_downstream(&cluster_id).await {
                Ok(apps) => apps,
                Err(e) => {
                    warn!(cluster_id = %cluster_id, error = %e, "listing apps for restore");
                    continue;
                }
            };
            for app in apps.into_iter().filter(|a| a.restore_in_progress().is_some()) {
                restoring
                    .entry(app.id.clone())
                    .or_insert_with(|| (app, Vec::new()))
                    .1
                    .push(cluster_id.clone());
            }
        }

        let mut tasks = JoinSet::new();
        for (app_id, (app, clusters)) in restoring {
            let this = self.clone();
            tasks.spawn(async move {
                if let Err(e) = this.reconcile_restore(&app, &clusters).await {
                    warn!(app_id = %app_id, error = %e, "restore reconcile failed");
                }
            });
        }
        join_all("restore", tasks).await;
    }

    async fn reconcile_restore(
        &self,
        app: &App,
        clusters: &[ClusterId],
    ) -> Result<(), ReconcileError> {
        let Some(backup_name) = app.restore_in_progress() else {
            return Ok(());
        };

        let action = match plan(app.restore_undeploy_status) {
            RestorePlan::Act(action) => action,
            RestorePlan::ObserveRestore => {
                let restore = self.backups.get_restore(backup_name).await?;
                on_restore_observed(restore.map(|r| r.phase))
            }
        };

        match action {
            RestoreAction::Wait => Ok(()),
            RestoreAction::Undeploy => self.undeploy(app, backup_name, clusters).await,
            RestoreAction::CreateRestore => {
                self.backups.create_restore(backup_name).await?;
                info!(app_id = %app.id, backup = backup_name, "restore requested");
                Ok(())
            }
            RestoreAction::Complete => self.complete_restore(app, backup_name, clusters).await,
            RestoreAction::Abort => {
                self.store.reset_restore(&app.id).await?;
                warn!(app_id = %app.id, backup = backup_name, "restore failed, giving up");
                self.cleanup_restore(&app.id, backup_name).await;
                Ok(())
            }
        }
    }

    /// Tell every connected agent to remove the app and the backup's
    /// namespaces and volumes.
    async fn undeploy(
        &self,
        app: &App,
        backup_name: &str,
        clusters: &[ClusterId],
    ) -> Result<(), ReconcileError> {
        let backup = self
            .backups
            .get_backup(backup_name)
            .await?
            .ok_or_else(|| ReconcileError::BackupNotFound(backup_name.to_string()))?;

        let mut delivered = 0;
        for cluster_id in clusters {
            let current = self.store.get_current_version(&app.id, cluster_id).await?;
            let (applied, kubectl_version, additional_namespaces) = match current {
                Some(version) => {
                    let archive =
                        self.store.get_app_version_archive(&app.id, version.parent_sequence).await?;
                    let rendered = self.renderer.render_version(app, &archive).await?;
                    (rendered.manifests, rendered.kubectl_version, rendered.additional_namespaces)
                }
                None => (Vec::new(), String::new(), Vec::new()),
            };

            let args = DeployArgs {
                app_id: app.id.clone(),
                app_slug: app.slug.clone(),
                kubectl_version,
                additional_namespaces,
                image_pull_secret: String::new(),
                namespace: self.config.app_namespace.clone(),
                previous_manifests: DeployArgs::encode_manifests(&applied),
                manifests: String::new(),
                wait: true,
                result_callback: UNDEPLOY_RESULT_CALLBACK.to_string(),
                clear_namespaces: backup.included_namespaces.clone(),
                clear_pvcs: true,
                annotate_slug: self.config.annotate_slug,
            };
            delivered += self.registry.emit(cluster_id, &AgentEvent::Deploy(args));
        }

        if delivered == 0 {
            warn!(app_id = %app.id, "no agent accepted undeploy, retrying next tick");
            return Ok(());
        }
        let status = RestoreAction::Undeploy.next_status(app.restore_undeploy_status);
        self.store.set_restore_undeploy_status(&app.id, status).await?;
        info!(app_id = %app.id, backup = backup_name, "undeploy sent for restore");
        Ok(())
    }

    /// Point the app at the backup's sequence and clear the restore.
    async fn complete_restore(
        &self,
        app: &App,
        backup_name: &str,
        clusters: &[ClusterId],
    ) -> Result<(), ReconcileError> {
        let backup = self
            .backups
            .get_backup(backup_name)
            .await?
            .ok_or_else(|| ReconcileError::BackupNotFound(backup_name.to_string()))?;
        let sequence = backup
            .app_sequence()
            .ok_or_else(|| ReconcileError::MissingSequence(backup_name.to_string()))?;

        self.store.deploy_version(&app.id, sequence).await?;

        if let Some(cluster_id) = clusters.first() {
            let now = self.clock.now();
            if let Err(e) = self.store.queue_support_bundle(&app.id, cluster_id, now).await {
                warn!(app_id = %app.id, error = %e, "queueing post-restore support bundle");
            }
        }

        self.store.reset_restore(&app.id).await?;
        info!(app_id = %app.id, backup = backup_name, sequence, "restore completed");
        self.cleanup_restore(&app.id, backup_name).await;
        Ok(())
    }

    /// Remove a finished restore object so a later restore from the same
    /// backup starts fresh.
    async fn cleanup_restore(&self, app_id: &AppId, name: &str) {
        if let Err(e) = self.backups.delete_restore(name).await {
            warn!(app_id = %app_id, restore = name, error = %e, "deleting restore object");
        }
    }
}

#[cfg(test)]
#[path = "restore_tests.rs"]
mod tests;
