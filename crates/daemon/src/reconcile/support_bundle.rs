// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Support-bundle loop.
//!
//! Dispatch is at-most-once: a request is cleared as soon as it is sent,
//! not when the agent finishes collecting. A connection lost right after
//! dispatch loses the request.

use keel_core::{App, ClusterId, Clock};
use keel_wire::{AgentEvent, SupportBundleArgs};
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
    pub async fn support_bundle_tick(&self) {
        let mut tasks = JoinSet::new();
        for cluster_id in self.registry.clusters() {
            let apps = match self.store.list_apps_for_downstream(&cluster_id).await {
                Ok(apps) => apps,
                Err(e) => {
                    warn!(cluster_id = %cluster_id, error = %e, "listing apps for support bundles");
                    continue;
                }
            };
            for app in apps {
                let this = self.clone();
                let cluster_id = cluster_id.clone();
                tasks.spawn(async move {
                    if let Err(e) = this.dispatch_support_bundles(&cluster_id, &app).await {
                        warn!(
                            app_id = %app.id,
                            cluster_id = %cluster_id,
                            error = %e,
                            "support bundle dispatch failed"
                        );
                    }
                });
            }
        }
        join_all("support_bundle", tasks).await;
    }

    async fn dispatch_support_bundles(
        &self,
        cluster_id: &ClusterId,
        app: &App,
    ) -> Result<(), ReconcileError> {
        let pending = self.store.list_pending_support_bundles_for_app(&app.id).await?;
        for bundle in pending.iter().filter(|b| &b.cluster_id == cluster_id) {
            let archive = self.store.get_app_version_archive(&app.id, app.current_sequence).await?;
            let spec = self.renderer.render_support_bundle_spec(app, &archive).await?;
            let uri = self.store.save_support_bundle_spec(&app.id, spec).await?;

            let event = AgentEvent::SupportBundle(SupportBundleArgs { uri: uri.clone() });
            let delivered = self.registry.emit(cluster_id, &event);
            self.store.clear_pending_support_bundle(&bundle.id).await?;
            info!(
                app_id = %app.id,
                cluster_id = %cluster_id,
                bundle_id = %bundle.id,
                uri = %uri,
                delivered,
                "support bundle dispatched"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "support_bundle_tests.rs"]
mod tests;
