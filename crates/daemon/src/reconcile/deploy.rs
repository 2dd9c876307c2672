// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deploy loop: push each downstream's current version to its agents.

use keel_core::{App, AppStatus, Clock, DownstreamVersion, VersionStatus};
use keel_wire::{AgentEvent, AppInformersArgs, DeployArgs, PreflightArgs, DEPLOY_RESULT_CALLBACK};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{join_all, ReconcileError, Reconciler};
use crate::backup::BackupSystem;
use crate::registry::ClusterSocket;
use crate::render::{
    pull_secret_manifest, render_informers, RenderError, RenderedVersion, Renderer,
};
use crate::store::Store;

impl<S, R, B, C> Reconciler<S, R, B, C>
where
    S: Store,
    R: Renderer,
    B: BackupSystem,
    C: Clock,
{
    /// One pass over every live connection and the apps on its cluster.
    pub async fn deploy_tick(&self) {
        let mut tasks = JoinSet::new();
        for socket in self.registry.sockets() {
            let apps = match self.store.list_apps_for_downstream(&socket.cluster_id).await {
                Ok(apps) => apps,
                Err(e) => {
                    warn!(cluster_id = %socket.cluster_id, error = %e, "listing apps for deploy");
                    continue;
                }
            };
            for app in apps {
                let this = self.clone();
                let socket = socket.clone();
                tasks.spawn(async move {
                    if let Err(e) = this.deploy_app(&socket, &app).await {
                        warn!(
                            app_id = %app.id,
                            cluster_id = %socket.cluster_id,
                            error = %e,
                            "deploy reconcile failed"
                        );
                    }
                });
            }
        }
        join_all("deploy", tasks).await;
    }

    async fn deploy_app(&self, socket: &ClusterSocket, app: &App) -> Result<(), ReconcileError> {
        if !app.is_installed() {
            debug!(app_id = %app.id, state = %app.install_state, "app not installed, skipping");
            return Ok(());
        }

        self.dispatch_preflights(socket, app).await?;

        let Some(current) = self.store.get_current_version(&app.id, &socket.cluster_id).await?
        else {
            return Ok(());
        };
        if socket.last_deployed_sequences.get(&app.id) == Some(&current.sequence) {
            return Ok(());
        }

        let rendered = match self.render_deploy(socket, app, &current).await? {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(
                    app_id = %app.id,
                    sequence = current.sequence,
                    error = %e,
                    "render failed, marking version failed"
                );
                self.store
                    .set_downstream_version_status(
                        &app.id,
                        &socket.cluster_id,
                        current.sequence,
                        VersionStatus::Failed,
                        Some(e.to_string()),
                    )
                    .await?;
                // Not re-rendered until the sequence changes
                self.registry.record_deployed(&socket.connection_id, &app.id, current.sequence);
                return Ok(());
            }
        };

        if !self.registry.emit_to(&socket.connection_id, AgentEvent::Deploy(rendered.args)) {
            return Ok(());
        }
        self.registry.record_deployed(&socket.connection_id, &app.id, current.sequence);
        info!(
            app_id = %app.id,
            cluster_id = %socket.cluster_id,
            sequence = current.sequence,
            "deploy sent"
        );

        if rendered.informers.is_empty() {
            let status = AppStatus::ready_without_informers(app.id.clone(), self.clock.now());
            self.store.set_app_status(status).await?;
        } else {
            self.registry.emit_to(
                &socket.connection_id,
                AgentEvent::AppInformers(AppInformersArgs {
                    app_id: app.id.clone(),
                    informers: rendered.informers,
                }),
            );
        }
        Ok(())
    }

    /// Build the deploy payload. The outer error is a store failure (retry
    /// next tick); the inner one is a render failure (terminal for this
    /// version).
    async fn render_deploy(
        &self,
        socket: &ClusterSocket,
        app: &App,
        current: &DownstreamVersion,
    ) -> Result<Result<DeployPayload, RenderError>, ReconcileError> {
        let archive = self.store.get_app_version_archive(&app.id, current.parent_sequence).await?;
        let target = match self.renderer.render_version(app, &archive).await {
            Ok(target) => target,
            Err(e) => return Ok(Err(e)),
        };

        let previous = match self.store.get_previous_version(&app.id, &socket.cluster_id).await? {
            Some(prev) => {
                let archive =
                    self.store.get_app_version_archive(&app.id, prev.parent_sequence).await?;
                match self.renderer.render_version(app, &archive).await {
                    Ok(rendered) => rendered.manifests,
                    Err(e) => return Ok(Err(e)),
                }
            }
            None => Vec::new(),
        };

        let image_pull_secret = match self.store.get_registry_details_for_app(&app.id).await? {
            Some(details) => match pull_secret_manifest(&details, &self.config.app_namespace) {
                Ok(secret) => secret,
                Err(e) => return Ok(Err(e)),
            },
            None => String::new(),
        };

        let RenderedVersion {
            manifests,
            kubectl_version,
            additional_namespaces,
            status_informers,
        } = target;
        let informers = match render_informers(&status_informers, &self.config.app_namespace) {
            Ok(informers) => informers,
            Err(e) => return Ok(Err(e)),
        };
        let args = DeployArgs {
            app_id: app.id.clone(),
            app_slug: app.slug.clone(),
            kubectl_version,
            additional_namespaces,
            image_pull_secret,
            namespace: self.config.app_namespace.clone(),
            previous_manifests: DeployArgs::encode_manifests(&previous),
            manifests: DeployArgs::encode_manifests(&manifests),
            wait: false,
            result_callback: DEPLOY_RESULT_CALLBACK.to_string(),
            clear_namespaces: Vec::new(),
            clear_pvcs: false,
            annotate_slug: self.config.annotate_slug,
        };
        Ok(Ok(DeployPayload { args, informers }))
    }

    /// Push preflight checks for versions waiting on them, once per connection.
    async fn dispatch_preflights(
        &self,
        socket: &ClusterSocket,
        app: &App,
    ) -> Result<(), ReconcileError> {
        let pending =
            self.store.list_pending_preflight_versions(&app.id, &socket.cluster_id).await?;
        for version in pending {
            let args = PreflightArgs::for_version(&app.slug, version.sequence);
            if socket.sent_preflight_urls.contains(&args.uri) {
                continue;
            }
            // Recorded only once queued, so a full queue retries next tick.
            let uri = args.uri.clone();
            if self.registry.emit_to(&socket.connection_id, AgentEvent::Preflight(args)) {
                self.registry.record_preflight_sent(&socket.connection_id, &uri);
                debug!(app_id = %app.id, uri = %uri, "preflight sent");
            }
        }
        Ok(())
    }
}

struct DeployPayload {
    args: DeployArgs,
    /// Namespace-qualified status informers
    informers: Vec<String>,
}

#[cfg(test)]
#[path = "deploy_tests.rs"]
mod tests;
