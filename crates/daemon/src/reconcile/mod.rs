// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconciliation loops: deploy, support bundle and restore.
//!
//! Every loop has the same shape: on each tick, copy the live connections
//! out of the registry, ask the store what should be true for every app on
//! those clusters, and push events where work is needed. Nothing waits on
//! an agent. Each app runs as its own task so one slow render or failing
//! store call only costs that app its tick.

mod deploy;
mod restore;
mod support_bundle;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use keel_core::Clock;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::backup::{BackupError, BackupSystem};
use crate::registry::Registry;
use crate::render::{RenderError, Renderer};
use crate::store::{Store, StoreError};

/// Errors from reconciling one app
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Backup(#[from] BackupError),
    #[error("backup {0} not found")]
    BackupNotFound(String),
    #[error("backup {0} has no app sequence annotation")]
    MissingSequence(String),
}

/// Settings shared by the reconciliation loops
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Namespace apps are deployed into
    pub app_namespace: String,
    /// Ask agents to annotate resources with the app slug
    pub annotate_slug: bool,
    pub tick: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            app_namespace: "default".to_string(),
            annotate_slug: false,
            tick: Duration::from_secs(1),
        }
    }
}

/// Owns the collaborators the loops share.
pub struct Reconciler<S, R, B, C> {
    store: S,
    renderer: R,
    backups: B,
    registry: Registry,
    clock: C,
    config: Arc<ReconcileConfig>,
}

impl<S: Clone, R: Clone, B: Clone, C: Clone> Clone for Reconciler<S, R, B, C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            renderer: self.renderer.clone(),
            backups: self.backups.clone(),
            registry: self.registry.clone(),
            clock: self.clock.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S, R, B, C> Reconciler<S, R, B, C>
where
    S: Store,
    R: Renderer,
    B: BackupSystem,
    C: Clock,
{
    pub fn new(
        store: S,
        renderer: R,
        backups: B,
        registry: Registry,
        clock: C,
        config: ReconcileConfig,
    ) -> Self {
        Self { store, renderer, backups, registry, clock, config: Arc::new(config) }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub async fn run_deploy_loop(self, cancel: CancellationToken) {
        run_every("deploy", self.config.tick, cancel, || self.deploy_tick()).await;
    }

    pub async fn run_support_bundle_loop(self, cancel: CancellationToken) {
        run_every("support_bundle", self.config.tick, cancel, || self.support_bundle_tick()).await;
    }

    pub async fn run_restore_loop(self, cancel: CancellationToken) {
        run_every("restore", self.config.tick, cancel, || self.restore_tick()).await;
    }
}

/// Run `tick` every `period` until `cancel` fires.
///
/// The first tick runs immediately. A tick that overruns delays the next one
/// instead of bursting to catch up.
pub(crate) async fn run_every<F, Fut>(
    name: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(task = name, period_ms = period.as_millis() as u64, "loop started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => tick().await,
        }
    }
    info!(task = name, "loop stopped");
}

/// Wait for every per-app task of a tick.
pub(crate) async fn join_all(name: &'static str, mut tasks: JoinSet<()>) {
    let mut count = 0usize;
    while let Some(result) = tasks.join_next().await {
        count += 1;
        if let Err(e) = result {
            error!(task = name, error = %e, "reconcile task failed");
        }
    }
    if count > 0 {
        debug!(task = name, apps = count, "tick finished");
    }
}

#[cfg(test)]
mod test_helpers;

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
