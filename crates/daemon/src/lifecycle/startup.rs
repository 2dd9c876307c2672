// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and initialization logic.

use std::io::Write;

use fs2::FileExt;
use keel_core::{Clock, SystemClock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backup::{BackupSystem, VeleroBackups};
use crate::listener::Listener;
use crate::reconcile::{run_every, ReconcileConfig, Reconciler};
use crate::registry::Registry;
use crate::render::{ArchiveRenderer, Renderer};
use crate::scheduler::SnapshotScheduler;
use crate::store::{load_snapshot, save_snapshot, MemoryStore};

use super::{Config, DaemonState, LifecycleError};

/// Start the daemon against the cluster it runs in.
pub async fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    let client = kube::Client::try_default().await?;
    let backups = VeleroBackups::new(client, &config.velero_namespace, &config.app_namespace);
    startup_with(config, ArchiveRenderer, backups, SystemClock).await
}

/// Start the daemon with explicit collaborators.
pub async fn startup_with<R, B, C>(
    config: &Config,
    renderer: R,
    backups: B,
    clock: C,
) -> Result<DaemonState, LifecycleError>
where
    R: Renderer,
    B: BackupSystem,
    C: Clock,
{
    config.validate()?;
    match startup_inner(config, renderer, backups, clock).await {
        Ok(daemon) => Ok(daemon),
        Err(e) => {
            // Don't clean up if we failed to acquire the lock. The PID
            // file belongs to the already-running daemon.
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(config);
            }
            Err(e)
        }
    }
}

async fn startup_inner<R, B, C>(
    config: &Config,
    renderer: R,
    backups: B,
    clock: C,
) -> Result<DaemonState, LifecycleError>
where
    R: Renderer,
    B: BackupSystem,
    C: Clock,
{
    std::fs::create_dir_all(&config.state_dir)?;

    // 1. Acquire lock file FIRST. Opening without truncation keeps the
    // running daemon's PID intact if the lock is held.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;

    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    // 2. Load the store
    let store = match load_snapshot(&config.snapshot_path)? {
        Some(state) => {
            info!(
                apps = state.apps.len(),
                clusters = state.clusters.len(),
                versions = state.versions.len(),
                "loaded store snapshot"
            );
            MemoryStore::from_state(state)
        }
        None => {
            info!("no store snapshot found, starting empty");
            MemoryStore::new()
        }
    };

    // 3. Bind the agent listener (LAST fallible step)
    let registry = Registry::new(config.agent_queue);
    let listener = Listener::bind(config.listen_addr.as_str(), store.clone(), registry.clone())
        .await
        .map_err(|e| LifecycleError::BindFailed(config.listen_addr.clone(), e))?;
    let listen_addr = listener.local_addr()?;

    // 4. Spawn the listener, the loops and the checkpointer
    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();
    tasks.spawn(listener.run(cancel.clone()));

    let reconciler = Reconciler::new(
        store.clone(),
        renderer,
        backups.clone(),
        registry.clone(),
        clock.clone(),
        ReconcileConfig {
            app_namespace: config.app_namespace.clone(),
            annotate_slug: config.annotate_slug,
            tick: config.reconcile_tick,
        },
    );
    tasks.spawn(reconciler.clone().run_deploy_loop(cancel.clone()));
    tasks.spawn(reconciler.clone().run_support_bundle_loop(cancel.clone()));
    tasks.spawn(reconciler.run_restore_loop(cancel.clone()));

    let scheduler = SnapshotScheduler::new(store.clone(), backups, clock, config.scheduler_tick);
    tasks.spawn(scheduler.run(cancel.clone()));

    tasks.spawn(run_checkpoints(config.clone(), store.clone(), cancel.clone()));

    info!(%listen_addr, "daemon started");

    Ok(DaemonState {
        config: config.clone(),
        lock_file,
        store,
        registry,
        listen_addr,
        cancel,
        tasks,
    })
}

/// Periodically write the store to disk.
async fn run_checkpoints(config: Config, store: MemoryStore, cancel: CancellationToken) {
    let (config, store) = (&config, &store);
    run_every("checkpoint", config.checkpoint_interval, cancel, move || async move {
        let path = config.snapshot_path.clone();
        let state = store.state();
        match tokio::task::spawn_blocking(move || save_snapshot(&path, state)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "checkpoint failed"),
            Err(e) => warn!(error = %e, "checkpoint task failed"),
        }
    })
    .await;
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &Config) {
    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
