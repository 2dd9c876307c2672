// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup and shutdown.

mod startup;
pub use startup::{startup, startup_with};

use std::fs::File;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::registry::Registry;
use crate::store::{save_snapshot, MemoryStore, SnapshotError};

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/keel)
    pub state_dir: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Path to store snapshot file
    pub snapshot_path: PathBuf,
    /// Agent WebSocket listen address
    pub listen_addr: String,
    pub app_namespace: String,
    pub velero_namespace: String,
    pub annotate_slug: bool,
    pub reconcile_tick: Duration,
    pub scheduler_tick: Duration,
    pub checkpoint_interval: Duration,
    pub drain_timeout: Duration,
    /// Outbound event buffer per agent connection
    pub agent_queue: usize,
}

impl Config {
    /// Load configuration from `KEEL_*` environment variables.
    pub fn load() -> Result<Self, LifecycleError> {
        let config = Self {
            listen_addr: crate::env::listen_addr(),
            app_namespace: crate::env::app_namespace(),
            velero_namespace: crate::env::velero_namespace(),
            annotate_slug: crate::env::annotate_slug(),
            reconcile_tick: crate::env::reconcile_tick(),
            scheduler_tick: crate::env::scheduler_tick(),
            checkpoint_interval: crate::env::checkpoint_interval(),
            drain_timeout: crate::env::drain_timeout(),
            agent_queue: crate::env::agent_queue(),
            ..Self::for_state_dir(crate::env::state_dir()?)
        };
        config.validate()?;
        Ok(config)
    }

    /// Defaults rooted at `state_dir`.
    pub fn for_state_dir(state_dir: PathBuf) -> Self {
        Self {
            lock_path: state_dir.join("keeld.pid"),
            log_path: state_dir.join("keeld.log"),
            snapshot_path: state_dir.join("store.json.zst"),
            listen_addr: "0.0.0.0:8800".to_string(),
            app_namespace: "default".to_string(),
            velero_namespace: "velero".to_string(),
            annotate_slug: false,
            reconcile_tick: Duration::from_secs(1),
            scheduler_tick: Duration::from_secs(60),
            checkpoint_interval: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(5),
            agent_queue: 64,
            state_dir,
        }
    }

    /// Reject intervals a loop cannot run on.
    pub fn validate(&self) -> Result<(), LifecycleError> {
        let intervals = [
            ("reconcile tick", self.reconcile_tick),
            ("scheduler tick", self.scheduler_tick),
            ("checkpoint interval", self.checkpoint_interval),
        ];
        for (name, interval) in intervals {
            if interval.is_zero() {
                return Err(LifecycleError::InvalidInterval(name));
            }
        }
        Ok(())
    }
}

/// Daemon state during operation.
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub store: MemoryStore,
    pub registry: Registry,
    /// Address the agent listener is bound to
    pub listen_addr: SocketAddr,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
}

impl DaemonState {
    /// Stop every loop, save a final snapshot and release the lock.
    ///
    /// Work in flight is abandoned; every loop picks it up again on the
    /// next start.
    pub async fn shutdown(mut self) -> Result<(), LifecycleError> {
        info!("shutting down daemon");
        self.cancel.cancel();

        let mut tasks = std::mem::take(&mut self.tasks);
        let drain = async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "task failed during shutdown");
                }
            }
        };
        let timeout = self.config.drain_timeout;
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(timeout_ms = timeout.as_millis() as u64, "drain timed out");
            tasks.abort_all();
        }

        match save_snapshot(&self.config.snapshot_path, self.store.state()) {
            Ok(()) => info!(path = %self.config.snapshot_path.display(), "saved final snapshot"),
            Err(e) => warn!(error = %e, "failed to save shutdown snapshot"),
        }

        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!(error = %e, "failed to remove PID file");
            }
        }

        // Lock file is released when self.lock_file is dropped
        info!("daemon shutdown complete");
        Ok(())
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind agent listener at {0}: {1}")]
    BindFailed(String, std::io::Error),

    #[error("{0} must be greater than zero")]
    InvalidInterval(&'static str),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Kubernetes client error: {0}")]
    Kube(#[from] kube::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
