// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Resolve state directory: KEEL_STATE_DIR > XDG_STATE_HOME/keel > ~/.local/state/keel
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("KEEL_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("keel"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/keel"))
}

/// Address the agent WebSocket endpoint binds to.
pub fn listen_addr() -> String {
    non_empty("KEEL_LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:8800".to_string())
}

/// Namespace applications are deployed into.
pub fn app_namespace() -> String {
    non_empty("KEEL_APP_NAMESPACE").unwrap_or_else(|| "default".to_string())
}

/// Namespace the backup system's objects live in.
pub fn velero_namespace() -> String {
    non_empty("KEEL_VELERO_NAMESPACE").unwrap_or_else(|| "velero".to_string())
}

pub fn annotate_slug() -> bool {
    non_empty("KEEL_ANNOTATE_SLUG").is_some()
}

/// Deploy, support-bundle and restore tick (default 1s).
pub fn reconcile_tick() -> Duration {
    millis("KEEL_RECONCILE_TICK_MS").unwrap_or(Duration::from_secs(1))
}

/// Snapshot scheduler tick (default 60s).
pub fn scheduler_tick() -> Duration {
    millis("KEEL_SCHEDULER_TICK_MS").unwrap_or(Duration::from_secs(60))
}

/// Store checkpoint interval (default 30s).
pub fn checkpoint_interval() -> Duration {
    millis("KEEL_CHECKPOINT_MS").unwrap_or(Duration::from_secs(30))
}

/// Per-connection outbound event buffer.
pub fn agent_queue() -> usize {
    std::env::var("KEEL_AGENT_QUEUE").ok().and_then(|s| s.parse().ok()).unwrap_or(64)
}

/// Shutdown drain timeout (default 5s, configurable via `KEEL_DRAIN_TIMEOUT_MS`).
pub fn drain_timeout() -> Duration {
    millis("KEEL_DRAIN_TIMEOUT_MS").unwrap_or(Duration::from_secs(5))
}

/// Tracing filter directive for the daemon log.
pub fn log_filter() -> String {
    non_empty("KEEL_LOG").unwrap_or_else(|| "info".to_string())
}

fn non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn millis(name: &str) -> Option<Duration> {
    std::env::var(name).ok().and_then(|s| s.trim().parse::<u64>().ok()).map(Duration::from_millis)
}
