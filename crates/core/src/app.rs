// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application records as seen by the reconciliation core.
//!
//! Apps are created and configured by the API layer. This crate only ever
//! mutates the restore fields, through the store.

use crate::id::AppId;
use serde::{Deserialize, Serialize};

/// Progress of the undeploy phase that precedes a restore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RestoreUndeployStatus {
    /// No undeploy requested yet (stored as the empty string)
    #[default]
    #[serde(rename = "")]
    Reset,
    #[serde(rename = "in_process")]
    InProcess,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

crate::simple_display! {
    RestoreUndeployStatus {
        Reset => "",
        InProcess => "in_process",
        Completed => "completed",
        Failed => "failed",
    }
}

impl RestoreUndeployStatus {
    /// Parse the stored string form; unknown values map to `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "" => Some(Self::Reset),
            "in_process" => Some(Self::InProcess),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Install progress of an application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallState {
    #[default]
    Installed,
    AirgapUploadPending,
    AirgapUploadInProgress,
    AirgapUploadError,
    OnlineUpgradeInProgress,
}

crate::simple_display! {
    InstallState {
        Installed => "installed",
        AirgapUploadPending => "airgap_upload_pending",
        AirgapUploadInProgress => "airgap_upload_in_progress",
        AirgapUploadError => "airgap_upload_error",
        OnlineUpgradeInProgress => "online_upgrade_in_progress",
    }
}

/// An installed application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub id: AppId,
    pub slug: String,
    /// Latest rendered version
    pub current_sequence: i64,
    /// Cron expression; `None` or empty disables scheduled snapshots
    #[serde(default)]
    pub snapshot_schedule: Option<String>,
    /// Retention passed to the backup system, e.g. `720h`
    #[serde(default)]
    pub snapshot_ttl: Option<String>,
    /// Backup being restored; `None` or empty means no restore is active
    #[serde(default)]
    pub restore_in_progress_name: Option<String>,
    #[serde(default)]
    pub restore_undeploy_status: RestoreUndeployStatus,
    #[serde(default)]
    pub install_state: InstallState,
}

impl App {
    /// The cron expression, if scheduled snapshots are enabled.
    pub fn snapshot_schedule(&self) -> Option<&str> {
        self.snapshot_schedule.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Name of the backup being restored, if a restore is active.
    pub fn restore_in_progress(&self) -> Option<&str> {
        self.restore_in_progress_name.as_deref().filter(|s| !s.is_empty())
    }

    pub fn is_installed(&self) -> bool {
        self.install_state == InstallState::Installed
    }
}

/// Test builder for [`App`] with an installed, unscheduled default.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone)]
pub struct AppBuilder {
    app: App,
}

#[cfg(any(test, feature = "test-support"))]
impl Default for AppBuilder {
    fn default() -> Self {
        Self {
            app: App {
                id: AppId::new("app-1"),
                slug: "my-app".to_string(),
                current_sequence: 0,
                snapshot_schedule: None,
                snapshot_ttl: None,
                restore_in_progress_name: None,
                restore_undeploy_status: RestoreUndeployStatus::Reset,
                install_state: InstallState::Installed,
            },
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl AppBuilder {
    pub fn id(mut self, id: impl Into<AppId>) -> Self {
        self.app.id = id.into();
        self
    }

    pub fn slug(mut self, slug: impl Into<String>) -> Self {
        self.app.slug = slug.into();
        self
    }

    pub fn current_sequence(mut self, sequence: i64) -> Self {
        self.app.current_sequence = sequence;
        self
    }

    pub fn snapshot_schedule(mut self, schedule: impl Into<String>) -> Self {
        self.app.snapshot_schedule = Some(schedule.into());
        self
    }

    pub fn snapshot_ttl(mut self, ttl: impl Into<String>) -> Self {
        self.app.snapshot_ttl = Some(ttl.into());
        self
    }

    pub fn restore_in_progress_name(mut self, name: impl Into<String>) -> Self {
        self.app.restore_in_progress_name = Some(name.into());
        self
    }

    pub fn restore_undeploy_status(mut self, status: RestoreUndeployStatus) -> Self {
        self.app.restore_undeploy_status = status;
        self
    }

    pub fn install_state(mut self, state: InstallState) -> Self {
        self.app.install_state = state;
        self
    }

    pub fn build(self) -> App {
        self.app
    }
}

#[cfg(any(test, feature = "test-support"))]
impl App {
    /// Create a builder with test defaults.
    pub fn builder() -> AppBuilder {
        AppBuilder::default()
    }
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;
