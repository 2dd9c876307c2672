// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backup-system objects and the scheduled snapshot queue.

use crate::id::{AppId, ScheduledSnapshotId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Annotation on a backup naming the app it was taken for.
pub const APP_ID_ANNOTATION: &str = "keel.io/app-id";
/// Annotation on a backup recording the app sequence deployed when it was taken.
pub const APP_SEQUENCE_ANNOTATION: &str = "keel.io/app-sequence";

/// A row in the snapshot scheduling queue.
///
/// `backup_name == None` marks the row as pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledSnapshot {
    pub id: ScheduledSnapshotId,
    pub app_id: AppId,
    pub scheduled_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub backup_name: Option<String>,
}

impl ScheduledSnapshot {
    /// A new pending row with a generated ID.
    pub fn pending(app_id: AppId, scheduled_timestamp: DateTime<Utc>) -> Self {
        Self { id: ScheduledSnapshotId::generate(), app_id, scheduled_timestamp, backup_name: None }
    }

    pub fn is_pending(&self) -> bool {
        self.backup_name.is_none()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_timestamp <= now
    }
}

/// Phase of a backup as reported by the backup system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupPhase {
    #[default]
    New,
    InProgress,
    Completed,
    PartiallyFailed,
    Failed,
    FailedValidation,
    Deleting,
}

impl BackupPhase {
    /// Parse the backup system's phase string; an absent phase means `New`.
    pub fn parse(s: &str) -> Self {
        match s {
            "InProgress" => Self::InProgress,
            "Completed" => Self::Completed,
            "PartiallyFailed" => Self::PartiallyFailed,
            "Failed" => Self::Failed,
            "FailedValidation" => Self::FailedValidation,
            "Deleting" => Self::Deleting,
            _ => Self::New,
        }
    }

    /// Whether the backup is still running (or has not started yet).
    pub fn is_unfinished(self) -> bool {
        matches!(self, Self::New | Self::InProgress)
    }
}

/// A backup in the backup system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    pub name: String,
    pub phase: BackupPhase,
    #[serde(default)]
    pub included_namespaces: Vec<String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl Backup {
    /// Sequence the app was at when this backup was taken.
    pub fn app_sequence(&self) -> Option<i64> {
        self.annotations.get(APP_SEQUENCE_ANNOTATION)?.trim().parse().ok()
    }

    pub fn app_id(&self) -> Option<AppId> {
        self.annotations.get(APP_ID_ANNOTATION).map(|s| AppId::new(s.as_str()))
    }
}

/// Phase of a restore as reported by the backup system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestorePhase {
    #[default]
    New,
    InProgress,
    Completed,
    PartiallyFailed,
    Failed,
    FailedValidation,
}

impl RestorePhase {
    /// Parse the backup system's phase string; an absent phase means `New`.
    pub fn parse(s: &str) -> Self {
        match s {
            "InProgress" => Self::InProgress,
            "Completed" => Self::Completed,
            "PartiallyFailed" => Self::PartiallyFailed,
            "Failed" => Self::Failed,
            "FailedValidation" => Self::FailedValidation,
            _ => Self::New,
        }
    }
}

/// A restore in the backup system, named after the backup it restores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restore {
    pub name: String,
    pub backup_name: String,
    pub phase: RestorePhase,
}

#[cfg(test)]
#[path = "backup_tests.rs"]
mod tests;
