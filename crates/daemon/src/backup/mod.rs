// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backup-system seam.
//!
//! Backups and restores are executed by the cluster backup system; the
//! control plane creates requests and polls their phase.

mod velero;

pub use velero::VeleroBackups;

use async_trait::async_trait;
use keel_core::{App, AppId, Backup, Restore};
use thiserror::Error;

/// Errors from the backup system
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("backup system returned {kind} without a name")]
    Unnamed { kind: &'static str },
    #[error("backup system unavailable: {0}")]
    Unavailable(String),
}

/// Operations on the backup system
#[async_trait]
pub trait BackupSystem: Clone + Send + Sync + 'static {
    /// Request a backup of the app, annotated with the deployed `sequence`.
    async fn create_backup(&self, app: &App, sequence: i64) -> Result<Backup, BackupError>;

    /// Whether a backup of the app is still new or running.
    async fn has_unfinished_backup(&self, app_id: &AppId) -> Result<bool, BackupError>;

    async fn get_backup(&self, name: &str) -> Result<Option<Backup>, BackupError>;

    /// Restores are named after the backup they restore.
    async fn get_restore(&self, name: &str) -> Result<Option<Restore>, BackupError>;

    /// Request a restore of `backup_name`. Already existing is not an error.
    async fn create_restore(&self, backup_name: &str) -> Result<(), BackupError>;

    /// Delete a restore object. Already gone is not an error.
    async fn delete_restore(&self, name: &str) -> Result<(), BackupError>;
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{BackupError, BackupSystem};
    use async_trait::async_trait;
    use keel_core::{
        App, AppId, Backup, BackupPhase, Restore, RestorePhase, APP_ID_ANNOTATION,
        APP_SEQUENCE_ANNOTATION,
    };
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    /// Recorded backup-system call
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum BackupCall {
        CreateBackup { app_id: AppId },
        CreateRestore { backup_name: String },
        DeleteRestore { name: String },
    }

    #[derive(Default)]
    struct FakeBackupState {
        backups: BTreeMap<String, Backup>,
        restores: BTreeMap<String, Restore>,
        calls: Vec<BackupCall>,
        next_id: u32,
        unavailable: Option<String>,
    }

    /// In-memory backup system for testing
    #[derive(Clone, Default)]
    pub struct FakeBackupSystem {
        inner: Arc<Mutex<FakeBackupState>>,
    }

    impl FakeBackupSystem {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert_backup(&self, backup: Backup) {
            self.inner.lock().backups.insert(backup.name.clone(), backup);
        }

        pub fn set_backup_phase(&self, name: &str, phase: BackupPhase) {
            if let Some(b) = self.inner.lock().backups.get_mut(name) {
                b.phase = phase;
            }
        }

        pub fn set_restore_phase(&self, name: &str, phase: RestorePhase) {
            if let Some(r) = self.inner.lock().restores.get_mut(name) {
                r.phase = phase;
            }
        }

        /// Make every call fail until [`FakeBackupSystem::recover`].
        pub fn go_down(&self, reason: impl Into<String>) {
            self.inner.lock().unavailable = Some(reason.into());
        }

        pub fn recover(&self) {
            self.inner.lock().unavailable = None;
        }

        pub fn backups(&self) -> Vec<Backup> {
            self.inner.lock().backups.values().cloned().collect()
        }

        pub fn restore(&self, name: &str) -> Option<Restore> {
            self.inner.lock().restores.get(name).cloned()
        }

        pub fn calls(&self) -> Vec<BackupCall> {
            self.inner.lock().calls.clone()
        }

        fn check(&self) -> Result<(), BackupError> {
            match &self.inner.lock().unavailable {
                Some(reason) => Err(BackupError::Unavailable(reason.clone())),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl BackupSystem for FakeBackupSystem {
        async fn create_backup(&self, app: &App, sequence: i64) -> Result<Backup, BackupError> {
            self.check()?;
            let mut inner = self.inner.lock();
            inner.next_id += 1;
            let backup = Backup {
                name: format!("{}-{}", app.slug, inner.next_id),
                phase: BackupPhase::New,
                included_namespaces: vec!["default".to_string()],
                annotations: BTreeMap::from([
                    (APP_ID_ANNOTATION.to_string(), app.id.to_string()),
                    (APP_SEQUENCE_ANNOTATION.to_string(), sequence.to_string()),
                ]),
            };
            inner.backups.insert(backup.name.clone(), backup.clone());
            inner.calls.push(BackupCall::CreateBackup { app_id: app.id.clone() });
            Ok(backup)
        }

        async fn has_unfinished_backup(&self, app_id: &AppId) -> Result<bool, BackupError> {
            self.check()?;
            let inner = self.inner.lock();
            Ok(inner
                .backups
                .values()
                .any(|b| b.app_id().as_ref() == Some(app_id) && b.phase.is_unfinished()))
        }

        async fn get_backup(&self, name: &str) -> Result<Option<Backup>, BackupError> {
            self.check()?;
            Ok(self.inner.lock().backups.get(name).cloned())
        }

        async fn get_restore(&self, name: &str) -> Result<Option<Restore>, BackupError> {
            self.check()?;
            Ok(self.inner.lock().restores.get(name).cloned())
        }

        async fn create_restore(&self, backup_name: &str) -> Result<(), BackupError> {
            self.check()?;
            let mut inner = self.inner.lock();
            inner.calls.push(BackupCall::CreateRestore { backup_name: backup_name.to_string() });
            inner.restores.entry(backup_name.to_string()).or_insert_with(|| Restore {
                name: backup_name.to_string(),
                backup_name: backup_name.to_string(),
                phase: RestorePhase::New,
            });
            Ok(())
        }

        async fn delete_restore(&self, name: &str) -> Result<(), BackupError> {
            self.check()?;
            let mut inner = self.inner.lock();
            inner.calls.push(BackupCall::DeleteRestore { name: name.to_string() });
            inner.restores.remove(name);
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{BackupCall, FakeBackupSystem};

#[cfg(test)]
#[path = "backup_tests.rs"]
mod tests;
