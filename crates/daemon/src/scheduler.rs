// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot scheduler.
//!
//! Turns each app's cron expression into backups, using the store's
//! scheduled-snapshot rows as a single-slot delay queue. A row is pending
//! until it is stamped with the name of the backup created for it. Rows are
//! read through [`Store::claim_pending_scheduled_snapshots`] so two
//! schedulers never act on the same due row.

use std::time::Duration;

use keel_core::{next_occurrence, App, Clock, ScheduleError, ScheduledSnapshot};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backup::{BackupError, BackupSystem};
use crate::reconcile::{join_all, run_every};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Backup(#[from] BackupError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// What one tick did for one app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// No schedule, or a restore is running.
    Skipped,
    /// No pending row existed; the next occurrence was queued.
    Bootstrapped,
    /// The earliest pending row is not due yet.
    NotDue,
    /// Due, but a backup for the app is still running.
    Postponed,
    /// Due, but no downstream has a version deployed yet.
    NotDeployed,
    /// A backup was created and its row stamped.
    BackedUp { backup_name: String },
}

#[derive(Clone)]
pub struct SnapshotScheduler<S, B, C> {
    store: S,
    backups: B,
    clock: C,
    period: Duration,
}

impl<S, B, C> SnapshotScheduler<S, B, C>
where
    S: Store,
    B: BackupSystem,
    C: Clock,
{
    pub fn new(store: S, backups: B, clock: C, period: Duration) -> Self {
        Self { store, backups, clock, period }
    }

    pub async fn run(self, cancel: CancellationToken) {
        run_every("scheduler", self.period, cancel, || self.tick()).await;
    }

    /// One pass over every app in the store.
    pub async fn tick(&self) {
        let apps = match self.store.list_apps().await {
            Ok(apps) => apps,
            Err(e) => {
                warn!(error = %e, "listing apps for snapshot schedule");
                return;
            }
        };

        let mut tasks = JoinSet::new();
        for app in apps {
            let this = self.clone();
            tasks.spawn(async move {
                match this.schedule_app(&app).await {
                    Ok(outcome) => debug!(app_id = %app.id, ?outcome, "snapshot schedule"),
                    Err(e) => warn!(app_id = %app.id, error = %e, "snapshot schedule failed"),
                }
            });
        }
        join_all("scheduler", tasks).await;
    }

    pub async fn schedule_app(&self, app: &App) -> Result<ScheduleOutcome, SchedulerError> {
        let Some(schedule) = app.snapshot_schedule() else {
            return Ok(ScheduleOutcome::Skipped);
        };
        if app.restore_in_progress().is_some() {
            return Ok(ScheduleOutcome::Skipped);
        }

        let now = self.clock.now();
        // Held until return so another scheduler skips these rows.
        let claim = self.store.claim_pending_scheduled_snapshots(&app.id).await?;

        let Some(due) = claim.pending().first() else {
            let at = next_occurrence(schedule, now)?;
            let row = ScheduledSnapshot::pending(app.id.clone(), at);
            self.store.create_scheduled_snapshot(row).await?;
            info!(app_id = %app.id, at = %at, "first snapshot scheduled");
            return Ok(ScheduleOutcome::Bootstrapped);
        };

        if !due.is_due(now) {
            return Ok(ScheduleOutcome::NotDue);
        }

        if self.backups.has_unfinished_backup(&app.id).await? {
            info!(app_id = %app.id, "previous backup still running, postponing snapshot");
            return Ok(ScheduleOutcome::Postponed);
        }

        let Some(sequence) = self.deployed_sequence(app).await? else {
            info!(app_id = %app.id, "no deployed version, postponing snapshot");
            return Ok(ScheduleOutcome::NotDeployed);
        };

        let backup = self.backups.create_backup(app, sequence).await?;
        self.store.update_scheduled_snapshot(&due.id, &backup.name).await?;
        info!(app_id = %app.id, backup = %backup.name, "scheduled snapshot created");

        if claim.pending().len() > 1 {
            self.store.delete_pending_scheduled_snapshots(&app.id).await?;
            warn!(
                app_id = %app.id,
                removed = claim.pending().len() - 1,
                "removed duplicate pending snapshots"
            );
        }

        let at = next_occurrence(schedule, now)?;
        let row = ScheduledSnapshot::pending(app.id.clone(), at);
        self.store.create_scheduled_snapshot(row).await?;
        Ok(ScheduleOutcome::BackedUp { backup_name: backup.name })
    }

    /// Sequence running on the app's first downstream that has one deployed.
    ///
    /// This can trail `app.current_sequence`, which moves as soon as a new
    /// version is rendered.
    async fn deployed_sequence(&self, app: &App) -> Result<Option<i64>, SchedulerError> {
        for cluster_id in self.store.list_downstreams_for_app(&app.id).await? {
            if let Some(version) = self.store.get_current_version(&app.id, &cluster_id).await? {
                return Ok(Some(version.sequence));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
