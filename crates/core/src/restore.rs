// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restore/undeploy decision table.
//!
//! A restore runs in two halves. The undeploy half is pushed by us: the
//! agent is told to delete everything, and a callback later flips the stored
//! status. The restore half is run by the backup system, which we can only
//! poll. The decision is therefore split: [`plan`] looks only at the stored
//! undeploy status, and [`on_restore_observed`] looks at the restore object
//! once the undeploy has completed.
//!
//! | status     | restore object              | action          | next status |
//! |------------|-----------------------------|-----------------|-------------|
//! | Reset      | -                           | `Undeploy`      | InProcess   |
//! | InProcess  | -                           | `Wait`          | unchanged   |
//! | Completed  | absent                      | `CreateRestore` | unchanged   |
//! | Completed  | Completed                   | `Complete`      | Reset       |
//! | Completed  | Failed, PartiallyFailed     | `Abort`         | Reset       |
//! | Completed  | New, InProgress, other      | `Wait`          | unchanged   |
//! | Failed     | -                           | `Wait`          | unchanged   |

use crate::app::RestoreUndeployStatus;
use crate::backup::RestorePhase;

/// What the restore loop does for one app on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreAction {
    /// Deploy an empty manifest set over the current one and clear the
    /// backup's namespaces and volumes
    Undeploy,
    /// Nothing to do this tick
    Wait,
    /// Ask the backup system to restore the backup
    CreateRestore,
    /// Deploy the backup's sequence and clear the in-progress marker
    Complete,
    /// Clear the in-progress marker without retrying
    Abort,
}

impl RestoreAction {
    /// Undeploy status after this action has been carried out.
    pub fn next_status(self, current: RestoreUndeployStatus) -> RestoreUndeployStatus {
        match self {
            Self::Undeploy => RestoreUndeployStatus::InProcess,
            Self::Complete | Self::Abort => RestoreUndeployStatus::Reset,
            Self::Wait | Self::CreateRestore => current,
        }
    }
}

/// First-stage decision from the stored undeploy status alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorePlan {
    Act(RestoreAction),
    /// Look up the restore object and decide with [`on_restore_observed`]
    ObserveRestore,
}

pub fn plan(status: RestoreUndeployStatus) -> RestorePlan {
    match status {
        RestoreUndeployStatus::Reset => RestorePlan::Act(RestoreAction::Undeploy),
        RestoreUndeployStatus::InProcess => RestorePlan::Act(RestoreAction::Wait),
        RestoreUndeployStatus::Completed => RestorePlan::ObserveRestore,
        // Terminal until a user clears the restore
        RestoreUndeployStatus::Failed => RestorePlan::Act(RestoreAction::Wait),
    }
}

/// Second-stage decision once the undeploy has completed.
pub fn on_restore_observed(phase: Option<RestorePhase>) -> RestoreAction {
    match phase {
        None => RestoreAction::CreateRestore,
        Some(RestorePhase::Completed) => RestoreAction::Complete,
        Some(RestorePhase::Failed | RestorePhase::PartiallyFailed) => RestoreAction::Abort,
        Some(RestorePhase::New | RestorePhase::InProgress | RestorePhase::FailedValidation) => {
            RestoreAction::Wait
        }
    }
}

#[cfg(test)]
#[path = "restore_tests.rs"]
mod tests;
