// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Duration;

fn backup_with(annotations: &[(&str, &str)]) -> Backup {
    Backup {
        name: "b-1".to_string(),
        phase: BackupPhase::Completed,
        included_namespaces: vec!["default".to_string()],
        annotations: annotations.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
    }
}

#[test]
fn app_sequence_reads_annotation() {
    let backup = backup_with(&[(APP_SEQUENCE_ANNOTATION, "7"), (APP_ID_ANNOTATION, "app-1")]);
    assert_eq!(backup.app_sequence(), Some(7));
    assert_eq!(backup.app_id(), Some(AppId::new("app-1")));
}

#[yare::parameterized(
    missing   = { &[] },
    not_a_num = { &[(APP_SEQUENCE_ANNOTATION, "seven")] },
)]
fn app_sequence_absent_or_invalid(annotations: &[(&str, &str)]) {
    assert_eq!(backup_with(annotations).app_sequence(), None);
}

#[yare::parameterized(
    new         = { "", BackupPhase::New, true },
    in_progress = { "InProgress", BackupPhase::InProgress, true },
    completed   = { "Completed", BackupPhase::Completed, false },
    partial     = { "PartiallyFailed", BackupPhase::PartiallyFailed, false },
    failed      = { "Failed", BackupPhase::Failed, false },
    validation  = { "FailedValidation", BackupPhase::FailedValidation, false },
    deleting    = { "Deleting", BackupPhase::Deleting, false },
)]
fn backup_phase_parse(raw: &str, phase: BackupPhase, unfinished: bool) {
    assert_eq!(BackupPhase::parse(raw), phase);
    assert_eq!(phase.is_unfinished(), unfinished);
}

#[test]
fn scheduled_snapshot_pending_and_due() {
    let now = Utc::now();
    let mut entry = ScheduledSnapshot::pending(AppId::new("a"), now + Duration::minutes(1));
    assert!(entry.is_pending());
    assert!(!entry.is_due(now));
    assert!(entry.is_due(now + Duration::minutes(1)));

    entry.backup_name = Some("b".to_string());
    assert!(!entry.is_pending());
}
