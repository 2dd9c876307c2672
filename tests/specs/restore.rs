//! Restore specs
//!
//! A restore undeploys the app, asks the backup system to restore, then
//! redeploys the sequence the backup was taken at.

use std::collections::BTreeMap;

use crate::prelude::*;

const BACKUP: &str = "app-a-20260101";

fn backup_at(sequence: i64) -> Backup {
    Backup {
        name: BACKUP.to_string(),
        phase: BackupPhase::Completed,
        included_namespaces: vec!["apps".to_string()],
        annotations: BTreeMap::from([
            (APP_ID_ANNOTATION.to_string(), APP.to_string()),
            (APP_SEQUENCE_ANNOTATION.to_string(), sequence.to_string()),
        ]),
    }
}

/// App running sequence 3 with an agent that has already applied it.
async fn deployed_world() -> (World, Agent) {
    let world = World::new();
    world.release(2);
    world.release(3);
    let mut agent = world.agent().await;
    world.tick().await;
    agent.events();
    world.backups.insert_backup(backup_at(2));
    (world, agent)
}

#[tokio::test]
async fn restore_journey_returns_the_app_to_the_backup_sequence() {
    let (world, mut agent) = deployed_world().await;
    world.store.start_restore(&app_id(), BACKUP).unwrap();

    // Undeploy everything the backup covers.
    world.tick().await;
    let events = agent.events();
    let undeploy = deploys(&events);
    assert_eq!(undeploy.len(), 1);
    assert_eq!(undeploy[0].manifests, "");
    assert_eq!(removed(undeploy[0]), manifest(3));
    assert_eq!(undeploy[0].clear_namespaces, vec!["apps".to_string()]);
    assert!(undeploy[0].clear_pvcs);
    assert_eq!(world.app().restore_undeploy_status, RestoreUndeployStatus::InProcess);

    // Nothing moves until the agent reports back.
    world.tick().await;
    assert!(agent.events().is_empty());
    assert!(world.backups.calls().is_empty());

    world
        .store
        .set_restore_undeploy_status(&app_id(), RestoreUndeployStatus::Completed)
        .await
        .unwrap();
    world.tick().await;
    assert_eq!(
        world.backups.calls(),
        vec![BackupCall::CreateRestore { backup_name: BACKUP.to_string() }]
    );

    // Restore still running.
    world.backups.set_restore_phase(BACKUP, RestorePhase::InProgress);
    world.tick().await;
    assert_eq!(world.app().restore_in_progress(), Some(BACKUP));

    world.backups.set_restore_phase(BACKUP, RestorePhase::Completed);
    world.tick().await;
    let app = world.app();
    assert_eq!(app.restore_in_progress(), None);
    assert_eq!(app.restore_undeploy_status, RestoreUndeployStatus::Reset);
    assert_eq!(world.current_sequence(), Some(2));
    assert!(world.backups.restore(BACKUP).is_none());

    // The next pass redeploys sequence 2 and collects a support bundle.
    world.tick().await;
    let events = agent.events();
    let redeploy = deploys(&events);
    assert_eq!(redeploy.len(), 1);
    assert_eq!(applied(redeploy[0]), manifest(2));
    assert_eq!(removed(redeploy[0]), manifest(3));
    assert!(events.iter().any(|e| matches!(e, AgentEvent::SupportBundle(_))));
    assert!(world.store.pending_support_bundles().is_empty());
}

#[tokio::test]
async fn failed_restore_leaves_the_app_where_it_was() {
    let (world, mut agent) = deployed_world().await;
    world.store.start_restore(&app_id(), BACKUP).unwrap();
    world.tick().await;
    world
        .store
        .set_restore_undeploy_status(&app_id(), RestoreUndeployStatus::Completed)
        .await
        .unwrap();
    world.tick().await;
    agent.events();

    world.backups.set_restore_phase(BACKUP, RestorePhase::PartiallyFailed);
    world.tick().await;

    let app = world.app();
    assert_eq!(app.restore_in_progress(), None);
    assert_eq!(world.current_sequence(), Some(3));
    assert!(world.store.pending_support_bundles().is_empty());

    world.tick().await;
    assert!(deploys(&agent.events()).is_empty());
}

#[tokio::test]
async fn failed_undeploy_stops_the_restore() {
    let (world, mut agent) = deployed_world().await;
    world.store.start_restore(&app_id(), BACKUP).unwrap();
    world.tick().await;
    agent.events();

    world
        .store
        .set_restore_undeploy_status(&app_id(), RestoreUndeployStatus::Failed)
        .await
        .unwrap();
    for _ in 0..3 {
        world.tick().await;
    }

    assert!(agent.events().is_empty());
    assert!(world.backups.calls().is_empty());
    assert_eq!(world.app().restore_undeploy_status, RestoreUndeployStatus::Failed);
    assert_eq!(world.app().restore_in_progress(), Some(BACKUP));
}

#[tokio::test]
async fn restore_waits_for_a_connected_agent() {
    let world = World::new();
    world.release(2);
    world.backups.insert_backup(backup_at(2));
    world.store.start_restore(&app_id(), BACKUP).unwrap();

    world.tick().await;
    assert_eq!(world.app().restore_undeploy_status, RestoreUndeployStatus::Reset);

    let mut agent = world.agent().await;
    world.tick().await;

    assert_eq!(world.app().restore_undeploy_status, RestoreUndeployStatus::InProcess);
    assert!(agent.events().iter().any(|e| matches!(e, AgentEvent::Deploy(a) if a.wait)));
}
