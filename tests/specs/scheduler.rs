//! Scheduled snapshot specs
//!
//! Each app with a snapshot schedule keeps exactly one pending entry;
//! a due entry becomes a backup unless one is already running.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::prelude::*;

const EVERY_15_MIN: &str = "*/15 * * * *";

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, hour, minute, 0).unwrap()
}

fn scheduled_world() -> World {
    let world = World::new();
    world.store.insert_app(
        App::builder().id(APP).slug("app-a").snapshot_schedule(EVERY_15_MIN).build(),
    );
    world.release(1);
    world
}

fn pending(world: &World) -> Vec<ScheduledSnapshot> {
    world
        .store
        .scheduled_snapshots(&app_id())
        .into_iter()
        .filter(ScheduledSnapshot::is_pending)
        .collect()
}

#[tokio::test]
async fn schedule_produces_backups_as_time_passes() {
    let world = scheduled_world();

    world.scheduler.tick().await;
    assert_eq!(pending(&world)[0].scheduled_timestamp, at(0, 15));

    world.clock.set(at(0, 16));
    world.scheduler.tick().await;

    let backups = world.backups.backups();
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].app_id(), Some(app_id()));
    let next = pending(&world);
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].scheduled_timestamp, at(0, 30));
}

#[tokio::test]
async fn backup_records_the_sequence_running_on_the_cluster() {
    let world = scheduled_world();
    let mut app = world.app();
    app.current_sequence = 2;
    world.store.insert_app(app);
    world.scheduler.tick().await;
    world.clock.set(at(0, 15));

    world.scheduler.tick().await;

    let backups = world.backups.backups();
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].app_sequence(), Some(1));
}

#[tokio::test]
async fn due_entry_waits_while_a_backup_runs() {
    let world = scheduled_world();
    world.scheduler.tick().await;
    world.backups.insert_backup(Backup {
        name: "app-a-manual".to_string(),
        phase: BackupPhase::InProgress,
        included_namespaces: vec![],
        annotations: BTreeMap::from([(APP_ID_ANNOTATION.to_string(), APP.to_string())]),
    });
    world.clock.set(at(0, 20));

    world.scheduler.tick().await;
    assert_eq!(world.backups.backups().len(), 1);
    assert_eq!(pending(&world)[0].scheduled_timestamp, at(0, 15));

    world.backups.set_backup_phase("app-a-manual", BackupPhase::Completed);
    world.scheduler.tick().await;

    assert_eq!(world.backups.backups().len(), 2);
    assert_eq!(pending(&world)[0].scheduled_timestamp, at(0, 30));
}

#[tokio::test]
async fn restoring_app_is_not_backed_up() {
    let world = scheduled_world();
    world.scheduler.tick().await;
    world.store.start_restore(&app_id(), "app-a-old").unwrap();
    world.clock.set(at(1, 0));

    world.scheduler.tick().await;

    assert!(world.backups.backups().is_empty());
    assert_eq!(pending(&world).len(), 1);
}

#[tokio::test]
async fn replicas_sharing_a_store_back_up_once() {
    let world = scheduled_world();
    world.scheduler.tick().await;
    world.clock.set(at(0, 15));
    let replica = SnapshotScheduler::new(
        world.store.clone(),
        world.backups.clone(),
        world.clock.clone(),
        Duration::from_secs(60),
    );

    let app = world.app();
    let (a, b) = tokio::join!(world.scheduler.schedule_app(&app), replica.schedule_app(&app));

    let backed_up = [a.unwrap(), b.unwrap()]
        .into_iter()
        .filter(|o| matches!(o, ScheduleOutcome::BackedUp { .. }))
        .count();
    assert_eq!(backed_up, 1);
    assert_eq!(world.backups.backups().len(), 1);
}

#[tokio::test]
async fn clearing_the_schedule_stops_backups() {
    let world = scheduled_world();
    world.scheduler.tick().await;
    world.store.insert_app(App::builder().id(APP).slug("app-a").build());
    world.clock.set(at(2, 0));

    world.scheduler.tick().await;

    assert!(world.backups.backups().is_empty());
}
