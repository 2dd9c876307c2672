//! Deploy loop specs
//!
//! Each connected agent receives the downstream's current version once,
//! along with the previous version's manifests so it can prune resources.

use crate::prelude::*;

#[tokio::test]
async fn agent_receives_current_version_once() {
    let world = World::new();
    world.release(1);
    let mut agent = world.agent().await;

    world.tick().await;
    let events = agent.events();

    let sent = deploys(&events);
    assert_eq!(sent.len(), 1);
    assert_eq!(applied(sent[0]), manifest(1));
    assert_eq!(sent[0].previous_manifests, "");
    assert_eq!(sent[0].namespace, "apps");
    assert_eq!(sent[0].app_slug, "app-a");

    world.tick().await;
    assert!(agent.events().is_empty(), "second tick should be quiet");
}

#[tokio::test]
async fn new_release_carries_previous_manifests() {
    let world = World::new();
    world.release(1);
    let mut agent = world.agent().await;
    world.tick().await;
    agent.events();

    world.release(2);
    world.tick().await;

    let events = agent.events();
    let sent = deploys(&events);
    assert_eq!(sent.len(), 1);
    assert_eq!(applied(sent[0]), manifest(2));
    assert_eq!(removed(sent[0]), manifest(1));
}

#[tokio::test]
async fn rollback_redeploys_an_older_sequence() {
    let world = World::new();
    world.release(1);
    world.release(2);
    let mut agent = world.agent().await;
    world.tick().await;
    agent.events();

    world.store.deploy_version(&app_id(), 1).await.unwrap();
    world.tick().await;

    let events = agent.events();
    let sent = deploys(&events);
    assert_eq!(sent.len(), 1);
    assert_eq!(applied(sent[0]), manifest(1));
    assert_eq!(removed(sent[0]), manifest(2));
}

#[tokio::test]
async fn reconnecting_agent_starts_with_a_cold_cache() {
    let world = World::new();
    world.release(3);
    let first = world.agent().await;
    world.tick().await;
    first.disconnect(&world.registry);

    let mut second = world.agent().await;
    world.tick().await;

    let events = second.events();
    assert_eq!(deploys(&events).len(), 1);
    assert_eq!(applied(deploys(&events)[0]), manifest(3));
}

#[tokio::test]
async fn deploy_without_informers_marks_app_ready() {
    let world = World::new();
    world.release(1);
    let _agent = world.agent().await;

    world.tick().await;

    let status = world.store.app_status(&app_id()).unwrap();
    assert_eq!(status.state.to_string(), "ready");
    assert!(status.resource_states.is_empty());
}

#[tokio::test]
async fn render_failure_fails_the_version_until_a_new_release() {
    let world = World::new();
    world.release(1);
    let mut agent = world.agent().await;
    world.renderer.fail_with("bad template");

    world.tick().await;
    world.tick().await;

    assert!(agent.events().is_empty());
    let failed = world.store.downstream_version(&app_id(), &cluster_id(), 1).unwrap();
    assert_eq!(failed.status, VersionStatus::Failed);
    assert!(failed.status_info.unwrap().contains("bad template"));
    assert_eq!(world.renderer.renders(), 1, "failed sequence is not re-rendered");

    world.renderer.succeed();
    world.release(2);
    world.tick().await;

    assert_eq!(deploys(&agent.events()).len(), 1);
}

#[tokio::test]
async fn nothing_is_sent_without_a_connection() {
    let world = World::new();
    world.release(1);

    world.tick().await;

    assert_eq!(world.renderer.renders(), 0);
    assert!(world.store.app_status(&app_id()).is_none());
}
