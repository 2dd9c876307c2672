//! Connection registry specs
//!
//! Agents authenticate with their cluster's deploy token. Support bundle
//! requests fan out to every connection of the cluster.

use crate::prelude::*;

#[tokio::test]
async fn unknown_token_is_refused() {
    let world = World::new();

    let result =
        world.registry.on_connect(&world.store, ConnectionId::generate(), "stolen").await;

    assert!(matches!(result, Err(RegistryError::Unauthorized)));
    assert!(world.registry.is_empty());
}

#[tokio::test]
async fn token_resolves_to_its_cluster() {
    let world = World::new();

    let agent = world.agent().await;

    assert_eq!(agent.conn.cluster_id, cluster_id());
    assert_eq!(world.registry.clusters(), vec![cluster_id()]);
}

#[tokio::test]
async fn support_bundle_reaches_every_agent_of_the_cluster() {
    let world = World::new();
    world.release(1);
    let mut a = world.agent().await;
    let mut b = world.agent().await;
    world.store.queue_support_bundle(&app_id(), &cluster_id(), world.clock.now()).await.unwrap();

    world.reconciler.support_bundle_tick().await;

    for agent in [&mut a, &mut b] {
        let bundles: Vec<_> = agent
            .events()
            .into_iter()
            .filter(|e| matches!(e, AgentEvent::SupportBundle(_)))
            .collect();
        assert_eq!(bundles.len(), 1);
    }
    assert!(world.store.pending_support_bundles().is_empty());
}

#[tokio::test]
async fn disconnected_agent_leaves_the_registry() {
    let world = World::new();
    let a = world.agent().await;
    let _b = world.agent().await;
    assert_eq!(world.registry.len(), 2);

    a.disconnect(&world.registry);

    assert_eq!(world.registry.len(), 1);
    assert_eq!(world.registry.clusters(), vec![cluster_id()]);
}

#[tokio::test]
async fn each_connection_tracks_its_own_deploys() {
    let world = World::new();
    world.release(4);
    let mut a = world.agent().await;
    world.tick().await;
    a.events();

    let mut b = world.agent().await;
    world.tick().await;

    assert!(a.events().is_empty());
    assert_eq!(deploys(&b.events()).len(), 1);
    for socket in world.registry.sockets() {
        assert_eq!(socket.last_deployed_sequences.get(&app_id()), Some(&4));
    }
}
