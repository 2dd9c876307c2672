// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for reconciliation loop tests.

use keel_core::test_support::{archive, version};
use keel_core::{App, AppId, ClusterId, ConnectionId, DownstreamCluster, FakeClock, VersionStatus};
use keel_wire::AgentEvent;
use tokio::sync::mpsc;

use super::{ReconcileConfig, Reconciler};
use crate::backup::FakeBackupSystem;
use crate::registry::Registry;
use crate::render::FakeRenderer;
use crate::store::MemoryStore;

pub const APP: &str = "app-1";
pub const CLUSTER: &str = "cls-1";

pub type TestReconciler = Reconciler<MemoryStore, FakeRenderer, FakeBackupSystem, FakeClock>;

pub struct Harness {
    pub store: MemoryStore,
    pub renderer: FakeRenderer,
    pub backups: FakeBackupSystem,
    pub registry: Registry,
    pub clock: FakeClock,
    pub reconciler: TestReconciler,
}

impl Harness {
    /// One cluster with one installed app targeting it.
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let renderer = FakeRenderer::new();
        let backups = FakeBackupSystem::new();
        let registry = Registry::new(16);
        let clock = FakeClock::new();
        let reconciler = Reconciler::new(
            store.clone(),
            renderer.clone(),
            backups.clone(),
            registry.clone(),
            clock.clone(),
            ReconcileConfig { app_namespace: "apps".to_string(), ..ReconcileConfig::default() },
        );

        store.add_cluster(
            DownstreamCluster { cluster_id: ClusterId::new(CLUSTER), name: "prod".into() },
            "tok-1",
        );
        store.insert_app(App::builder().id(APP).build());
        store.add_downstream(&app_id(), &cluster_id());

        Self { store, renderer, backups, registry, clock, reconciler }
    }

    /// Register an agent connection for the test cluster.
    pub fn connect(&self, connection_id: &str) -> mpsc::Receiver<AgentEvent> {
        self.registry.register(ConnectionId::new(connection_id), cluster_id())
    }

    /// Archive `sequence`, add its version row and make it current.
    pub fn deploy_sequence(&self, sequence: i64) {
        self.add_version(sequence, VersionStatus::Pending);
        self.store.promote(&app_id(), &cluster_id(), sequence).unwrap();
    }

    pub fn add_version(&self, sequence: i64, status: VersionStatus) {
        let manifest = format!("kind: ConfigMap # {sequence}");
        self.store.put_archive(&app_id(), sequence, archive(&manifest));
        self.store.put_version(version(APP, CLUSTER, sequence, status));
    }

    pub fn app(&self) -> App {
        self.store.app(&app_id()).unwrap()
    }
}

pub fn app_id() -> AppId {
    AppId::new(APP)
}

pub fn cluster_id() -> ClusterId {
    ClusterId::new(CLUSTER)
}

/// Everything queued on a connection so far.
pub fn drain(rx: &mut mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn names(events: &[AgentEvent]) -> Vec<&'static str> {
    events.iter().map(AgentEvent::name).collect()
}
