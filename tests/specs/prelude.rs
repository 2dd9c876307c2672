//! Shared world for the scenarios: one cluster, one app, fake collaborators.

use std::time::Duration;

pub use keel_core::test_support::{archive, version};
pub use keel_core::{
    App, AppId, Backup, BackupPhase, Clock, ClusterId, ConnectionId, DownstreamCluster,
    FakeClock, RestorePhase, RestoreUndeployStatus, ScheduledSnapshot, VersionStatus,
    APP_ID_ANNOTATION, APP_SEQUENCE_ANNOTATION,
};
pub use keel_daemon::{
    AgentConnection, BackupCall, FakeBackupSystem, FakeRenderer, MemoryStore, ReconcileConfig,
    Reconciler, Registry, RegistryError, ScheduleOutcome, SnapshotScheduler, Store,
};
pub use keel_wire::{AgentEvent, DeployArgs};

pub const APP: &str = "app-a";
pub const CLUSTER: &str = "cls-c";
pub const TOKEN: &str = "tok-c";

pub struct World {
    pub store: MemoryStore,
    pub renderer: FakeRenderer,
    pub backups: FakeBackupSystem,
    pub registry: Registry,
    pub clock: FakeClock,
    pub reconciler: Reconciler<MemoryStore, FakeRenderer, FakeBackupSystem, FakeClock>,
    pub scheduler: SnapshotScheduler<MemoryStore, FakeBackupSystem, FakeClock>,
}

impl World {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        seed(&store);
        Self::with_store(store)
    }

    /// A world sharing `store` with another, as a second control plane replica would.
    pub fn with_store(store: MemoryStore) -> Self {
        let renderer = FakeRenderer::new();
        let backups = FakeBackupSystem::new();
        let registry = Registry::new(32);
        let clock = FakeClock::new();
        let reconciler = Reconciler::new(
            store.clone(),
            renderer.clone(),
            backups.clone(),
            registry.clone(),
            clock.clone(),
            ReconcileConfig { app_namespace: "apps".to_string(), ..ReconcileConfig::default() },
        );
        let scheduler = SnapshotScheduler::new(
            store.clone(),
            backups.clone(),
            clock.clone(),
            Duration::from_secs(60),
        );
        Self { store, renderer, backups, registry, clock, reconciler, scheduler }
    }

    /// Connect an agent for the world's cluster with its deploy token.
    pub async fn agent(&self) -> Agent {
        let conn = self
            .registry
            .on_connect(&self.store, ConnectionId::generate(), TOKEN)
            .await
            .unwrap();
        Agent { conn }
    }

    /// Archive `sequence` and make it the deployed version.
    pub fn release(&self, sequence: i64) {
        release_into(&self.store, sequence);
    }

    /// One tick of each reconciliation loop.
    pub async fn tick(&self) {
        self.reconciler.deploy_tick().await;
        self.reconciler.support_bundle_tick().await;
        self.reconciler.restore_tick().await;
    }

    pub fn app(&self) -> App {
        self.store.app(&app_id()).unwrap()
    }

    pub fn current_sequence(&self) -> Option<i64> {
        self.store.downstream(&app_id(), &cluster_id()).and_then(|d| d.current_sequence)
    }
}

/// One cluster with one installed app targeting it.
pub fn seed(store: &MemoryStore) {
    store.add_cluster(
        DownstreamCluster { cluster_id: cluster_id(), name: "production".into() },
        TOKEN,
    );
    store.insert_app(App::builder().id(APP).slug("app-a").build());
    store.add_downstream(&app_id(), &cluster_id());
}

/// Archive `sequence`, make it the app's latest and deploy it to the cluster.
pub fn release_into(store: &MemoryStore, sequence: i64) {
    store.put_archive(&app_id(), sequence, archive(&manifest(sequence)));
    store.put_version(version(APP, CLUSTER, sequence, VersionStatus::Pending));
    store.promote(&app_id(), &cluster_id(), sequence).unwrap();

    let mut app = store.app(&app_id()).unwrap();
    app.current_sequence = app.current_sequence.max(sequence);
    store.insert_app(app);
}

pub fn app_id() -> AppId {
    AppId::new(APP)
}

pub fn cluster_id() -> ClusterId {
    ClusterId::new(CLUSTER)
}

pub fn manifest(sequence: i64) -> String {
    format!("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: app-a-{sequence}\n")
}

/// A connected agent as seen by the control plane.
pub struct Agent {
    pub conn: AgentConnection,
}

impl Agent {
    /// Everything queued for this agent so far.
    pub fn events(&mut self) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.conn.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn disconnect(self, registry: &Registry) {
        registry.on_disconnect(&self.conn.connection_id);
    }
}

pub fn deploys(events: &[AgentEvent]) -> Vec<&DeployArgs> {
    events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::Deploy(args) => Some(args),
            _ => None,
        })
        .collect()
}

pub fn applied(args: &DeployArgs) -> String {
    String::from_utf8(args.decoded_manifests().unwrap()).unwrap()
}

pub fn removed(args: &DeployArgs) -> String {
    String::from_utf8(args.decoded_previous_manifests().unwrap()).unwrap()
}
