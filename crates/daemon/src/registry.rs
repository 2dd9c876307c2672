// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection registry for cluster agents.
//!
//! Tracks which agent connections are live and the per-connection caches
//! the deploy loop uses to avoid redundant pushes. The caches are hints:
//! losing them costs one redundant push, never correctness.
//!
//! The lock is only held to copy data in or out. Sends are `try_send` on a
//! bounded per-connection queue, so a slow agent drops events instead of
//! stalling a reconciliation loop.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use keel_core::{AppId, ClusterId, ConnectionId};
use keel_wire::AgentEvent;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::store::{Store, StoreError};

/// Errors from registering an agent connection
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("agent presented an unknown deploy token")]
    Unauthorized,
    #[error("resolving deploy token: {0}")]
    Store(#[from] StoreError),
}

/// Registry-side record of one agent connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSocket {
    pub cluster_id: ClusterId,
    pub connection_id: ConnectionId,
    /// Preflight URIs already pushed on this connection
    pub sent_preflight_urls: HashSet<String>,
    /// Last sequence pushed per app on this connection
    pub last_deployed_sequences: HashMap<AppId, i64>,
}

impl ClusterSocket {
    fn new(cluster_id: ClusterId, connection_id: ConnectionId) -> Self {
        Self {
            cluster_id,
            connection_id,
            sent_preflight_urls: HashSet::new(),
            last_deployed_sequences: HashMap::new(),
        }
    }
}

/// A registered connection, handed back to the transport.
#[derive(Debug)]
pub struct AgentConnection {
    pub connection_id: ConnectionId,
    pub cluster_id: ClusterId,
    /// Events the transport must write to the agent
    pub events: mpsc::Receiver<AgentEvent>,
}

struct Entry {
    socket: ClusterSocket,
    tx: mpsc::Sender<AgentEvent>,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, Entry>,
    /// Broadcast groups: every live connection per cluster
    groups: BTreeMap<ClusterId, BTreeSet<ConnectionId>>,
}

/// Shared, cloneable registry handle.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Mutex<Inner>>,
    queue_capacity: usize,
}

impl Registry {
    pub fn new(queue_capacity: usize) -> Self {
        Self { inner: Arc::default(), queue_capacity: queue_capacity.max(1) }
    }

    /// Authenticate an agent and register its connection.
    ///
    /// The token is resolved before the registry lock is taken.
    pub async fn on_connect<S: Store>(
        &self,
        store: &S,
        connection_id: ConnectionId,
        token: &str,
    ) -> Result<AgentConnection, RegistryError> {
        let cluster_id = match store.get_cluster_id_from_deploy_token(token).await {
            Ok(id) => id,
            Err(StoreError::InvalidToken) => return Err(RegistryError::Unauthorized),
            Err(e) => return Err(e.into()),
        };
        let events = self.register(connection_id.clone(), cluster_id.clone());
        Ok(AgentConnection { connection_id, cluster_id, events })
    }

    /// Register an already-authenticated connection.
    ///
    /// Re-registering an ID replaces the old record and closes its queue.
    pub fn register(
        &self,
        connection_id: ConnectionId,
        cluster_id: ClusterId,
    ) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let socket = ClusterSocket::new(cluster_id.clone(), connection_id.clone());
        let mut inner = self.inner.lock();
        if let Some(old) = inner.connections.insert(connection_id.clone(), Entry { socket, tx }) {
            remove_from_group(&mut inner.groups, &old.socket.cluster_id, &connection_id);
        }
        inner.groups.entry(cluster_id.clone()).or_default().insert(connection_id.clone());
        drop(inner);

        info!(cluster_id = %cluster_id, connection_id = %connection_id, "agent connected");
        rx
    }

    /// Drop a connection's record. Returns it if it was registered.
    pub fn on_disconnect(&self, connection_id: &ConnectionId) -> Option<ClusterSocket> {
        let mut inner = self.inner.lock();
        let entry = inner.connections.remove(connection_id)?;
        remove_from_group(&mut inner.groups, &entry.socket.cluster_id, connection_id);
        drop(inner);

        info!(
            cluster_id = %entry.socket.cluster_id,
            connection_id = %connection_id,
            "agent disconnected"
        );
        Some(entry.socket)
    }

    /// Copy of every live connection record, ordered by connection ID.
    pub fn sockets(&self) -> Vec<ClusterSocket> {
        let inner = self.inner.lock();
        let mut sockets: Vec<_> = inner.connections.values().map(|e| e.socket.clone()).collect();
        sockets.sort_by(|a, b| a.connection_id.cmp(&b.connection_id));
        sockets
    }

    /// Clusters with at least one live connection.
    pub fn clusters(&self) -> Vec<ClusterId> {
        self.inner.lock().groups.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send to every connection of a cluster. Returns how many queues
    /// accepted the event.
    pub fn emit(&self, cluster_id: &ClusterId, event: &AgentEvent) -> usize {
        let targets: Vec<(ConnectionId, mpsc::Sender<AgentEvent>)> = {
            let inner = self.inner.lock();
            let Some(group) = inner.groups.get(cluster_id) else {
                return 0;
            };
            group
                .iter()
                .filter_map(|id| inner.connections.get(id).map(|e| (id.clone(), e.tx.clone())))
                .collect()
        };
        targets.iter().filter(|(id, tx)| try_send(id, tx, event.clone())).count()
    }

    /// Send to one connection. Returns whether its queue accepted the event.
    pub fn emit_to(&self, connection_id: &ConnectionId, event: AgentEvent) -> bool {
        let tx = self.inner.lock().connections.get(connection_id).map(|e| e.tx.clone());
        match tx {
            Some(tx) => try_send(connection_id, &tx, event),
            None => false,
        }
    }

    /// Cache the sequence last pushed to `connection_id` for `app_id`.
    pub fn record_deployed(&self, connection_id: &ConnectionId, app_id: &AppId, sequence: i64) {
        if let Some(entry) = self.inner.lock().connections.get_mut(connection_id) {
            entry.socket.last_deployed_sequences.insert(app_id.clone(), sequence);
        }
    }

    /// Mark a preflight URI as sent. Returns `false` if it was already sent
    /// on this connection or the connection is gone.
    pub fn record_preflight_sent(&self, connection_id: &ConnectionId, uri: &str) -> bool {
        match self.inner.lock().connections.get_mut(connection_id) {
            Some(entry) => entry.socket.sent_preflight_urls.insert(uri.to_string()),
            None => false,
        }
    }
}

fn remove_from_group(
    groups: &mut BTreeMap<ClusterId, BTreeSet<ConnectionId>>,
    cluster_id: &ClusterId,
    connection_id: &ConnectionId,
) {
    if let Some(group) = groups.get_mut(cluster_id) {
        group.remove(connection_id);
        if group.is_empty() {
            groups.remove(cluster_id);
        }
    }
}

fn try_send(connection_id: &ConnectionId, tx: &mpsc::Sender<AgentEvent>, event: AgentEvent) -> bool {
    let name = event.name();
    match tx.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(connection_id = %connection_id, event = name, "agent queue full, dropping event");
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!(connection_id = %connection_id, event = name, "agent queue closed");
            false
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
