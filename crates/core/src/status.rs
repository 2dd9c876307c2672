// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application status as reported by agent informers.

use crate::id::AppId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health of a resource or of a whole app.
///
/// Variants are declared worst to best so `Ord` ranks `Missing` lowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Missing,
    Unavailable,
    Degraded,
    Ready,
}

crate::simple_display! {
    State {
        Missing => "missing",
        Unavailable => "unavailable",
        Degraded => "degraded",
        Ready => "ready",
    }
}

/// State of one informer-watched resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceState {
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub state: State,
}

/// Aggregated status of an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStatus {
    pub app_id: AppId,
    pub updated_at: DateTime<Utc>,
    pub resource_states: Vec<ResourceState>,
    pub state: State,
}

impl AppStatus {
    /// Status derived from informer results.
    pub fn from_resources(
        app_id: AppId,
        resource_states: Vec<ResourceState>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let state = aggregate_state(&resource_states);
        Self { app_id, updated_at, resource_states, state }
    }

    /// Status for an app that declares no informers: healthy by definition.
    pub fn ready_without_informers(app_id: AppId, updated_at: DateTime<Utc>) -> Self {
        Self { app_id, updated_at, resource_states: Vec::new(), state: State::Ready }
    }
}

/// Worst state among the resources; an empty list is `Missing`.
pub fn aggregate_state(resource_states: &[ResourceState]) -> State {
    resource_states.iter().map(|r| r.state).min().unwrap_or(State::Missing)
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
