// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Downstreams: which app targets which cluster, and at which version.

use crate::id::{AppId, ClusterId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A target cluster known to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownstreamCluster {
    pub cluster_id: ClusterId,
    pub name: String,
}

/// An (app, cluster) targeting relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Downstream {
    pub app_id: AppId,
    pub cluster_id: ClusterId,
    /// Sequence currently considered deployed for this pairing
    #[serde(default)]
    pub current_sequence: Option<i64>,
    /// Sequence that was deployed before `current_sequence`
    #[serde(default)]
    pub previous_sequence: Option<i64>,
}

impl Downstream {
    pub fn new(app_id: AppId, cluster_id: ClusterId) -> Self {
        Self { app_id, cluster_id, current_sequence: None, previous_sequence: None }
    }

    /// Move the deployed pointer, remembering the old one.
    pub fn promote(&mut self, sequence: i64) {
        if self.current_sequence == Some(sequence) {
            return;
        }
        self.previous_sequence = self.current_sequence;
        self.current_sequence = Some(sequence);
    }
}

/// Lifecycle of a downstream version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    #[default]
    Pending,
    PendingConfig,
    PendingPreflight,
    PendingDownload,
    Deploying,
    Deployed,
    Failed,
    Unknown,
}

crate::simple_display! {
    VersionStatus {
        Pending => "pending",
        PendingConfig => "pending_config",
        PendingPreflight => "pending_preflight",
        PendingDownload => "pending_download",
        Deploying => "deploying",
        Deployed => "deployed",
        Failed => "failed",
        Unknown => "unknown",
    }
}

/// One version promoted to a downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownstreamVersion {
    pub app_id: AppId,
    pub cluster_id: ClusterId,
    pub sequence: i64,
    /// Rendered artifact this version was built from; differs from
    /// `sequence` after a rollback
    pub parent_sequence: i64,
    pub status: VersionStatus,
    #[serde(default)]
    pub status_info: Option<String>,
    pub created_at_ms: i64,
    #[serde(default)]
    pub applied_at_ms: Option<i64>,
}

/// Files of one rendered app version, keyed by archive-relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionArchive {
    pub files: BTreeMap<String, Vec<u8>>,
}

impl VersionArchive {
    pub fn with_file(mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }
}

/// Private registry credentials configured for an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryDetails {
    pub hostname: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[cfg(test)]
#[path = "downstream_tests.rs"]
mod tests;
