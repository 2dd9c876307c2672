// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events pushed from the control plane to cluster agents.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use keel_core::AppId;
use serde::{Deserialize, Serialize};

/// Callback path the agent reports deploy results to.
pub const DEPLOY_RESULT_CALLBACK: &str = "/api/v1/deploy/result";
/// Callback path the agent reports undeploy results to.
pub const UNDEPLOY_RESULT_CALLBACK: &str = "/api/v1/undeploy/result";

/// One event sent over an agent connection.
///
/// Serialized as `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum AgentEvent {
    #[serde(rename = "deploy")]
    Deploy(DeployArgs),
    #[serde(rename = "appInformers")]
    AppInformers(AppInformersArgs),
    #[serde(rename = "supportbundle")]
    SupportBundle(SupportBundleArgs),
    #[serde(rename = "preflight")]
    Preflight(PreflightArgs),
}

impl AgentEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Deploy(_) => "deploy",
            Self::AppInformers(_) => "appInformers",
            Self::SupportBundle(_) => "supportbundle",
            Self::Preflight(_) => "preflight",
        }
    }
}

/// Apply (or, with empty `manifests`, remove) an app's resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployArgs {
    pub app_id: AppId,
    pub app_slug: String,
    #[serde(default)]
    pub kubectl_version: String,
    #[serde(default)]
    pub additional_namespaces: Vec<String>,
    /// Pull secret manifest; empty when the app has no private registry
    #[serde(default)]
    pub image_pull_secret: String,
    pub namespace: String,
    /// Base64 of the previously applied manifests, used to compute deletions
    #[serde(default)]
    pub previous_manifests: String,
    /// Base64 of the manifests to apply
    #[serde(default)]
    pub manifests: String,
    #[serde(default)]
    pub wait: bool,
    pub result_callback: String,
    #[serde(default)]
    pub clear_namespaces: Vec<String>,
    #[serde(default, rename = "clearPVCs")]
    pub clear_pvcs: bool,
    #[serde(default)]
    pub annotate_slug: bool,
}

impl DeployArgs {
    /// Base64-encode a manifest set for `manifests` / `previous_manifests`.
    pub fn encode_manifests(raw: &[u8]) -> String {
        if raw.is_empty() {
            return String::new();
        }
        STANDARD.encode(raw)
    }

    pub fn decoded_manifests(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.manifests)
    }

    pub fn decoded_previous_manifests(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.previous_manifests)
    }
}

/// Status informers for the agent to watch, already rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInformersArgs {
    pub app_id: AppId,
    pub informers: Vec<String>,
}

/// Collect a support bundle using the spec published at `uri`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportBundleArgs {
    pub uri: String,
}

/// Run preflight checks from the spec at `uri`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightArgs {
    pub uri: String,
}

impl PreflightArgs {
    pub fn for_version(app_slug: &str, sequence: i64) -> Self {
        Self { uri: format!("/api/v1/preflight/app/{app_slug}/sequence/{sequence}") }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
