// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Image pull secret for apps with a private registry.

use super::RenderError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use keel_core::RegistryDetails;
use std::collections::BTreeMap;

/// Name of the pull secret created next to every app
pub const PULL_SECRET_NAME: &str = "keel-registry";

const DOCKER_CONFIG_KEY: &str = ".dockerconfigjson";

/// `kubernetes.io/dockerconfigjson` Secret manifest for `namespace`.
///
/// Serialized as JSON, which agents apply like any YAML document.
pub fn pull_secret_manifest(
    details: &RegistryDetails,
    namespace: &str,
) -> Result<String, RenderError> {
    let host = details.hostname.trim();
    if host.is_empty() {
        return Err(RenderError::PullSecret("registry hostname is empty".to_string()));
    }
    let auth = STANDARD.encode(format!("{}:{}", details.username, details.password));
    let config = serde_json::json!({
        "auths": {
            host: {
                "username": details.username,
                "password": details.password,
                "auth": auth,
            }
        }
    });
    let config =
        serde_json::to_vec(&config).map_err(|e| RenderError::PullSecret(e.to_string()))?;

    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(PULL_SECRET_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        type_: Some("kubernetes.io/dockerconfigjson".to_string()),
        data: Some(BTreeMap::from([(DOCKER_CONFIG_KEY.to_string(), ByteString(config))])),
        ..Default::default()
    };
    serde_json::to_string(&secret).map_err(|e| RenderError::PullSecret(e.to_string()))
}
