// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Render seam: turns a stored version archive into what agents apply.
//!
//! Templating and kustomize builds happen upstream; archives handed to the
//! control plane already carry rendered manifests under `rendered/`. The
//! [`Renderer`] trait keeps the loops independent of that split.

mod pull_secret;

pub use pull_secret::{pull_secret_manifest, PULL_SECRET_NAME};

use async_trait::async_trait;
use keel_core::{App, VersionArchive};
use serde::Deserialize;
use thiserror::Error;

/// Directory of rendered manifests inside a version archive
pub const RENDERED_DIR: &str = "rendered/";
/// Optional app metadata inside a version archive
pub const METADATA_FILE: &str = "keel-app.json";
/// Optional support bundle spec inside a version archive
pub const SUPPORT_BUNDLE_FILE: &str = "support-bundle.yaml";

/// Errors from rendering an app version
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("archive for {app} has no rendered manifests")]
    NoManifests { app: String },
    #[error("invalid keel-app.json: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("invalid status informer '{0}': expected [namespace/]kind/name")]
    Informer(String),
    #[error("pull secret: {0}")]
    PullSecret(String),
    #[error("render failed: {0}")]
    Failed(String),
}

/// One app version, ready to push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedVersion {
    /// Multi-document YAML
    pub manifests: Vec<u8>,
    pub kubectl_version: String,
    pub additional_namespaces: Vec<String>,
    /// Status informers as declared, before namespace defaulting
    pub status_informers: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppMetadata {
    #[serde(default)]
    kubectl_version: String,
    #[serde(default)]
    additional_namespaces: Vec<String>,
    #[serde(default)]
    status_informers: Vec<String>,
}

/// Produces agent payloads from version archives
#[async_trait]
pub trait Renderer: Clone + Send + Sync + 'static {
    async fn render_version(
        &self,
        app: &App,
        archive: &VersionArchive,
    ) -> Result<RenderedVersion, RenderError>;

    /// Collector/analyzer spec for a support bundle at this version.
    async fn render_support_bundle_spec(
        &self,
        app: &App,
        archive: &VersionArchive,
    ) -> Result<Vec<u8>, RenderError>;
}

/// Renders straight from the files of a version archive.
#[derive(Clone, Copy, Debug, Default)]
pub struct ArchiveRenderer;

#[async_trait]
impl Renderer for ArchiveRenderer {
    async fn render_version(
        &self,
        app: &App,
        archive: &VersionArchive,
    ) -> Result<RenderedVersion, RenderError> {
        let docs: Vec<&[u8]> = archive
            .files
            .iter()
            .filter(|(path, _)| is_rendered_manifest(path))
            .map(|(_, contents)| trim_document(contents))
            .filter(|doc| !doc.is_empty())
            .collect();
        if docs.is_empty() {
            return Err(RenderError::NoManifests { app: app.slug.clone() });
        }
        let manifests = docs.join(&b"\n---\n"[..]);

        let metadata = match archive.get(METADATA_FILE) {
            Some(raw) => serde_json::from_slice::<AppMetadata>(raw)?,
            None => AppMetadata::default(),
        };
        Ok(RenderedVersion {
            manifests,
            kubectl_version: metadata.kubectl_version,
            additional_namespaces: metadata.additional_namespaces,
            status_informers: metadata.status_informers,
        })
    }

    async fn render_support_bundle_spec(
        &self,
        app: &App,
        archive: &VersionArchive,
    ) -> Result<Vec<u8>, RenderError> {
        match archive.get(SUPPORT_BUNDLE_FILE) {
            Some(spec) => Ok(spec.to_vec()),
            None => Ok(default_support_bundle_spec(&app.slug).into_bytes()),
        }
    }
}

fn is_rendered_manifest(path: &str) -> bool {
    path.starts_with(RENDERED_DIR) && (path.ends_with(".yaml") || path.ends_with(".yml"))
}

/// Strip surrounding whitespace and document separators.
fn trim_document(raw: &[u8]) -> &[u8] {
    let mut doc = raw.trim_ascii();
    if let Some(rest) = doc.strip_prefix(b"---") {
        doc = rest.trim_ascii();
    }
    if let Some(rest) = doc.strip_suffix(b"---") {
        doc = rest.trim_ascii();
    }
    doc
}

fn default_support_bundle_spec(app_slug: &str) -> String {
    format!(
        "apiVersion: troubleshoot.sh/v1beta2\n\
         kind: SupportBundle\n\
         metadata:\n  name: {app_slug}\n\
         spec:\n  collectors:\n    - clusterInfo: {{}}\n    - clusterResources: {{}}\n"
    )
}

/// Qualify status informers with a namespace.
///
/// `kind/name` becomes `namespace/kind/name`; fully qualified entries pass
/// through unchanged.
pub fn render_informers(informers: &[String], namespace: &str) -> Result<Vec<String>, RenderError> {
    informers
        .iter()
        .map(|raw| {
            let informer = raw.trim();
            let parts: Vec<&str> = informer.split('/').collect();
            if parts.iter().any(|p| p.is_empty()) {
                return Err(RenderError::Informer(raw.clone()));
            }
            match parts.len() {
                2 => Ok(format!("{namespace}/{informer}")),
                3 => Ok(informer.to_string()),
                _ => Err(RenderError::Informer(raw.clone())),
            }
        })
        .collect()
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{ArchiveRenderer, RenderError, RenderedVersion, Renderer};
    use async_trait::async_trait;
    use keel_core::{App, VersionArchive};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeRendererState {
        renders: usize,
        fail_with: Option<String>,
    }

    /// Archive renderer with failure injection and a render counter
    #[derive(Clone, Default)]
    pub struct FakeRenderer {
        inner: Arc<Mutex<FakeRendererState>>,
    }

    impl FakeRenderer {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every subsequent render fail with `message`.
        pub fn fail_with(&self, message: impl Into<String>) {
            self.inner.lock().fail_with = Some(message.into());
        }

        pub fn succeed(&self) {
            self.inner.lock().fail_with = None;
        }

        /// Number of `render_version` calls so far
        pub fn renders(&self) -> usize {
            self.inner.lock().renders
        }

        fn check(&self) -> Result<(), RenderError> {
            let mut inner = self.inner.lock();
            inner.renders += 1;
            match &inner.fail_with {
                Some(msg) => Err(RenderError::Failed(msg.clone())),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn render_version(
            &self,
            app: &App,
            archive: &VersionArchive,
        ) -> Result<RenderedVersion, RenderError> {
            self.check()?;
            ArchiveRenderer.render_version(app, archive).await
        }

        async fn render_support_bundle_spec(
            &self,
            app: &App,
            archive: &VersionArchive,
        ) -> Result<Vec<u8>, RenderError> {
            if let Some(msg) = self.inner.lock().fail_with.clone() {
                return Err(RenderError::Failed(msg));
            }
            ArchiveRenderer.render_support_bundle_spec(app, archive).await
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeRenderer;

#[cfg(test)]
#[path = "render_tests.rs"]
mod tests;
