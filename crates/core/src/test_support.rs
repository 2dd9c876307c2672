// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::{AppId, ClusterId, DownstreamVersion, VersionArchive, VersionStatus};

// ── Proptest strategies ─────────────────────────────────────────────────

pub mod strategies {
    use crate::status::State;
    use proptest::prelude::*;

    pub fn arb_state() -> impl Strategy<Value = State> {
        prop_oneof![
            Just(State::Missing),
            Just(State::Unavailable),
            Just(State::Degraded),
            Just(State::Ready),
        ]
    }
}

// ── Factories ───────────────────────────────────────────────────────────

/// A downstream version whose parent is itself.
pub fn version(app: &str, cluster: &str, sequence: i64, status: VersionStatus) -> DownstreamVersion {
    DownstreamVersion {
        app_id: AppId::new(app),
        cluster_id: ClusterId::new(cluster),
        sequence,
        parent_sequence: sequence,
        status,
        status_info: None,
        created_at_ms: 0,
        applied_at_ms: None,
    }
}

/// An archive with one rendered manifest.
pub fn archive(manifest: &str) -> VersionArchive {
    VersionArchive::default().with_file("rendered/manifest.yaml", manifest)
}
