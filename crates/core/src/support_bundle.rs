// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queued support bundle collection requests.

use crate::id::{AppId, ClusterId, SupportBundleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A request to collect a support bundle, waiting for the next dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSupportBundle {
    pub id: SupportBundleId,
    pub app_id: AppId,
    pub cluster_id: ClusterId,
    pub created_at: DateTime<Utc>,
}
