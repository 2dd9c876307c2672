// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot persistence for the memory store.
//!
//! A snapshot is the complete [`StoreState`] as zstd-compressed JSON. Writes
//! go to a temp file that is renamed into place, so a crash mid-write never
//! leaves a truncated snapshot behind.

use super::StoreState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current snapshot schema version
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

const ZSTD_LEVEL: i32 = 3;

/// Errors that can occur in snapshot operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    #[serde(rename = "v")]
    version: u32,
    state: StoreState,
    created_at: DateTime<Utc>,
}

/// Load the store state from `path`.
///
/// A missing file yields `None`. A file that cannot be decoded is moved
/// aside to a `.bak` path and also yields `None`, so the daemon starts
/// empty instead of refusing to boot.
pub fn load_snapshot(path: &Path) -> Result<Option<StoreState>, SnapshotError> {
    if !path.exists() {
        return Ok(None);
    }
    match read(path) {
        Ok(snapshot) if snapshot.version == CURRENT_SNAPSHOT_VERSION => Ok(Some(snapshot.state)),
        Ok(snapshot) => Err(SnapshotError::UnsupportedVersion(snapshot.version)),
        Err(e) => {
            let bak = rotate_bak_path(path);
            tracing::warn!(
                error = %e,
                path = %path.display(),
                backup = %bak.display(),
                "corrupt store snapshot, moving aside"
            );
            fs::rename(path, &bak)?;
            Ok(None)
        }
    }
}

fn read(path: &Path) -> Result<Snapshot, SnapshotError> {
    let decoder = zstd::Decoder::new(BufReader::new(File::open(path)?))?;
    Ok(serde_json::from_reader(decoder)?)
}

/// Atomically write `state` to `path`.
pub fn save_snapshot(path: &Path, state: StoreState) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let snapshot = Snapshot { version: CURRENT_SNAPSHOT_VERSION, state, created_at: Utc::now() };

    let tmp = path.with_extension("tmp");
    {
        let file = BufWriter::new(File::create(&tmp)?);
        let mut encoder = zstd::Encoder::new(file, ZSTD_LEVEL)?;
        serde_json::to_writer(&mut encoder, &snapshot)?;
        let mut file = encoder.finish()?;
        file.flush()?;
        file.get_ref().sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
///
/// Keeps up to [`MAX_BAK_FILES`] backups: `.bak`, `.bak.2`, `.bak.3`.
pub(crate) fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }
    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
