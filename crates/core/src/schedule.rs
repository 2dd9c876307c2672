// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cron expression handling for scheduled snapshots.
//!
//! Users write the classic 5-field form (`minute hour dom month dow`). The
//! `cron` crate wants a leading seconds field, so 5-field expressions are
//! pinned to second 0. 6- and 7-field expressions pass through unchanged.

use chrono::{DateTime, Utc};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression '{expr}': {reason}")]
    Invalid { expr: String, reason: String },
    #[error("cron expression '{0}' has no future occurrence")]
    Exhausted(String),
}

/// A parsed snapshot schedule.
#[derive(Debug, Clone)]
pub struct SnapshotSchedule {
    expr: String,
    schedule: cron::Schedule,
}

impl SnapshotSchedule {
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let normalized = normalize(expr);
        let schedule = cron::Schedule::from_str(&normalized).map_err(|e| {
            ScheduleError::Invalid { expr: expr.to_string(), reason: e.to_string() }
        })?;
        Ok(Self { expr: expr.trim().to_string(), schedule })
    }

    /// First occurrence strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        self.schedule.after(&after).next().ok_or_else(|| ScheduleError::Exhausted(self.expr.clone()))
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }
}

fn normalize(expr: &str) -> String {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() == 5 {
        format!("0 {}", fields.join(" "))
    } else {
        fields.join(" ")
    }
}

/// Parse `expr` and compute its next occurrence after `after`.
pub fn next_occurrence(expr: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
    SnapshotSchedule::parse(expr)?.next_after(after)
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
