// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable per-unit log store.
//!
//! Each unit's text is appended to a bucket file addressed by the unit's
//! invocation chain and execution id (see [`crate::log_paths`]); completion
//! outcomes go to a single `outcomes.log`. The store is write-only from the
//! engine's point of view — dashboards and other collaborators read it.
//!
//! Each append opens, writes, and closes the file. This is safe for the
//! low write frequency of unit output.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use weft_core::{ExecutionUnit, UnitOutcome};

use crate::log_paths;
use crate::time_fmt::format_utc_now;

/// Append-only per-unit log store rooted at one directory.
pub struct UnitLogStore {
    store_dir: PathBuf,
}

impl UnitLogStore {
    pub fn new(store_dir: PathBuf) -> Self {
        Self { store_dir }
    }

    /// Returns the base store directory path.
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Path of the bucket file this unit logs into.
    pub fn bucket_path(&self, unit: &ExecutionUnit) -> PathBuf {
        let chain = unit.chain();
        let bucket = unit.execution_id();
        log_paths::unit_log_path(&self.store_dir, &chain, bucket.as_ref())
    }

    /// Create the unit's bucket directory ahead of its first append.
    ///
    /// Failures are logged via tracing but do not propagate — logging
    /// must not break the engine.
    pub fn prepare(&self, unit: &ExecutionUnit) {
        let path = self.bucket_path(unit);
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::warn!(
                    unit = %unit.id(),
                    path = %parent.display(),
                    error = %e,
                    "failed to create log bucket directory"
                );
            }
        }
    }

    /// Append raw text to the unit's bucket.
    ///
    /// Failures are logged via tracing but do not propagate.
    pub fn append(&self, unit: &ExecutionUnit, text: &str) {
        let path = self.bucket_path(unit);
        if let Err(e) = self.write_raw(&path, text) {
            tracing::warn!(
                unit = %unit.id(),
                error = %e,
                "failed to write unit log"
            );
        }
    }

    /// Append one terminated line to the unit's bucket.
    pub fn append_line(&self, unit: &ExecutionUnit, text: &str) {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        self.append(unit, &line);
    }

    /// Record how the unit's work finished.
    ///
    /// Format: `2026-01-30T08:14:09Z [a1b2c3d4] success`
    ///
    /// Failures are logged via tracing but do not propagate.
    pub fn record_outcome(&self, unit: &ExecutionUnit, outcome: UnitOutcome) {
        let path = log_paths::outcomes_log_path(&self.store_dir);
        let line = format!(
            "{} [{}] {}\n",
            format_utc_now(),
            unit.id().short(8),
            outcome
        );
        if let Err(e) = self.write_raw(&path, &line) {
            tracing::warn!(
                unit = %unit.id(),
                error = %e,
                "failed to record unit outcome"
            );
        }
    }

    fn write_raw(&self, path: &Path, text: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(text.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "unit_log_tests.rs"]
mod tests;
