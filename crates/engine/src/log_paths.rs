// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared path builders for per-unit log files.
//!
//! Used by the log store (writer) and any external reader to construct
//! consistent paths in the directory structure:
//!   `<store_dir>/<chain frame>/.../<execution_id>.log`
//!   `<store_dir>/outcomes.log`

use std::path::{Path, PathBuf};

use weft_core::ExecutionId;

/// Build the path to a unit's log bucket.
///
/// Structure: `{store_dir}/{chain...}/{execution_id}.log`
///
/// Invocation-chain frames become nested directories, outermost first.
/// Units without an execution id share the `main.log` bucket at their
/// chain's directory.
pub fn unit_log_path(store_dir: &Path, chain: &[String], bucket: Option<&ExecutionId>) -> PathBuf {
    let mut path = store_dir.to_path_buf();
    for frame in chain {
        path.push(frame);
    }
    match bucket {
        Some(id) => path.push(format!("{}.log", id)),
        None => path.push("main.log"),
    }
    path
}

/// Build the path to the outcome record file.
///
/// Structure: `{store_dir}/outcomes.log`
pub fn outcomes_log_path(store_dir: &Path) -> PathBuf {
    store_dir.join("outcomes.log")
}

#[cfg(test)]
#[path = "log_paths_tests.rs"]
mod tests;
