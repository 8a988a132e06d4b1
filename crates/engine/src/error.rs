// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the dispatcher

use thiserror::Error;

use weft_core::UnitId;

/// Errors surfaced by a parallel batch.
///
/// `Work` wraps the first error returned by a unit's work closure; by the
/// time the caller sees it, every worker has been awaited and all buffered
/// output has been drained to the sink.
#[derive(Debug, Error)]
pub enum PoolError<E> {
    #[error("unit work failed")]
    Work(E),
    #[error("worker for unit {0} was cancelled by the runtime")]
    Cancelled(UnitId),
}

impl<E> PoolError<E> {
    /// The underlying work error, if this was a work failure.
    pub fn into_work(self) -> Option<E> {
        match self {
            PoolError::Work(e) => Some(e),
            PoolError::Cancelled(_) => None,
        }
    }
}
