// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task-local binding of the current execution unit.
//!
//! The dispatcher binds each worker's unit explicitly at spawn time via
//! [`scope`]; write and flush calls then resolve "who is calling" from the
//! task-local value. There is no ambient hook on task creation — a task
//! that was not entered through [`scope`] has no current unit and is
//! treated as the main unit by the multiplexer.

use std::future::Future;
use std::sync::Arc;

use weft_core::ExecutionUnit;

tokio::task_local! {
    static CURRENT_UNIT: Arc<ExecutionUnit>;
}

/// Run `fut` with `unit` bound as the current execution unit.
pub async fn scope<F>(unit: Arc<ExecutionUnit>, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT_UNIT.scope(unit, fut).await
}

/// The unit bound to the calling task, if any.
pub fn current_unit() -> Option<Arc<ExecutionUnit>> {
    CURRENT_UNIT.try_with(Arc::clone).ok()
}
