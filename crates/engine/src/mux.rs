// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Serialized access to the ordering engine.
//!
//! Every public operation resolves the calling unit from task-local context,
//! then holds one global lock for the call's full duration, so each
//! read-decide-mutate sequence in the engine is atomic across all
//! concurrently running units. No operation awaits while holding the lock.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use weft_core::ExecutionUnit;

use crate::context;
use crate::print_queue::PrintQueue;
use crate::sink::{ConsoleSink, Sink};
use crate::unit_log::UnitLogStore;

/// The shared output multiplexer.
///
/// One instance serves a whole process tree of execution units; ordering
/// requires a single authority. Create it at startup with the root unit and
/// share it behind an `Arc`.
pub struct OutputMux<W: Sink> {
    inner: Mutex<PrintQueue<W>>,
    root: Arc<ExecutionUnit>,
    /// Optional durable tee: every write is also appended to the calling
    /// unit's log bucket, regardless of how long it stays buffered here.
    store: Option<Arc<UnitLogStore>>,
}

impl OutputMux<ConsoleSink> {
    /// Multiplexer writing to the process's stdout.
    pub fn stdout(root: Arc<ExecutionUnit>) -> Self {
        Self::new(ConsoleSink, root)
    }
}

impl<W: Sink> OutputMux<W> {
    pub fn new(sink: W, root: Arc<ExecutionUnit>) -> Self {
        Self {
            inner: Mutex::new(PrintQueue::new(sink)),
            root,
            store: None,
        }
    }

    /// Tee every write into a durable per-unit log store as well.
    ///
    /// The store copy happens outside the ordering lock and is untouched by
    /// buffering: log buckets see text in real time even while the console
    /// copy waits its turn.
    pub fn with_store(mut self, store: Arc<UnitLogStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// The process's main unit.
    pub fn root(&self) -> &Arc<ExecutionUnit> {
        &self.root
    }

    /// The unit bound to the calling task, or the main unit for callers
    /// outside any dispatcher scope.
    fn calling_unit(&self) -> Arc<ExecutionUnit> {
        context::current_unit().unwrap_or_else(|| Arc::clone(&self.root))
    }

    /// Write one line (terminated, with any owed separator prepended).
    pub fn line(&self, value: impl fmt::Display) {
        let unit = self.calling_unit();
        let body = value.to_string();
        if let Some(store) = &self.store {
            store.append_line(&unit, &body);
        }
        self.inner.lock().write_line(&unit, &body);
    }

    /// Write several values as consecutive lines in one atomic block.
    pub fn lines(&self, values: &[&dyn fmt::Display]) {
        let body = values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        let unit = self.calling_unit();
        if let Some(store) = &self.store {
            store.append_line(&unit, &body);
        }
        self.inner.lock().write_line(&unit, &body);
    }

    /// Write a raw fragment (no terminator); the caller owes a newline
    /// before its next line.
    pub fn write(&self, value: impl fmt::Display) {
        let unit = self.calling_unit();
        let body = value.to_string();
        if let Some(store) = &self.store {
            store.append(&unit, &body);
        }
        self.inner.lock().write(&unit, &body);
    }

    /// Write several values concatenated as one raw fragment.
    pub fn write_all(&self, values: &[&dyn fmt::Display]) {
        let body = values.iter().map(|v| v.to_string()).collect::<String>();
        let unit = self.calling_unit();
        if let Some(store) = &self.store {
            store.append(&unit, &body);
        }
        self.inner.lock().write(&unit, &body);
    }

    /// Resolve the calling unit's buffered output into the global order.
    /// Must be called exactly once per unit, after its work completes.
    pub fn flush(&self) {
        let unit = self.calling_unit();
        self.inner.lock().flush(&unit);
    }

    /// Emit a final owed newline. Main unit only; no-op from workers.
    pub fn finalize(&self) {
        let unit = self.calling_unit();
        self.inner.lock().finalize(&unit);
    }

    /// Failure-path drain of every buffered block, in queue order.
    /// Main unit only; no-op from workers.
    pub fn release(&self) {
        let unit = self.calling_unit();
        self.inner.lock().release(&unit);
    }

    /// True while any unit still holds unemitted output. Diagnostics.
    pub fn has_buffered_output(&self) -> bool {
        self.inner.lock().has_buffered_output()
    }

    /// Number of units currently known to the queue. Diagnostics.
    pub fn queued_units(&self) -> usize {
        self.inner.lock().queued_units()
    }
}

#[cfg(test)]
#[path = "mux_tests.rs"]
mod tests;
