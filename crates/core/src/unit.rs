// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution-unit tree: parent/child lineage for concurrently running work.
//!
//! One `ExecutionUnit` exists per spawned piece of work. The tree position
//! (parent link, position among siblings) is fixed at creation and is the
//! sole authority for output ordering decisions made by the engine.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::id::{ExecutionId, UnitId};

/// One node in the concurrency tree.
///
/// The root unit is the process's originating ("main") unit and is the only
/// unit without a parent. Children hold weak back-references to their parent
/// and parents hold weak references to children, so a unit is dropped once
/// the work that owns its `Arc` finishes.
pub struct ExecutionUnit {
    id: UnitId,
    root: bool,
    parent: Weak<ExecutionUnit>,
    /// Spawn order is preserved; append is the only mutation.
    children: Mutex<Vec<Weak<ExecutionUnit>>>,
    /// Task-name frames for nested task invocations within this unit.
    chain: Mutex<Vec<String>>,
    /// Log-bucket id; addressing only, never ordering.
    execution_id: Mutex<Option<ExecutionId>>,
}

impl ExecutionUnit {
    /// Create the root ("main") unit for a process.
    pub fn root() -> Arc<Self> {
        Arc::new(Self {
            id: UnitId::fresh(),
            root: true,
            parent: Weak::new(),
            children: Mutex::new(Vec::new()),
            chain: Mutex::new(Vec::new()),
            execution_id: Mutex::new(None),
        })
    }

    /// Spawn a child unit under this one.
    ///
    /// Appends the child to this unit's child list under this unit's own
    /// lock; safe under concurrent spawns from the same parent. Never fails.
    pub fn spawn(self: &Arc<Self>) -> Arc<Self> {
        let child = Arc::new(Self {
            id: UnitId::fresh(),
            root: false,
            parent: Arc::downgrade(self),
            children: Mutex::new(Vec::new()),
            chain: Mutex::new(Vec::new()),
            execution_id: Mutex::new(None),
        });
        self.children.lock().push(Arc::downgrade(&child));
        child
    }

    pub fn id(&self) -> &UnitId {
        &self.id
    }

    /// The unit that spawned this one, if it is still alive.
    pub fn parent(&self) -> Option<Arc<ExecutionUnit>> {
        self.parent.upgrade()
    }

    /// True for the process's originating unit.
    pub fn is_root(&self) -> bool {
        self.root
    }

    /// Live children in spawn order.
    pub fn children(&self) -> Vec<Arc<ExecutionUnit>> {
        self.children
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Invocation-chain frames recorded on this unit itself.
    pub fn local_chain(&self) -> Vec<String> {
        self.chain.lock().clone()
    }

    /// Invocation chain for this unit, inherited from the nearest ancestor
    /// carrying a non-empty chain when this unit has none of its own.
    ///
    /// Returns empty if no unit up to the root has a chain.
    pub fn chain(&self) -> Vec<String> {
        {
            let local = self.chain.lock();
            if !local.is_empty() {
                return local.clone();
            }
        }
        let mut cursor = self.parent();
        while let Some(unit) = cursor {
            let chain = unit.chain.lock();
            if !chain.is_empty() {
                return chain.clone();
            }
            drop(chain);
            cursor = unit.parent();
        }
        Vec::new()
    }

    /// Bind this unit to a log bucket.
    pub fn set_execution_id(&self, id: ExecutionId) {
        *self.execution_id.lock() = Some(id);
    }

    /// Remove the log-bucket binding.
    pub fn clear_execution_id(&self) {
        *self.execution_id.lock() = None;
    }

    pub fn execution_id(&self) -> Option<ExecutionId> {
        self.execution_id.lock().clone()
    }
}

impl std::fmt::Debug for ExecutionUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionUnit")
            .field("id", &self.id)
            .field("root", &self.is_root())
            .finish()
    }
}

/// RAII guard for one invocation-chain frame.
///
/// Pushes the frame on entry and restores the previous chain length on drop,
/// so nested task invocations nest and unwind correctly even across early
/// returns.
pub struct TaskScope<'a> {
    unit: &'a ExecutionUnit,
    depth: usize,
}

impl<'a> TaskScope<'a> {
    /// Push `frame` onto `unit`'s invocation chain.
    pub fn enter(unit: &'a ExecutionUnit, frame: impl Into<String>) -> Self {
        let mut chain = unit.chain.lock();
        let depth = chain.len();
        chain.push(frame.into());
        Self { unit, depth }
    }
}

impl Drop for TaskScope<'_> {
    fn drop(&mut self) {
        self.unit.chain.lock().truncate(self.depth);
    }
}

#[cfg(test)]
#[path = "unit_tests.rs"]
mod tests;
