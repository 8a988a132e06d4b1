// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The ordering engine behind [`crate::OutputMux`].
//!
//! Decides, per write, whether a unit's output reaches the sink immediately
//! or is buffered until that unit's turn, and reconstructs newline placement
//! across buffering boundaries. Unsynchronized; every call must go through
//! the serialized wrapper.
//!
//! Ordering model: at any moment exactly one unit (besides the main unit)
//! is the *priority unit* — the terminal node of the walk that starts at the
//! oldest queued unit and repeatedly follows the first child known to the
//! queue. The priority unit writes straight to the sink; everyone else
//! buffers. Completing units hand priority upward (to a still-buffering
//! parent) or sideways (to the next registered sibling, or the next queued
//! unit when the completer was oldest). The walk follows only the leftmost
//! currently-buffering path; it does not search remaining branches.

use std::collections::HashSet;

use indexmap::IndexMap;

use weft_core::{ExecutionUnit, UnitId};

use crate::sink::Sink;

/// Per-unit buffered-output record.
///
/// Exists iff the unit has written at least once and has not yet completed
/// its flush. Units that never write are invisible to ordering.
#[derive(Default)]
struct QueueEntry {
    /// Not-yet-emitted text.
    output: String,
    /// Set once the unit has been granted immediate-write privilege;
    /// the one-time parent flush happens only on the first grant.
    priority: bool,
    /// Child unit ids that have registered output, in registration order.
    /// First registration wins the position.
    children: Vec<UnitId>,
}

/// One owed-newline ledger: a set of unit ids plus a slot for keys that
/// have no unit (the parentless root). Bits are independent across ledgers;
/// every transition is explicit.
#[derive(Default)]
struct Ledger {
    units: HashSet<UnitId>,
    sentinel: bool,
}

impl Ledger {
    fn set(&mut self, key: Option<&UnitId>) {
        match key {
            Some(id) => {
                self.units.insert(id.clone());
            }
            None => self.sentinel = true,
        }
    }

    /// Clear the bit, returning whether it was set.
    fn take(&mut self, key: Option<&UnitId>) -> bool {
        match key {
            Some(id) => self.units.remove(id),
            None => std::mem::take(&mut self.sentinel),
        }
    }

    fn contains(&self, key: Option<&UnitId>) -> bool {
        match key {
            Some(id) => self.units.contains(id),
            None => self.sentinel,
        }
    }

    fn clear(&mut self) {
        self.units.clear();
        self.sentinel = false;
    }
}

/// Which ledger the next "final newline" decision resolves against.
///
/// Set whenever a buffered block is surfaced; consumed by the next operation
/// that needs to know whether that block still owes a trailing newline.
enum FinalSource {
    Main,
    Priority,
    Unit(UnitId),
    PendingBuffer,
}

pub(crate) struct PrintQueue<W: Sink> {
    sink: W,
    /// Live entries in registration order (oldest first).
    queue: IndexMap<UnitId, QueueEntry>,
    /// Output from completed units whose parent was no longer queued;
    /// emitted at the next flush point.
    pending: String,
    main_newline: bool,
    unit_newline: Ledger,
    priority_newline: Ledger,
    retrospective_newline: Ledger,
    retrospective_queue_newline: Ledger,
    final_source: Option<FinalSource>,
}

fn parent_key(unit: &ExecutionUnit) -> Option<UnitId> {
    unit.parent().map(|p| p.id().clone())
}

impl<W: Sink> PrintQueue<W> {
    pub(crate) fn new(sink: W) -> Self {
        Self {
            sink,
            queue: IndexMap::new(),
            pending: String::new(),
            main_newline: false,
            unit_newline: Ledger::default(),
            priority_newline: Ledger::default(),
            retrospective_newline: Ledger::default(),
            retrospective_queue_newline: Ledger::default(),
            final_source: None,
        }
    }

    /// Line-oriented write: `body` plus a terminating newline, with a
    /// prepended newline when one is owed from earlier raw writes.
    pub(crate) fn write_line(&mut self, unit: &ExecutionUnit, body: &str) {
        let prepend = self.prepend_newline(unit);
        let mut text = String::with_capacity(body.len() + 2);
        if prepend {
            text.push('\n');
        }
        text.push_str(body);
        text.push('\n');
        self.print_or_queue(unit, &text, !prepend);
    }

    /// Raw fragment write: no terminator; the writer now owes a newline
    /// before its next line-oriented output.
    pub(crate) fn write(&mut self, unit: &ExecutionUnit, body: &str) {
        self.print_or_queue(unit, body, false);
        if unit.is_root() {
            self.main_newline = true;
        } else if self.is_priority(unit) {
            let pk = parent_key(unit);
            self.priority_newline.set(pk.as_ref());
        } else {
            self.unit_newline.set(Some(unit.id()));
        }
    }

    /// Resolve a completed unit's buffered output into the global order.
    /// Called exactly once per unit, when its work is done.
    pub(crate) fn flush(&mut self, unit: &ExecutionUnit) {
        if unit.is_root() {
            // Nothing queued to hand off; just settle an owed newline.
            if self.main_newline {
                self.sink.write_str("\n");
                self.main_newline = false;
            }
            return;
        }

        let parent = unit.parent();
        let parent_id: Option<UnitId> = parent.as_ref().map(|p| p.id().clone());

        if self.is_priority(unit) {
            if self.final_newline(unit) {
                self.priority_newline.set(parent_id.as_ref());
            }
            self.final_source = Some(FinalSource::Priority);

            // Capture before the queue is mutated below.
            let next = self.next_queued(unit);

            self.flush_current(unit);

            let parent_queued = parent_id
                .as_ref()
                .is_some_and(|p| self.queue.contains_key(p));
            if parent_queued {
                // Priority climbs back up the tree.
                if let Some(pid) = parent_id.clone() {
                    self.flush_parent(unit, &pid);
                }
            } else if !self.pending.is_empty() {
                if self.retrospective_newline.take(parent_id.as_ref()) && self.final_newline(unit)
                {
                    self.sink.write_str("\n");
                }
                let pending = std::mem::take(&mut self.pending);
                self.sink.write_str(&pending);
                self.final_source = Some(FinalSource::PendingBuffer);
            }

            // Priority advances sideways to the next unit in line.
            if let Some(next_id) = next {
                let next_output = self
                    .queue
                    .get_mut(&next_id)
                    .map(|e| std::mem::take(&mut e.output))
                    .unwrap_or_default();
                if !next_output.is_empty() {
                    if self.retrospective_newline.take(Some(&next_id)) && self.final_newline(unit)
                    {
                        self.unit_newline.set(Some(&next_id));
                        self.sink.write_str("\n");
                    }
                    if let Some(entry) = self.queue.get_mut(&next_id) {
                        entry.priority = true;
                    }
                    self.sink.write_str(&next_output);
                    self.final_source = Some(FinalSource::Unit(next_id));
                }
            }

            self.unqueue(unit);

            let parent_still_queued = parent_id
                .as_ref()
                .is_some_and(|p| self.queue.contains_key(p));
            if parent_still_queued {
                // The next write under this parent settles the newline.
                if self.final_newline(unit) {
                    self.unit_newline.set(parent_id.as_ref());
                }
                if let Some(pid) = parent_id.clone() {
                    self.final_source = Some(FinalSource::Unit(pid));
                }
            } else if parent.as_ref().is_some_and(|p| p.is_root()) && self.queue.is_empty() {
                self.main_newline = self.final_newline(unit);
                self.final_source = Some(FinalSource::Main);
            }
        } else {
            let own_output = self
                .queue
                .get_mut(unit.id())
                .map(|e| std::mem::take(&mut e.output))
                .unwrap_or_default();

            let parent_queued = parent_id
                .as_ref()
                .is_some_and(|p| self.queue.contains_key(p));
            if parent_queued {
                // A still-active parent absorbs the child's output so it
                // nests inside the parent's own block.
                if let Some(pid) = parent_id.as_ref() {
                    let parent_owed = self.unit_newline.take(Some(pid));
                    if parent_owed && self.retrospective_newline.take(Some(unit.id())) {
                        if let Some(entry) = self.queue.get_mut(pid) {
                            if !entry.output.is_empty() {
                                entry.output.push('\n');
                            }
                        }
                    }
                    if let Some(entry) = self.queue.get_mut(pid) {
                        entry.output.push_str(&own_output);
                    }
                }
            } else {
                self.queue_pending(unit, own_output);
                if self.unit_newline.contains(Some(unit.id())) {
                    self.retrospective_queue_newline.set(parent_id.as_ref());
                }
            }

            self.unqueue(unit);
        }

        // Carry unresolved owed-newline bits up one level so nothing is
        // lost once this unit is gone from the queue.
        if self.unit_newline.take(Some(unit.id())) {
            self.unit_newline.set(parent_id.as_ref());
        }
        if self.priority_newline.take(Some(unit.id())) {
            self.priority_newline.set(parent_id.as_ref());
        }
        if self.retrospective_newline.take(Some(unit.id())) {
            self.retrospective_newline.set(parent_id.as_ref());
        }
        if self.retrospective_queue_newline.take(Some(unit.id())) {
            self.retrospective_queue_newline.set(parent_id.as_ref());
        }
    }

    /// Emit a final owed newline. Main unit only; no-op elsewhere.
    pub(crate) fn finalize(&mut self, unit: &ExecutionUnit) {
        if unit.is_root() && self.final_newline(unit) {
            self.sink.write_str("\n");
        }
    }

    /// Failure-path drain: dump every buffered block to the sink in queue
    /// order and reset all coordination state. Main unit only; no-op
    /// elsewhere. Output order here is best-effort, not depth-first.
    pub(crate) fn release(&mut self, unit: &ExecutionUnit) {
        if !unit.is_root() {
            return;
        }
        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            self.sink.write_str(&pending);
        }
        for (_, entry) in self.queue.drain(..) {
            if !entry.output.is_empty() {
                self.sink.write_str(&entry.output);
            }
        }
        self.unit_newline.clear();
        self.priority_newline.clear();
        self.retrospective_newline.clear();
        self.retrospective_queue_newline.clear();
        self.main_newline = false;
        self.final_source = None;
    }

    /// True when any unit (or the pending buffer) still holds unemitted
    /// output. Diagnostics and tests.
    pub(crate) fn has_buffered_output(&self) -> bool {
        !self.pending.is_empty() || self.queue.values().any(|e| !e.output.is_empty())
    }

    /// Number of live queue entries. Diagnostics and tests.
    pub(crate) fn queued_units(&self) -> usize {
        self.queue.len()
    }

    // --- decision helpers ---

    /// Should the next line-oriented write start with a separator newline?
    /// Consumes whichever owed-newline bit fired.
    fn prepend_newline(&mut self, unit: &ExecutionUnit) -> bool {
        if unit.is_root() && self.main_newline {
            self.main_newline = false;
            return true;
        }
        if !unit.is_root() && self.is_priority(unit) && self.final_newline(unit) {
            let pk = parent_key(unit);
            self.priority_newline.take(pk.as_ref());
            return true;
        }
        if self.unit_newline.take(Some(unit.id())) {
            return true;
        }
        false
    }

    /// Resolve the deferred "does the block that was just surfaced owe a
    /// trailing newline" decision. Consumes `final_source`.
    fn final_newline(&mut self, unit: &ExecutionUnit) -> bool {
        match self.final_source.take() {
            Some(FinalSource::Main) => {
                let owed = self.main_newline;
                self.main_newline = false;
                owed
            }
            Some(FinalSource::Priority) => {
                let pk = parent_key(unit);
                self.priority_newline.take(pk.as_ref())
            }
            Some(FinalSource::Unit(id)) => self.unit_newline.take(Some(&id)),
            Some(FinalSource::PendingBuffer) => {
                let pk = parent_key(unit);
                self.retrospective_queue_newline.take(pk.as_ref())
            }
            None => false,
        }
    }

    /// Deliver now or buffer for later.
    fn print_or_queue(&mut self, unit: &ExecutionUnit, text: &str, possible_newline: bool) {
        let unit_id = unit.id().clone();
        self.queue.entry(unit_id.clone()).or_default();

        // Register under the parent if the parent is itself queued.
        let parent = unit.parent();
        if let Some(parent) = &parent {
            if let Some(entry) = self.queue.get_mut(parent.id()) {
                if !entry.children.contains(&unit_id) {
                    entry.children.push(unit_id.clone());
                }
            }
        }

        if unit.is_root() || self.is_priority(unit) {
            let first_grant = self.queue.get(&unit_id).map_or(true, |e| !e.priority);
            if first_grant {
                // One-time promotion: surface whatever the parent had
                // buffered before this unit's direct output begins.
                if let Some(parent) = &parent {
                    let pid = parent.id().clone();
                    self.flush_parent(unit, &pid);
                }
            }
            if let Some(entry) = self.queue.get_mut(&unit_id) {
                entry.priority = true;
            }
            self.flush_current(unit);
            self.sink.write_str(text);
        } else {
            let entry_empty = self
                .queue
                .get(&unit_id)
                .map_or(true, |e| e.output.is_empty());
            if possible_newline && entry_empty {
                // First buffered line: whether it needs a leading separator
                // is only knowable once the buffer is surfaced.
                self.retrospective_newline.set(Some(unit.id()));
            }
            if let Some(entry) = self.queue.get_mut(&unit_id) {
                entry.output.push_str(text);
            }
        }
    }

    /// Emit the calling unit's own buffered output.
    fn flush_current(&mut self, unit: &ExecutionUnit) {
        let output = self
            .queue
            .get_mut(unit.id())
            .map(|e| std::mem::take(&mut e.output))
            .unwrap_or_default();
        if output.is_empty() {
            return;
        }
        if self.retrospective_newline.take(Some(unit.id())) {
            self.sink.write_str("\n");
        }
        self.sink.write_str(&output);
    }

    /// Promote `parent_id` to priority and emit its buffered output.
    /// `unit` is the calling child (its ledgers resolve the newline).
    fn flush_parent(&mut self, unit: &ExecutionUnit, parent_id: &UnitId) {
        let has_output = self
            .queue
            .get(parent_id)
            .is_some_and(|e| !e.output.is_empty());
        if let Some(entry) = self.queue.get_mut(parent_id) {
            entry.priority = true;
        }
        if !has_output {
            return;
        }
        if self.retrospective_newline.take(Some(parent_id)) && self.final_newline(unit) {
            self.sink.write_str("\n");
            self.unit_newline.set(Some(parent_id));
        }
        let output = self
            .queue
            .get_mut(parent_id)
            .map(|e| std::mem::take(&mut e.output))
            .unwrap_or_default();
        self.sink.write_str(&output);
        self.final_source = Some(FinalSource::Unit(parent_id.clone()));
    }

    /// Move a completed, parentless unit's output into the pending buffer,
    /// reconciling the retrospective newline now that the buffer's fate is
    /// known.
    fn queue_pending(&mut self, unit: &ExecutionUnit, text: String) {
        if self.retrospective_newline.take(Some(unit.id())) {
            if self.pending.is_empty() {
                // Still too early to tell; defer against the parent.
                let pk = parent_key(unit);
                self.retrospective_newline.set(pk.as_ref());
            } else {
                let pk = parent_key(unit);
                if self.retrospective_queue_newline.take(pk.as_ref()) {
                    self.pending.push('\n');
                }
            }
        }
        self.pending.push_str(&text);
    }

    /// The unit whose buffer should surface after `unit` completes: the
    /// second queue entry when `unit` is oldest, else the sibling
    /// registered right after `unit` under the same parent.
    fn next_queued(&self, unit: &ExecutionUnit) -> Option<UnitId> {
        if let Some((first, _)) = self.queue.get_index(0) {
            if first == unit.id() {
                return self.queue.get_index(1).map(|(id, _)| id.clone());
            }
        }
        let parent = unit.parent()?;
        let siblings = &self.queue.get(parent.id())?.children;
        let position = siblings.iter().position(|c| c == unit.id())?;
        siblings.get(position + 1).cloned()
    }

    /// Walk from the oldest queue entry along first-registered children.
    /// The terminal unit of that walk is the priority unit; an empty queue
    /// makes any caller trivially priority. The walk follows only the
    /// leftmost registered path, so a unit off that path is never priority
    /// even if every unit ahead of it is silent — and a parent stops being
    /// priority while one of its children is registered.
    fn is_priority(&self, unit: &ExecutionUnit) -> bool {
        let mut cursor = match self.queue.keys().next() {
            Some(id) => id,
            None => return true,
        };
        loop {
            let entry = match self.queue.get(cursor) {
                Some(entry) => entry,
                None => return false,
            };
            match entry.children.first() {
                Some(child) => {
                    if cursor == unit.id() {
                        // On the path but not terminal.
                        return false;
                    }
                    cursor = child;
                }
                None => return cursor == unit.id(),
            }
        }
    }

    /// Drop the unit from the queue and from its parent's child list.
    fn unqueue(&mut self, unit: &ExecutionUnit) {
        self.queue.shift_remove(unit.id());
        if let Some(parent) = unit.parent() {
            if let Some(entry) = self.queue.get_mut(parent.id()) {
                entry.children.retain(|c| c != unit.id());
            }
        }
    }
}

#[cfg(test)]
#[path = "print_queue_tests.rs"]
mod tests;
