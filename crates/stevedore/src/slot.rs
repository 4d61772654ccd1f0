// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Slot resolution.
//!
//! Swarm can transiently report more than one task for a replica slot, for
//! example while a restarted task replaces a failed one. [`resolve_slots`]
//! picks the single task that speaks for each slot at this poll:
//!
//! 1. Tasks whose desired or observed state is unknown are ignored.
//! 2. Tasks assigned to a node outside the [`ActiveNodeSet`] are ignored.
//!    Unassigned tasks are kept; they are work not yet placed.
//! 3. Between two tasks in one slot, the lower desired state wins, so a task
//!    still desired `running` beats one being shut down.
//! 4. With equal desired states, the incumbent is replaced only by a task
//!    that has progressed strictly further.

use std::collections::{BTreeMap, HashSet};

use crate::client::{Node, NodeState, Task};

/// Slot number to the task judged authoritative for it.
pub type SlotMap = BTreeMap<u64, Task>;

/// IDs of the nodes that are not down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveNodeSet {
    ids: HashSet<String>,
}

impl ActiveNodeSet {
    /// Build the set from a node listing, dropping nodes reported down.
    pub fn from_nodes(nodes: &[Node]) -> Self {
        nodes
            .iter()
            .filter(|node| node.state != NodeState::Down)
            .map(|node| node.id.clone())
            .collect()
    }

    /// Whether `node_id` is active.
    pub fn contains(&self, node_id: &str) -> bool {
        self.ids.contains(node_id)
    }

    /// Number of active nodes.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no node is active.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<String> for ActiveNodeSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<&'a str> for ActiveNodeSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().map(str::to_string).collect()
    }
}

/// Whether a task takes part in slot resolution at all.
fn is_eligible(task: &Task, active_nodes: &ActiveNodeSet) -> bool {
    if !task.desired_state.is_known() || !task.state.is_known() {
        return false;
    }
    match task.node_id.as_deref() {
        None | Some("") => true,
        Some(node_id) => active_nodes.contains(node_id),
    }
}

/// Whether `candidate` should replace `incumbent` for their shared slot.
fn supersedes(candidate: &Task, incumbent: &Task) -> bool {
    let incumbent_desired = incumbent.desired_state.rank();
    let candidate_desired = candidate.desired_state.rank();
    if candidate_desired != incumbent_desired {
        return candidate_desired < incumbent_desired;
    }
    candidate.state.rank() > incumbent.state.rank()
}

/// Reduce a task listing to one authoritative task per slot.
pub fn resolve_slots(tasks: &[Task], active_nodes: &ActiveNodeSet) -> SlotMap {
    let mut slots = SlotMap::new();
    for task in tasks.iter().filter(|t| is_eligible(t, active_nodes)) {
        let claim = slots
            .get(&task.slot)
            .is_none_or(|incumbent| supersedes(task, incumbent));
        if claim {
            slots.insert(task.slot, task.clone());
        }
    }
    slots
}
