// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Replica progress evaluation.
//!
//! A [`ConvergenceSession`] lives for one create or update. Each poll feeds it
//! the resolved [`SlotMap`] and it answers whether exactly the desired number
//! of slots hold a live running task. The session keeps a sticky `done` flag
//! that is only cleared when a slot falls back out of `running`.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::client::ServiceMode;
use crate::error::ConvergeError;
use crate::poller::ConvergeState;
use crate::slot::SlotMap;
use crate::task_state::TaskState;

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Whether `running == replicas` at this poll.
    pub converged: bool,
    /// Slots with a live running task.
    pub running: u64,
    /// Replica target.
    pub replicas: u64,
    /// Whether the evaluation ran against a rollback in progress.
    pub rollback: bool,
}

/// Per-service progress state carried across polls.
#[derive(Debug, Clone)]
pub struct ConvergenceSession {
    service_id: String,
    done: bool,
    replicas: Option<u64>,
    slot_index: HashMap<u64, usize>,
    state_width: usize,
}

impl ConvergenceSession {
    /// Start a session for `service_id`.
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            done: false,
            replicas: None,
            slot_index: HashMap::new(),
            state_width: 0,
        }
    }

    /// Service this session tracks.
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Sticky convergence flag.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Replica target seen at the most recent evaluation.
    pub fn replicas(&self) -> Option<u64> {
        self.replicas
    }

    /// Display position assigned to `slot`, starting at 1.
    pub fn slot_index(&self, slot: u64) -> Option<usize> {
        self.slot_index.get(&slot).copied()
    }

    /// Widest task state name seen so far, for aligned output.
    pub fn state_width(&self) -> usize {
        self.state_width
    }

    /// Evaluate one poll.
    ///
    /// Fails without touching the session when the service is not replicated
    /// with an explicit replica count.
    pub fn evaluate(
        &mut self,
        mode: &ServiceMode,
        slots: &SlotMap,
        rollback: bool,
    ) -> Result<Progress, ConvergeError> {
        let replicas = match *mode {
            ServiceMode::Replicated {
                replicas: Some(replicas),
            } => replicas,
            ServiceMode::Replicated { replicas: None } => {
                return Err(ConvergeError::MissingReplicaCount {
                    service_id: self.service_id.clone(),
                });
            }
            other => {
                return Err(ConvergeError::NotReplicated {
                    service_id: self.service_id.clone(),
                    mode: other,
                });
            }
        };
        self.replicas = Some(replicas);

        if self.done && slots.values().any(|task| task.state != TaskState::Running) {
            debug!(service_id = %self.service_id, "Running slot regressed, convergence reset");
            self.done = false;
        }

        for (slot, task) in slots {
            let next = self.slot_index.len() + 1;
            self.slot_index.entry(*slot).or_insert(next);
            self.state_width = self.state_width.max(task.state.as_str().len());
        }

        let running = slots
            .values()
            .filter(|task| !task.desired_state.is_terminal() && task.state == TaskState::Running)
            .count() as u64;

        if !self.done && running == replicas {
            self.done = true;
        }

        Ok(Progress {
            converged: running == replicas,
            running,
            replicas,
            rollback,
        })
    }

    /// Build the report for one poll.
    pub fn report(
        &self,
        state: ConvergeState,
        progress: Option<Progress>,
        slots: &SlotMap,
    ) -> ProgressReport {
        let mut lines: Vec<SlotProgress> = slots
            .iter()
            .map(|(slot, task)| SlotProgress {
                index: self.slot_index(*slot),
                slot: *slot,
                task_id: task.id.clone(),
                state: task.state,
                desired_state: task.desired_state,
                node_id: task.node_id.clone(),
                error: task.error.clone(),
            })
            .collect();
        lines.sort_by_key(|line| (line.index.unwrap_or(usize::MAX), line.slot));

        ProgressReport {
            service_id: self.service_id.clone(),
            state,
            progress,
            slots: lines,
            state_width: self.state_width,
        }
    }
}

/// Snapshot of one slot for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotProgress {
    /// Display position, `None` until the slot has been evaluated.
    pub index: Option<usize>,
    /// Swarm slot number.
    pub slot: u64,
    /// Authoritative task ID.
    pub task_id: String,
    /// Observed state.
    pub state: TaskState,
    /// Desired state.
    pub desired_state: TaskState,
    /// Assigned node.
    pub node_id: Option<String>,
    /// Task error, if any.
    pub error: Option<String>,
}

/// What the poller knows after one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    /// Service ID.
    pub service_id: String,
    /// Poller state after the tick.
    pub state: ConvergeState,
    /// Replica progress, absent when the update status decided the tick.
    pub progress: Option<Progress>,
    /// Resolved slots in display order.
    pub slots: Vec<SlotProgress>,
    /// Padding width for task state names.
    pub state_width: usize,
}

impl ProgressReport {
    /// One aligned line per slot.
    pub fn lines(&self) -> Vec<String> {
        let total = self
            .progress
            .map(|p| p.replicas.to_string())
            .unwrap_or_else(|| "?".to_string());
        self.slots
            .iter()
            .map(|slot| {
                let index = slot
                    .index
                    .map(|i| i.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let mut line = format!(
                    "{index}/{total}: {state:<width$} (desired {desired}) task {task}",
                    state = slot.state,
                    width = self.state_width,
                    desired = slot.desired_state,
                    task = slot.task_id,
                );
                if let Some(node) = &slot.node_id {
                    line.push_str(&format!(" on {node}"));
                }
                if let Some(error) = &slot.error {
                    line.push_str(&format!(": {error}"));
                }
                line
            })
            .collect()
    }
}

/// Default reporter: one `info!` per tick, one `debug!` per slot.
pub fn log_progress(report: &ProgressReport) {
    match report.progress {
        Some(progress) => info!(
            service_id = %report.service_id,
            state = report.state.label(),
            running = progress.running,
            replicas = progress.replicas,
            rollback = progress.rollback,
            "Convergence progress"
        ),
        None => info!(
            service_id = %report.service_id,
            state = report.state.label(),
            "Convergence progress"
        ),
    }
    for line in report.lines() {
        debug!(service_id = %report.service_id, "{}", line);
    }
}
