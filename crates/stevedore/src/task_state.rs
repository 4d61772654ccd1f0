// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Swarm task lifecycle states.
//!
//! Swarm reports task state as plain strings. Every string maps onto a
//! [`TaskState`] whose [`rank`](TaskState::rank) gives a total order along
//! the lifecycle:
//!
//! ```text
//! new < allocated < pending < assigned < accepted < preparing < ready
//!     < starting < running < complete < shutdown < failed < rejected
//! ```
//!
//! Strings Swarm may add in later API versions parse to [`TaskState::Unknown`],
//! which ranks 0 and is never acted upon.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a Swarm task, as desired or as observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum TaskState {
    /// Any state string not listed below.
    #[default]
    Unknown,
    /// Task was created.
    New,
    /// Resources were allocated by the orchestrator.
    Allocated,
    /// Waiting for the scheduler.
    Pending,
    /// Assigned to a node.
    Assigned,
    /// Node accepted the task.
    Accepted,
    /// Node is preparing the task (pulling image, etc).
    Preparing,
    /// Ready to start.
    Ready,
    /// Container is starting.
    Starting,
    /// Container is running.
    Running,
    /// Exited successfully.
    Complete,
    /// Stopped by the orchestrator.
    Shutdown,
    /// Exited with an error.
    Failed,
    /// Node rejected the task.
    Rejected,
}

const ALL_KNOWN: [TaskState; 13] = [
    TaskState::New,
    TaskState::Allocated,
    TaskState::Pending,
    TaskState::Assigned,
    TaskState::Accepted,
    TaskState::Preparing,
    TaskState::Ready,
    TaskState::Starting,
    TaskState::Running,
    TaskState::Complete,
    TaskState::Shutdown,
    TaskState::Failed,
    TaskState::Rejected,
];

impl TaskState {
    /// Position in the lifecycle order. `Unknown` is 0, `New` is 1,
    /// `Rejected` is 13.
    pub fn rank(self) -> u8 {
        match self {
            TaskState::Unknown => 0,
            TaskState::New => 1,
            TaskState::Allocated => 2,
            TaskState::Pending => 3,
            TaskState::Assigned => 4,
            TaskState::Accepted => 5,
            TaskState::Preparing => 6,
            TaskState::Ready => 7,
            TaskState::Starting => 8,
            TaskState::Running => 9,
            TaskState::Complete => 10,
            TaskState::Shutdown => 11,
            TaskState::Failed => 12,
            TaskState::Rejected => 13,
        }
    }

    /// Whether the state is past `running`. Terminal states never revert.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Complete | TaskState::Shutdown | TaskState::Failed | TaskState::Rejected
        )
    }

    /// Whether the state takes part in slot resolution at all.
    pub fn is_known(self) -> bool {
        self.rank() != 0
    }

    /// Parse a Docker state string. Never fails.
    pub fn parse(s: &str) -> Self {
        ALL_KNOWN
            .iter()
            .copied()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .unwrap_or(TaskState::Unknown)
    }

    /// Docker wire string for the state.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Unknown => "unknown",
            TaskState::New => "new",
            TaskState::Allocated => "allocated",
            TaskState::Pending => "pending",
            TaskState::Assigned => "assigned",
            TaskState::Accepted => "accepted",
            TaskState::Preparing => "preparing",
            TaskState::Ready => "ready",
            TaskState::Starting => "starting",
            TaskState::Running => "running",
            TaskState::Complete => "complete",
            TaskState::Shutdown => "shutdown",
            TaskState::Failed => "failed",
            TaskState::Rejected => "rejected",
        }
    }

    /// All states with a non-zero rank, in lifecycle order.
    pub fn known() -> &'static [TaskState] {
        &ALL_KNOWN
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TaskState::parse(s))
    }
}

impl From<String> for TaskState {
    fn from(s: String) -> Self {
        TaskState::parse(&s)
    }
}

impl From<TaskState> for &'static str {
    fn from(state: TaskState) -> Self {
        state.as_str()
    }
}
