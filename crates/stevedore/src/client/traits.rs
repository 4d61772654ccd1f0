// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Swarm client trait definitions.
//!
//! Defines the abstract interface to the Swarm service API and the plain
//! snapshot types the convergence engine consumes.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::definition::ServiceDefinition;
use crate::task_state::TaskState;

/// Errors from Swarm API calls.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// The service does not exist (HTTP 404).
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    /// The daemon answered with an error status.
    #[error("Docker API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message returned by the daemon.
        message: String,
    },

    /// The daemon could not be reached.
    #[error("Docker connection error: {0}")]
    Connection(String),

    /// The daemon answered with a payload we could not interpret.
    #[error("Invalid Docker response: {0}")]
    InvalidResponse(String),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error.
    #[error("Other: {0}")]
    Other(String),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// One scheduled attempt to run a replica, as observed at a poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Task ID.
    pub id: String,
    /// Owning service ID.
    pub service_id: String,
    /// Logical replica position. Restarts and updates reuse the slot.
    pub slot: u64,
    /// State the orchestrator wants the task in.
    pub desired_state: TaskState,
    /// State the node reports for the task.
    pub state: TaskState,
    /// Node the task is assigned to, `None` while unscheduled.
    pub node_id: Option<String>,
    /// Error reported by the node for this task, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When this snapshot was taken.
    pub observed_at: DateTime<Utc>,
}

/// Availability of a Swarm node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// State string not recognized.
    #[default]
    Unknown,
    /// Node is down.
    Down,
    /// Node is ready for tasks.
    Ready,
    /// Node lost contact with the managers.
    Disconnected,
}

impl NodeState {
    /// Parse a Docker node state string. Never fails.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "down" => NodeState::Down,
            "ready" => NodeState::Ready,
            "disconnected" => NodeState::Disconnected,
            _ => NodeState::Unknown,
        }
    }
}

/// A Swarm node as returned by node listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Node ID.
    pub id: String,
    /// Reported availability.
    pub state: NodeState,
}

/// Scheduling mode of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ServiceMode {
    /// Fixed number of replicas. A replicated service reported without a
    /// count carries `None`.
    Replicated {
        /// Desired replica count.
        replicas: Option<u64>,
    },
    /// One task per eligible node.
    Global,
    /// Run-to-completion replicated job.
    ReplicatedJob,
    /// Run-to-completion job on every node.
    GlobalJob,
}

impl fmt::Display for ServiceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceMode::Replicated { .. } => write!(f, "replicated"),
            ServiceMode::Global => write!(f, "global"),
            ServiceMode::ReplicatedJob => write!(f, "replicated-job"),
            ServiceMode::GlobalJob => write!(f, "global-job"),
        }
    }
}

/// State of a rolling update as reported in `UpdateStatus.State`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateState {
    /// Update in progress.
    Updating,
    /// Update engine paused itself.
    Paused,
    /// Update finished.
    Completed,
    /// Update failed and rollback began.
    RollbackStarted,
    /// Rollback paused itself.
    RollbackPaused,
    /// Rollback finished.
    RollbackCompleted,
    /// State string not recognized.
    Unknown,
}

impl UpdateState {
    /// Parse a Docker update state string. Never fails.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "updating" => UpdateState::Updating,
            "paused" => UpdateState::Paused,
            "completed" => UpdateState::Completed,
            "rollback_started" => UpdateState::RollbackStarted,
            "rollback_paused" => UpdateState::RollbackPaused,
            "rollback_completed" => UpdateState::RollbackCompleted,
            _ => UpdateState::Unknown,
        }
    }
}

/// The slice of `ServiceInspect` the engine consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInspection {
    /// Service ID.
    pub id: String,
    /// Service name.
    pub name: String,
    /// Object version, required for updates.
    pub version: u64,
    /// Scheduling mode and replica target.
    pub mode: ServiceMode,
    /// Rolling update state, absent when no update ran.
    pub update_state: Option<UpdateState>,
}

/// Filter for task listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFilter {
    /// Service ID or name.
    pub service: String,
    /// Only tasks with this desired state.
    pub desired_state: Option<TaskState>,
}

impl TaskFilter {
    /// Tasks of `service` that Swarm still wants running.
    pub fn running(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            desired_state: Some(TaskState::Running),
        }
    }

    /// Every task of `service`.
    pub fn all(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            desired_state: None,
        }
    }

    /// Whether `task` passes this filter.
    pub fn matches(&self, task: &Task) -> bool {
        task.service_id == self.service
            && self
                .desired_state
                .is_none_or(|desired| task.desired_state == desired)
    }
}

/// Trait for Swarm service API clients.
///
/// Clients are PURE transport adapters - they hold no convergence state.
/// Each call is an independent RPC against the daemon.
#[async_trait]
pub trait SwarmClient: Send + Sync {
    /// Client type identifier (e.g., "docker", "mock")
    fn client_type(&self) -> &'static str;

    /// Inspect a service by ID or name.
    async fn inspect_service(&self, service_id: &str) -> Result<ServiceInspection>;

    /// List tasks matching `filter`.
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>>;

    /// List all Swarm nodes.
    async fn list_nodes(&self) -> Result<Vec<Node>>;

    /// Create a service and return its ID.
    async fn create_service(&self, definition: &ServiceDefinition) -> Result<String>;

    /// Replace a service's spec. `version` must be the version last read.
    ///
    /// Returns the warnings reported by the daemon.
    async fn update_service(
        &self,
        service_id: &str,
        version: u64,
        definition: &ServiceDefinition,
    ) -> Result<Vec<String>>;

    /// Remove a service.
    async fn remove_service(&self, service_id: &str) -> Result<()>;
}
