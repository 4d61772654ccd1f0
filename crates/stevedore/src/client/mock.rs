// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock Swarm client for testing.
//!
//! Replays a scripted sequence of [`MockFrame`]s instead of talking to a
//! daemon. Every `inspect_service` call advances to the next frame; task and
//! node listings answer from the frame selected by the latest inspect. Once
//! the script runs out the last frame repeats.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::traits::*;
use crate::definition::ServiceDefinition;
use crate::task_state::TaskState;

/// What Swarm reports at one poll.
#[derive(Debug, Clone)]
pub struct MockFrame {
    /// Service inspection.
    pub service: ServiceInspection,
    /// Every task of the service (listing filters apply on top).
    pub tasks: Vec<Task>,
    /// Node listing.
    pub nodes: Vec<Node>,
}

impl MockFrame {
    /// Replicated service with one ready node `node-1` and no tasks.
    pub fn replicated(service_id: &str, replicas: u64) -> Self {
        Self {
            service: ServiceInspection {
                id: service_id.to_string(),
                name: service_id.to_string(),
                version: 1,
                mode: ServiceMode::Replicated {
                    replicas: Some(replicas),
                },
                update_state: None,
            },
            tasks: Vec::new(),
            nodes: vec![Node {
                id: "node-1".to_string(),
                state: NodeState::Ready,
            }],
        }
    }

    /// Add a task on `node-1` desired `running`.
    pub fn task(self, slot: u64, state: TaskState) -> Self {
        self.task_on(slot, TaskState::Running, state, Some("node-1"))
    }

    /// Add a task with explicit desired state and node.
    pub fn task_on(
        mut self,
        slot: u64,
        desired_state: TaskState,
        state: TaskState,
        node_id: Option<&str>,
    ) -> Self {
        let id = format!("{}-task-{}-{}", self.service.id, slot, self.tasks.len());
        self.tasks.push(Task {
            id,
            service_id: self.service.id.clone(),
            slot,
            desired_state,
            state,
            node_id: node_id.map(str::to_string),
            error: None,
            observed_at: Utc::now(),
        });
        self
    }

    /// Add `count` running tasks in slots `1..=count`.
    pub fn running(self, count: u64) -> Self {
        (1..=count).fold(self, |frame, slot| frame.task(slot, TaskState::Running))
    }

    /// Add a node.
    pub fn node(mut self, id: &str, state: NodeState) -> Self {
        self.nodes.push(Node {
            id: id.to_string(),
            state,
        });
        self
    }

    /// Set `UpdateStatus.State`.
    pub fn update_state(mut self, state: UpdateState) -> Self {
        self.service.update_state = Some(state);
        self
    }

    /// Set the object version.
    pub fn version(mut self, version: u64) -> Self {
        self.service.version = version;
        self
    }

    /// Set the service mode.
    pub fn mode(mut self, mode: ServiceMode) -> Self {
        self.service.mode = mode;
        self
    }
}

#[derive(Debug, Default)]
struct MockState {
    frames: Vec<MockFrame>,
    inspect_calls: usize,
    list_task_calls: usize,
    created: Vec<ServiceDefinition>,
    updated: Vec<(String, u64, ServiceDefinition)>,
    removed: Vec<String>,
    gone: Vec<String>,
    fail_inspect_on_call: Option<usize>,
    fail_remove: Option<String>,
    next_service_id: String,
}

impl MockState {
    fn current_frame(&self) -> Option<&MockFrame> {
        let index = self.inspect_calls.saturating_sub(1).min(self.frames.len().checked_sub(1)?);
        self.frames.get(index)
    }

    fn is_removed(&self, service_id: &str) -> bool {
        self.gone.iter().any(|id| id == service_id)
    }
}

/// Mock Swarm client for testing.
#[derive(Debug, Clone)]
pub struct MockSwarmClient {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockSwarmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSwarmClient {
    /// Create a mock with no frames. Created services get the ID `svc-mock`.
    pub fn new() -> Self {
        Self::with_frames(Vec::new())
    }

    /// Create a mock replaying `frames`.
    pub fn with_frames(frames: Vec<MockFrame>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                frames,
                next_service_id: "svc-mock".to_string(),
                ..MockState::default()
            })),
        }
    }

    /// Append a frame to the script.
    pub async fn push_frame(&self, frame: MockFrame) {
        self.state.lock().await.frames.push(frame);
    }

    /// ID returned by the next `create_service`.
    pub async fn set_next_service_id(&self, id: &str) {
        self.state.lock().await.next_service_id = id.to_string();
    }

    /// Make the `n`th inspect (1-based) fail with a connection error.
    pub async fn fail_inspect_on_call(&self, n: usize) {
        self.state.lock().await.fail_inspect_on_call = Some(n);
    }

    /// Make every `remove_service` fail with `message`.
    pub async fn fail_remove(&self, message: &str) {
        self.state.lock().await.fail_remove = Some(message.to_string());
    }

    /// Number of `inspect_service` calls so far.
    pub async fn inspect_calls(&self) -> usize {
        self.state.lock().await.inspect_calls
    }

    /// Number of `list_tasks` calls so far.
    pub async fn list_task_calls(&self) -> usize {
        self.state.lock().await.list_task_calls
    }

    /// Definitions passed to `create_service`.
    pub async fn created(&self) -> Vec<ServiceDefinition> {
        self.state.lock().await.created.clone()
    }

    /// `(service_id, version, definition)` passed to `update_service`.
    pub async fn updated(&self) -> Vec<(String, u64, ServiceDefinition)> {
        self.state.lock().await.updated.clone()
    }

    /// Service IDs passed to `remove_service`, including failed attempts.
    pub async fn removed(&self) -> Vec<String> {
        self.state.lock().await.removed.clone()
    }
}

#[async_trait]
impl SwarmClient for MockSwarmClient {
    fn client_type(&self) -> &'static str {
        "mock"
    }

    async fn inspect_service(&self, service_id: &str) -> Result<ServiceInspection> {
        let mut state = self.state.lock().await;
        state.inspect_calls += 1;
        if state.fail_inspect_on_call == Some(state.inspect_calls) {
            return Err(ClientError::Connection("mock connection reset".to_string()));
        }
        if state.is_removed(service_id) {
            return Err(ClientError::ServiceNotFound(service_id.to_string()));
        }
        state
            .current_frame()
            .map(|frame| frame.service.clone())
            .ok_or_else(|| ClientError::ServiceNotFound(service_id.to_string()))
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut state = self.state.lock().await;
        state.list_task_calls += 1;
        if state.is_removed(&filter.service) {
            return Ok(Vec::new());
        }
        Ok(state
            .current_frame()
            .map(|frame| {
                frame
                    .tasks
                    .iter()
                    .filter(|task| filter.matches(task))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let state = self.state.lock().await;
        Ok(state
            .current_frame()
            .map(|frame| frame.nodes.clone())
            .unwrap_or_default())
    }

    async fn create_service(&self, definition: &ServiceDefinition) -> Result<String> {
        let mut state = self.state.lock().await;
        state.created.push(definition.clone());
        Ok(state.next_service_id.clone())
    }

    async fn update_service(
        &self,
        service_id: &str,
        version: u64,
        definition: &ServiceDefinition,
    ) -> Result<Vec<String>> {
        let mut state = self.state.lock().await;
        if state.is_removed(service_id) {
            return Err(ClientError::ServiceNotFound(service_id.to_string()));
        }
        if let Some(frame) = state.current_frame()
            && frame.service.version != version
        {
            return Err(ClientError::Api {
                status: 500,
                message: format!(
                    "update out of sequence: version {} is not {}",
                    version, frame.service.version
                ),
            });
        }
        state
            .updated
            .push((service_id.to_string(), version, definition.clone()));
        Ok(Vec::new())
    }

    async fn remove_service(&self, service_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.removed.push(service_id.to_string());
        match &state.fail_remove {
            Some(message) => Err(ClientError::Api {
                status: 500,
                message: message.clone(),
            }),
            None => {
                state.gone.push(service_id.to_string());
                Ok(())
            }
        }
    }
}
