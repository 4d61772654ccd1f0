// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Docker Engine client.
//!
//! Talks to a Swarm manager through [`bollard`]. The connection goes to an
//! explicit host when one is configured and otherwise to the local socket.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::models::ServiceSpec;
use bollard::query_parameters::{
    InspectServiceOptionsBuilder, ListNodesOptions, ListTasksOptionsBuilder,
    UpdateServiceOptionsBuilder,
};
use bollard::{API_DEFAULT_VERSION, Docker};
use tracing::{debug, warn};

use super::traits::*;
use super::wire;
use crate::definition::ServiceDefinition;

/// Request timeout for daemon connections, in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 120;

/// [`SwarmClient`] backed by the Docker Engine API.
#[derive(Debug, Clone)]
pub struct DockerSwarmClient {
    docker: Docker,
}

impl DockerSwarmClient {
    /// Connect using `DOCKER_HOST` or the local socket.
    pub fn connect() -> Result<Self> {
        Self::connect_to(None)
    }

    /// Connect to `host` (`unix://`, `tcp://` or `http://`), or to the local
    /// defaults when `host` is `None`.
    pub fn connect_to(host: Option<&str>) -> Result<Self> {
        let docker = match host {
            None => Docker::connect_with_local_defaults(),
            Some(addr) if addr.starts_with("unix://") => {
                Docker::connect_with_unix(addr, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
            Some(addr) => Docker::connect_with_http(addr, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION),
        }
        .map_err(|e| ClientError::Connection(format!("Failed to connect to Docker: {e}")))?;
        Ok(Self { docker })
    }

    /// Wrap an existing connection.
    pub fn with_docker(docker: Docker) -> Self {
        Self { docker }
    }
}

fn map_error(err: bollard::errors::Error) -> ClientError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => ClientError::Api {
            status: status_code,
            message,
        },
        other => ClientError::Connection(other.to_string()),
    }
}

fn map_service_error(service_id: &str, err: bollard::errors::Error) -> ClientError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => ClientError::ServiceNotFound(service_id.to_string()),
        other => map_error(other),
    }
}

#[async_trait]
impl SwarmClient for DockerSwarmClient {
    fn client_type(&self) -> &'static str {
        "docker"
    }

    async fn inspect_service(&self, service_id: &str) -> Result<ServiceInspection> {
        let service = self
            .docker
            .inspect_service(
                service_id,
                Some(
                    InspectServiceOptionsBuilder::default()
                        .insert_defaults(true)
                        .build(),
                ),
            )
            .await
            .map_err(|e| map_service_error(service_id, e))?;
        wire::service_from_json(serde_json::to_value(&service)?)
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut filters: HashMap<&str, Vec<&str>> = HashMap::new();
        filters.insert("service", vec![filter.service.as_str()]);
        if let Some(desired) = filter.desired_state {
            filters.insert("desired-state", vec![desired.as_str()]);
        }
        let options = ListTasksOptionsBuilder::default().filters(&filters).build();

        let tasks = self
            .docker
            .list_tasks(Some(options))
            .await
            .map_err(|e| map_service_error(&filter.service, e))?;

        let mut decoded = Vec::with_capacity(tasks.len());
        for task in &tasks {
            match wire::task_from_json(serde_json::to_value(task)?) {
                Ok(task) => decoded.push(task),
                Err(ClientError::InvalidResponse(reason)) => {
                    warn!(service = %filter.service, %reason, "Skipping malformed task");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(decoded)
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let nodes = self
            .docker
            .list_nodes(None::<ListNodesOptions>)
            .await
            .map_err(map_error)?;
        nodes
            .iter()
            .map(|node| wire::node_from_json(serde_json::to_value(node)?))
            .collect()
    }

    async fn create_service(&self, definition: &ServiceDefinition) -> Result<String> {
        let spec: ServiceSpec = serde_json::from_value(wire::service_spec_json(definition))?;
        let created = self
            .docker
            .create_service(spec, None)
            .await
            .map_err(map_error)?;
        let id = wire::created_id_from_json(serde_json::to_value(&created)?)?;
        debug!(service_id = %id, name = %definition.name, "Service created");
        Ok(id)
    }

    async fn update_service(
        &self,
        service_id: &str,
        version: u64,
        definition: &ServiceDefinition,
    ) -> Result<Vec<String>> {
        let spec: ServiceSpec = serde_json::from_value(wire::service_spec_json(definition))?;
        let version = i32::try_from(version).map_err(|_| {
            ClientError::InvalidResponse(format!("service version {version} out of range"))
        })?;
        let options = UpdateServiceOptionsBuilder::default().version(version).build();
        let updated = self
            .docker
            .update_service(service_id, spec, options, None)
            .await
            .map_err(|e| map_service_error(service_id, e))?;
        wire::warnings_from_json(serde_json::to_value(&updated)?)
    }

    async fn remove_service(&self, service_id: &str) -> Result<()> {
        self.docker
            .delete_service(service_id)
            .await
            .map_err(|e| map_service_error(service_id, e))
    }
}
