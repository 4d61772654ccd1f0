// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Service reconciliation.
//!
//! [`ServiceReconciler`] turns a [`ServiceDefinition`] into Swarm mutations
//! and, when the definition carries a [`ConvergeConfig`], blocks until the
//! service converges. Without one, create and update return once Swarm has
//! accepted the change.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::client::{ClientError, ServiceInspection, SwarmClient, TaskFilter};
use crate::config::{Config, ConvergeConfig, DEFAULT_DRAIN_TIMEOUT};
use crate::definition::ServiceDefinition;
use crate::error::{Error, Result};
use crate::poller::{ConvergencePoller, Operation, deadline_after};

/// Interval between task listings while a removed service drains.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Creates, updates, converges and removes Swarm services.
pub struct ServiceReconciler {
    client: Arc<dyn SwarmClient>,
    drain_timeout: Duration,
}

impl ServiceReconciler {
    /// Reconciler with the default drain timeout.
    pub fn new(client: Arc<dyn SwarmClient>) -> Self {
        Self {
            client,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Reconciler using the settings in `config`.
    pub fn from_config(client: Arc<dyn SwarmClient>, config: &Config) -> Self {
        Self::new(client).with_drain_timeout(config.drain_timeout)
    }

    /// Set how long [`remove`](Self::remove) waits for tasks to go away.
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// The underlying client.
    pub fn client(&self) -> &Arc<dyn SwarmClient> {
        &self.client
    }

    /// Create a service and return its ID.
    ///
    /// If the definition has a `converge_config`, waits for the replicas to
    /// run. A service that fails to converge is removed again before the
    /// error is returned.
    pub async fn create(&self, definition: &ServiceDefinition) -> Result<String> {
        definition.validate()?;
        let service_id = self.client.create_service(definition).await?;
        info!(
            service_id = %service_id,
            name = %definition.name,
            image = %definition.image,
            client = self.client.client_type(),
            "Service created"
        );

        if let Some(config) = &definition.converge_config {
            self.converge(&service_id, config, false).await?;
        }
        Ok(service_id)
    }

    /// Update an existing service, returning any warnings Swarm reported.
    ///
    /// The current object version is read first so the update is applied on
    /// top of it. With a `converge_config`, waits for the rollout to finish.
    pub async fn update(
        &self,
        service_id: &str,
        definition: &ServiceDefinition,
    ) -> Result<Vec<String>> {
        definition.validate()?;
        let current = self.client.inspect_service(service_id).await?;
        let warnings = self
            .client
            .update_service(service_id, current.version, definition)
            .await?;
        for warning in &warnings {
            warn!(service_id = %service_id, %warning, "Swarm reported a warning");
        }
        info!(
            service_id = %service_id,
            version = current.version,
            image = %definition.image,
            "Service update submitted"
        );

        if let Some(config) = &definition.converge_config {
            self.converge(service_id, config, true).await?;
        }
        Ok(warnings)
    }

    /// Wait for `service_id` to converge after a create (`is_update == false`)
    /// or an update.
    pub async fn converge(
        &self,
        service_id: &str,
        config: &ConvergeConfig,
        is_update: bool,
    ) -> Result<()> {
        let operation = if is_update {
            Operation::Update
        } else {
            Operation::Create
        };
        ConvergencePoller::new(self.client.as_ref(), service_id, operation, *config)
            .run()
            .await
            .map_err(|source| Error::Converge {
                service_id: service_id.to_string(),
                timeout: config.timeout,
                source,
            })
    }

    /// Current state of a service.
    pub async fn inspect(&self, service_id: &str) -> Result<ServiceInspection> {
        Ok(self.client.inspect_service(service_id).await?)
    }

    /// Remove a service and wait for its tasks to stop.
    ///
    /// Tasks still running when the drain timeout passes are logged and left
    /// to Swarm.
    pub async fn remove(&self, service_id: &str) -> Result<()> {
        self.client.remove_service(service_id).await?;
        info!(service_id = %service_id, "Service removed");
        self.wait_for_drain(service_id).await
    }

    async fn wait_for_drain(&self, service_id: &str) -> Result<()> {
        let deadline = deadline_after(Instant::now(), self.drain_timeout);
        let filter = TaskFilter::all(service_id);

        loop {
            let remaining = match self.client.list_tasks(&filter).await {
                Ok(tasks) => tasks.iter().filter(|t| !t.state.is_terminal()).count(),
                Err(ClientError::ServiceNotFound(_)) => 0,
                Err(e) => return Err(e.into()),
            };
            if remaining == 0 {
                debug!(service_id = %service_id, "Service tasks drained");
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    service_id = %service_id,
                    remaining,
                    drain_timeout_secs = self.drain_timeout.as_secs(),
                    "Service tasks still running after drain timeout"
                );
                return Ok(());
            }
            debug!(service_id = %service_id, remaining, "Waiting for service tasks to drain");
            sleep(DRAIN_POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}
