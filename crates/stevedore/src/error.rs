// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for stevedore.

use std::time::Duration;

use thiserror::Error;

use crate::client::{ClientError, ServiceMode};

/// Reasons a convergence session ends without reaching its target.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConvergeError {
    /// The budget ran out before the service settled.
    #[error(
        "Service {service_id} did not converge within {}s; increase converge_config.timeout",
        .timeout.as_secs()
    )]
    Timeout {
        /// Service ID.
        service_id: String,
        /// Configured budget.
        timeout: Duration,
    },

    /// The update engine paused itself.
    #[error("Service {service_id} update paused")]
    UpdatePaused {
        /// Service ID.
        service_id: String,
    },

    /// The rollback engine paused itself.
    #[error("Service {service_id} rollback paused")]
    RollbackPaused {
        /// Service ID.
        service_id: String,
    },

    /// The update was rolled back. A rollback that settles cleanly is still
    /// a failed update.
    #[error("Service {service_id} update failed: rollback completed")]
    RollbackCompleted {
        /// Service ID.
        service_id: String,
    },

    /// Convergence is only tracked for replicated services.
    #[error("Service {service_id} is in {mode} mode; convergence requires replicated mode")]
    NotReplicated {
        /// Service ID.
        service_id: String,
        /// Reported mode.
        mode: ServiceMode,
    },

    /// A replicated service came back without a replica count.
    #[error("Service {service_id} is replicated but has no replica count")]
    MissingReplicaCount {
        /// Service ID.
        service_id: String,
    },

    /// A Swarm API call failed while polling.
    #[error("Swarm API error: {0}")]
    Client(#[from] ClientError),

    /// Removing the partially created service failed after another failure.
    #[error("{original}; removing service {service_id} also failed: {cleanup}")]
    CleanupFailed {
        /// Service ID.
        service_id: String,
        /// The failure that triggered removal.
        original: Box<ConvergeError>,
        /// The removal failure.
        #[source]
        cleanup: ClientError,
    },
}

impl ConvergeError {
    /// Whether the session ran out of time (directly or before a failed
    /// cleanup).
    pub fn is_timeout(&self) -> bool {
        match self {
            ConvergeError::Timeout { .. } => true,
            ConvergeError::CleanupFailed { original, .. } => original.is_timeout(),
            _ => false,
        }
    }
}

/// stevedore errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// A Swarm API call failed.
    #[error("Swarm API error: {0}")]
    Client(#[from] ClientError),

    /// The service did not reach its desired state.
    #[error(
        "Service {service_id} failed to converge (converge timeout {}s): {source}",
        .timeout.as_secs()
    )]
    Converge {
        /// Service ID.
        service_id: String,
        /// Configured convergence timeout.
        timeout: Duration,
        /// What went wrong.
        #[source]
        source: ConvergeError,
    },

    /// Service definition failed validation.
    #[error("Invalid service definition: {0}")]
    InvalidDefinition(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type using stevedore Error.
pub type Result<T> = std::result::Result<T, Error>;
