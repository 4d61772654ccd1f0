// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! stevedore - Docker Swarm Service Convergence
//!
//! This crate deploys Swarm services and tracks them until their replicas
//! are actually running. Swarm accepts a create or update long before the
//! tasks behind it are scheduled, pulled and started; stevedore polls the
//! manager until the service settles, fails, or a time budget runs out.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                 ServiceReconciler (driver)                        │
//! │        create / update / converge / inspect / remove              │
//! └──────────────────────────────────────────────────────────────────┘
//!                 │ converge_config present
//!                 ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                 ConvergencePoller (poller)                        │
//! │   delay ─► fetch snapshot ─► ConvergenceTracker::step ─► sleep 5s │
//! └──────────────────────────────────────────────────────────────────┘
//!        │                 │                        │
//!        ▼                 ▼                        ▼
//!   resolve_slots    ConvergenceSession       ProgressReport
//!      (slot)           (progress)          ─► reporter (tracing)
//!        │
//!        ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                SwarmClient (client)                               │
//! │       DockerSwarmClient (bollard)  │  MockSwarmClient (tests)      │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Convergence
//!
//! | Outcome | Create | Update |
//! |---------|--------|--------|
//! | Replicas running | success (`running`) | success (`completed`) |
//! | `UpdateStatus` completed | n/a | success, no counting |
//! | `UpdateStatus` paused / rollback paused | n/a | failure |
//! | Rollback completed or reached its target | n/a | failure |
//! | Deadline passed | failure, service removed | failure |
//!
//! # Configuration
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `DOCKER_HOST` | local socket | Docker daemon address |
//! | `STEVEDORE_CONVERGE_DELAY` | `7s` | Wait before the first poll |
//! | `STEVEDORE_CONVERGE_TIMEOUT` | `3m` | Convergence budget |
//! | `STEVEDORE_DRAIN_TIMEOUT` | `30s` | Wait for tasks after removal |

#![deny(missing_docs)]

/// Swarm API clients (Docker Engine and mock).
pub mod client;

/// Configuration loaded from environment variables.
pub mod config;

/// Declarative service definitions.
pub mod definition;

/// Create, update, converge and remove services.
pub mod driver;

/// Error types.
pub mod error;

/// Convergence polling state machine.
pub mod poller;

/// Replica progress evaluation and reporting.
pub mod progress;

/// Slot resolution over task listings.
pub mod slot;

/// Swarm task states.
pub mod task_state;

pub use client::{DockerSwarmClient, MockSwarmClient, SwarmClient};
pub use config::{Config, ConvergeConfig};
pub use definition::ServiceDefinition;
pub use driver::ServiceReconciler;
pub use error::{ConvergeError, Error, Result};
pub use poller::{ConvergeState, ConvergencePoller, Operation};
pub use task_state::TaskState;
