// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Convergence polling.
//!
//! After a create or update, the poller watches the service until it settles:
//!
//! ```text
//!   create:  pending-create ──(replicas running)──► running
//!
//!   update:  pending-update ──(UpdateStatus completed)──────────► completed
//!                 │        ──(replicas running)─────────────────► completed
//!                 │        ──(UpdateStatus paused)──────────────► paused
//!                 │        ──(UpdateStatus rollback_paused)─────► rollback-paused
//!                 │        ──(UpdateStatus rollback_completed)──► rollback-completed
//!                 └─(rollback_started)─► evaluate replicas ─────► rolled-back
//!
//!   either:  deadline passes while pending ─────────────────────► timeout
//! ```
//!
//! [`ConvergenceTracker::step`] is a pure function of one [`PollSnapshot`];
//! [`ConvergencePoller`] drives it against a [`SwarmClient`] on a fixed
//! interval until a terminal state or the deadline. The deadline covers the
//! initial delay too: a delay that reaches it ends the session with a timeout
//! and no poll. A create that fails to converge removes the service it
//! created.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use crate::client::{ClientError, Node, ServiceInspection, SwarmClient, Task, TaskFilter, UpdateState};
use crate::config::ConvergeConfig;
use crate::error::ConvergeError;
use crate::progress::{ConvergenceSession, ProgressReport, log_progress};
use crate::slot::{ActiveNodeSet, resolve_slots};

/// Stand-in deadline for budgets too large to represent, about 30 years out.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `start + budget`, saturating at [`FAR_FUTURE`] instead of overflowing.
pub(crate) fn deadline_after(start: Instant, budget: Duration) -> Instant {
    start
        .checked_add(budget)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// The mutation being converged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// A new service.
    Create,
    /// A spec change to an existing service.
    Update,
}

/// Poller state after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergeState {
    /// Not settled yet.
    Pending(Operation),
    /// Reached the replica target (create) or finished updating (update).
    Converged(Operation),
    /// A rollback reached its replica target. The update still failed.
    RolledBack,
    /// Swarm reports the rollback completed.
    RollbackCompleted,
    /// The update engine paused itself.
    Paused,
    /// The rollback engine paused itself.
    RollbackPaused,
}

impl ConvergeState {
    /// Whether polling stops in this state.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ConvergeState::Pending(_))
    }

    /// Whether this state is the successful end of the operation.
    pub fn is_success(self) -> bool {
        matches!(self, ConvergeState::Converged(_))
    }

    /// Short name used in logs.
    pub fn label(self) -> &'static str {
        match self {
            ConvergeState::Pending(Operation::Create) => "pending-create",
            ConvergeState::Pending(Operation::Update) => "pending-update",
            ConvergeState::Converged(Operation::Create) => "running",
            ConvergeState::Converged(Operation::Update) => "completed",
            ConvergeState::RolledBack => "rolled-back",
            ConvergeState::RollbackCompleted => "rollback-completed",
            ConvergeState::Paused => "paused",
            ConvergeState::RollbackPaused => "rollback-paused",
        }
    }
}

/// Everything fetched from Swarm for one tick.
#[derive(Debug, Clone)]
pub struct PollSnapshot {
    /// Service inspection.
    pub service: ServiceInspection,
    /// Tasks with desired state `running`.
    pub tasks: Vec<Task>,
    /// Node listing.
    pub nodes: Vec<Node>,
}

/// Result of one tick.
#[derive(Debug, Clone)]
pub struct Tick {
    /// State after the tick.
    pub state: ConvergeState,
    /// Progress details for display.
    pub report: ProgressReport,
}

/// Network-free convergence state machine.
#[derive(Debug, Clone)]
pub struct ConvergenceTracker {
    operation: Operation,
    session: ConvergenceSession,
    rollback: bool,
}

impl ConvergenceTracker {
    /// Track `operation` on `service_id`.
    pub fn new(service_id: impl Into<String>, operation: Operation) -> Self {
        Self {
            operation,
            session: ConvergenceSession::new(service_id),
            rollback: false,
        }
    }

    /// The operation being tracked.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Progress session.
    pub fn session(&self) -> &ConvergenceSession {
        &self.session
    }

    /// Advance the state machine with one snapshot.
    pub fn step(&mut self, snapshot: &PollSnapshot) -> Result<Tick, ConvergeError> {
        let active_nodes = ActiveNodeSet::from_nodes(&snapshot.nodes);
        let slots = resolve_slots(&snapshot.tasks, &active_nodes);
        debug!(
            service_id = %self.session.service_id(),
            tasks = snapshot.tasks.len(),
            active_nodes = active_nodes.len(),
            slots = slots.len(),
            "Resolved task slots"
        );

        let mut rollback = false;
        if self.operation == Operation::Update
            && let Some(update_state) = snapshot.service.update_state
        {
            let decided = match update_state {
                UpdateState::Updating => Some(ConvergeState::Pending(Operation::Update)),
                UpdateState::Completed => Some(ConvergeState::Converged(Operation::Update)),
                UpdateState::Paused => Some(ConvergeState::Paused),
                UpdateState::RollbackPaused => Some(ConvergeState::RollbackPaused),
                UpdateState::RollbackCompleted => Some(ConvergeState::RollbackCompleted),
                UpdateState::RollbackStarted => {
                    rollback = true;
                    None
                }
                UpdateState::Unknown => None,
            };
            if let Some(state) = decided {
                return Ok(Tick {
                    state,
                    report: self.session.report(state, None, &slots),
                });
            }
        }

        if rollback && !self.rollback {
            warn!(service_id = %self.session.service_id(), "Service update is rolling back");
        }
        self.rollback = rollback;

        let progress = self
            .session
            .evaluate(&snapshot.service.mode, &slots, rollback)?;
        let state = match (progress.converged, rollback) {
            (true, true) => ConvergeState::RolledBack,
            (true, false) => ConvergeState::Converged(self.operation),
            (false, _) => ConvergeState::Pending(self.operation),
        };

        Ok(Tick {
            state,
            report: self.session.report(state, Some(progress), &slots),
        })
    }
}

/// Drives a [`ConvergenceTracker`] against a live [`SwarmClient`].
pub struct ConvergencePoller<'a, C: ?Sized, R> {
    client: &'a C,
    config: ConvergeConfig,
    tracker: ConvergenceTracker,
    reporter: R,
}

impl<'a, C> ConvergencePoller<'a, C, fn(&ProgressReport)>
where
    C: SwarmClient + ?Sized,
{
    /// Poller that logs progress through `tracing`.
    pub fn new(
        client: &'a C,
        service_id: impl Into<String>,
        operation: Operation,
        config: ConvergeConfig,
    ) -> Self {
        Self {
            client,
            config,
            tracker: ConvergenceTracker::new(service_id, operation),
            reporter: log_progress,
        }
    }
}

impl<'a, C, R> ConvergencePoller<'a, C, R>
where
    C: SwarmClient + ?Sized,
    R: FnMut(&ProgressReport),
{
    /// Replace the progress reporter.
    pub fn with_reporter<R2>(self, reporter: R2) -> ConvergencePoller<'a, C, R2>
    where
        R2: FnMut(&ProgressReport),
    {
        ConvergencePoller {
            client: self.client,
            config: self.config,
            tracker: self.tracker,
            reporter,
        }
    }

    fn service_id(&self) -> &str {
        self.tracker.session().service_id()
    }

    /// Poll until the service settles, fails, or the timeout passes.
    ///
    /// A create that does not converge removes the service before the error
    /// is returned.
    pub async fn run(mut self) -> Result<(), ConvergeError> {
        let started = Instant::now();
        let deadline = deadline_after(started, self.config.timeout);
        let operation = self.tracker.operation();

        info!(
            service_id = %self.service_id(),
            operation = ?operation,
            delay_secs = self.config.delay.as_secs(),
            timeout_secs = self.config.timeout.as_secs(),
            "Waiting for service to converge"
        );

        if !self.config.delay.is_zero() {
            sleep(self.config.delay.min(deadline.saturating_duration_since(started))).await;
        }

        let outcome = if Instant::now() >= deadline {
            Err(self.timeout())
        } else {
            self.poll_until(deadline).await
        };
        match outcome {
            Ok(state) => {
                info!(
                    service_id = %self.service_id(),
                    state = state.label(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Service converged"
                );
                Ok(())
            }
            Err(err) if operation == Operation::Create => Err(self.compensate(err).await),
            Err(err) => {
                warn!(service_id = %self.service_id(), error = %err, "Service update did not converge");
                Err(err)
            }
        }
    }

    async fn poll_until(&mut self, deadline: Instant) -> Result<ConvergeState, ConvergeError> {
        loop {
            let snapshot = self.fetch().await?;
            let tick = self.tracker.step(&snapshot)?;
            (self.reporter)(&tick.report);

            let service_id = self.service_id().to_string();
            match tick.state {
                ConvergeState::Pending(_) => {}
                ConvergeState::Converged(_) => return Ok(tick.state),
                ConvergeState::Paused => {
                    return Err(ConvergeError::UpdatePaused { service_id });
                }
                ConvergeState::RollbackPaused => {
                    return Err(ConvergeError::RollbackPaused { service_id });
                }
                ConvergeState::RollbackCompleted | ConvergeState::RolledBack => {
                    return Err(ConvergeError::RollbackCompleted { service_id });
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(self.timeout());
            }
            sleep(self.config.poll_interval().min(deadline - now)).await;
        }
    }

    fn timeout(&self) -> ConvergeError {
        ConvergeError::Timeout {
            service_id: self.service_id().to_string(),
            timeout: self.config.timeout,
        }
    }

    async fn fetch(&self) -> Result<PollSnapshot, ClientError> {
        let service = self.client.inspect_service(self.service_id()).await?;
        let tasks = self
            .client
            .list_tasks(&TaskFilter::running(self.service_id()))
            .await?;
        let nodes = self.client.list_nodes().await?;
        Ok(PollSnapshot {
            service,
            tasks,
            nodes,
        })
    }

    async fn compensate(&self, original: ConvergeError) -> ConvergeError {
        let service_id = self.service_id().to_string();
        warn!(
            service_id = %service_id,
            error = %original,
            "Removing service that failed to converge"
        );
        match self.client.remove_service(&service_id).await {
            Ok(()) | Err(ClientError::ServiceNotFound(_)) => original,
            Err(cleanup) => {
                error!(
                    service_id = %service_id,
                    error = %cleanup,
                    "Failed to remove service after convergence failure"
                );
                ConvergeError::CleanupFailed {
                    service_id,
                    original: Box::new(original),
                    cleanup,
                }
            }
        }
    }
}
