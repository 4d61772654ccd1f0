// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared fixtures for stevedore integration tests.

#![allow(dead_code)]

use std::time::Duration;

use stevedore::client::{MockFrame, UpdateState};
use stevedore::config::ConvergeConfig;

pub const SERVICE_ID: &str = "svc-mock";

/// Convergence config with whole-second delay and timeout.
pub fn converge(delay_secs: u64, timeout_secs: u64) -> ConvergeConfig {
    ConvergeConfig::new(
        Duration::from_secs(delay_secs),
        Duration::from_secs(timeout_secs),
    )
}

/// Replicated service frame with `running` of `replicas` tasks running.
pub fn replicated(replicas: u64, running: u64) -> MockFrame {
    MockFrame::replicated(SERVICE_ID, replicas).running(running)
}

/// Replicated service frame mid-update.
pub fn updating(replicas: u64, running: u64, state: UpdateState) -> MockFrame {
    replicated(replicas, running).update_state(state)
}
