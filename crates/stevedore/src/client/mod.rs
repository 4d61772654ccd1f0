// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Swarm API clients.

pub mod docker;
pub mod mock;
mod traits;
mod wire;

pub use docker::DockerSwarmClient;
pub use mock::{MockFrame, MockSwarmClient};
pub use traits::*;
