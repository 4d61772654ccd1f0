// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Declarative service definitions.
//!
//! A definition is a JSON document describing one Swarm service:
//!
//! ```json
//! {
//!   "name": "web",
//!   "image": "nginx:1.27",
//!   "env": { "PORT": "8080" },
//!   "mode": { "replicated": { "replicas": 3 } },
//!   "update_config": { "parallelism": 1, "delay": "10s", "failure_action": "rollback" },
//!   "converge_config": { "delay": "7s", "timeout": "3m" }
//! }
//! ```
//!
//! `converge_config` is optional. Without it, create and update return as
//! soon as Swarm accepts the mutation.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ConvergeConfig, humantime_serde};
use crate::error::{Error, Result};

/// Declared state of one Swarm service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceDefinition {
    /// Service name.
    pub name: String,
    /// Container image reference.
    pub image: String,
    /// Entrypoint override.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Arguments to the entrypoint.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Container environment.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Service labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Scheduling mode.
    #[serde(default)]
    pub mode: ModeSpec,
    /// Rolling update policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_config: Option<UpdatePolicy>,
    /// Rollback policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_config: Option<UpdatePolicy>,
    /// When present, create/update wait for the service to converge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converge_config: Option<ConvergeConfig>,
}

/// Declared scheduling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeSpec {
    /// Fixed number of replicas.
    Replicated {
        /// Desired replica count.
        replicas: u64,
    },
    /// One task per eligible node.
    Global,
}

impl Default for ModeSpec {
    fn default() -> Self {
        ModeSpec::Replicated { replicas: 1 }
    }
}

/// What Swarm does when an updated task fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureAction {
    /// Pause the update.
    #[default]
    Pause,
    /// Keep updating.
    Continue,
    /// Roll back to the previous spec.
    Rollback,
}

impl FailureAction {
    /// Docker wire string.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureAction::Pause => "pause",
            FailureAction::Continue => "continue",
            FailureAction::Rollback => "rollback",
        }
    }
}

/// Order of stopping old and starting new tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateOrder {
    /// Stop the old task before starting the new one.
    #[default]
    StopFirst,
    /// Start the new task before stopping the old one.
    StartFirst,
}

impl UpdateOrder {
    /// Docker wire string.
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateOrder::StopFirst => "stop-first",
            UpdateOrder::StartFirst => "start-first",
        }
    }
}

/// Rolling update or rollback policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePolicy {
    /// Tasks updated at once. 0 means all.
    #[serde(default = "default_parallelism")]
    pub parallelism: u64,
    /// Pause between batches.
    #[serde(with = "humantime_serde", default = "Duration::default")]
    pub delay: Duration,
    /// Reaction to a failed task.
    #[serde(default)]
    pub failure_action: FailureAction,
    /// How long each task is watched for failure after an update.
    #[serde(with = "humantime_serde", default = "default_monitor")]
    pub monitor: Duration,
    /// Fraction of tasks allowed to fail, 0.0 to 1.0.
    #[serde(default)]
    pub max_failure_ratio: f64,
    /// Stop/start order.
    #[serde(default)]
    pub order: UpdateOrder,
}

fn default_parallelism() -> u64 {
    1
}

fn default_monitor() -> Duration {
    Duration::from_secs(5)
}

impl Default for UpdatePolicy {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            delay: Duration::ZERO,
            failure_action: FailureAction::default(),
            monitor: default_monitor(),
            max_failure_ratio: 0.0,
            order: UpdateOrder::default(),
        }
    }
}

impl ServiceDefinition {
    /// Minimal replicated definition.
    pub fn new(name: impl Into<String>, image: impl Into<String>, replicas: u64) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            command: Vec::new(),
            args: Vec::new(),
            env: BTreeMap::new(),
            labels: BTreeMap::new(),
            mode: ModeSpec::Replicated { replicas },
            update_config: None,
            rollback_config: None,
            converge_config: None,
        }
    }

    /// Attach convergence parameters.
    pub fn with_converge_config(mut self, config: ConvergeConfig) -> Self {
        self.converge_config = Some(config);
        self
    }

    /// Parse and validate a JSON definition.
    pub fn from_json(json: &str) -> Result<Self> {
        let definition: ServiceDefinition = serde_json::from_str(json)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Read, parse and validate a JSON definition file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Check the definition for mistakes Swarm would reject or that would
    /// make convergence impossible to track.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidDefinition("name must not be empty".into()));
        }
        if self.image.trim().is_empty() {
            return Err(Error::InvalidDefinition(format!(
                "service {}: image must not be empty",
                self.name
            )));
        }
        if let Some(key) = self.env.keys().find(|k| k.is_empty() || k.contains('=')) {
            return Err(Error::InvalidDefinition(format!(
                "service {}: invalid environment variable name {:?}",
                self.name, key
            )));
        }
        for policy in [&self.update_config, &self.rollback_config].into_iter().flatten() {
            if !(0.0..=1.0).contains(&policy.max_failure_ratio) {
                return Err(Error::InvalidDefinition(format!(
                    "service {}: max_failure_ratio must be between 0 and 1",
                    self.name
                )));
            }
        }
        if let Some(converge) = &self.converge_config {
            if converge.timeout.is_zero() {
                return Err(Error::InvalidDefinition(format!(
                    "service {}: converge_config.timeout must be greater than zero",
                    self.name
                )));
            }
            if self.mode == ModeSpec::Global {
                return Err(Error::InvalidDefinition(format!(
                    "service {}: converge_config requires replicated mode",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Environment as `KEY=value` pairs, sorted by key.
    pub fn env_list(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_definition() {
        let definition = ServiceDefinition::from_json(
            r#"{
                "name": "web",
                "image": "nginx:1.27",
                "command": ["nginx"],
                "args": ["-g", "daemon off;"],
                "env": {"PORT": "8080", "MODE": "prod"},
                "labels": {"team": "edge"},
                "mode": {"replicated": {"replicas": 3}},
                "update_config": {
                    "parallelism": 2,
                    "delay": "10s",
                    "failure_action": "rollback",
                    "order": "start-first"
                },
                "converge_config": {"delay": "1s", "timeout": "2m"}
            }"#,
        )
        .unwrap();

        assert_eq!(definition.mode, ModeSpec::Replicated { replicas: 3 });
        assert_eq!(definition.env_list(), vec!["MODE=prod", "PORT=8080"]);
        let update = definition.update_config.unwrap();
        assert_eq!(update.parallelism, 2);
        assert_eq!(update.delay, Duration::from_secs(10));
        assert_eq!(update.failure_action, FailureAction::Rollback);
        assert_eq!(update.order, UpdateOrder::StartFirst);
        assert_eq!(update.monitor, Duration::from_secs(5));
        let converge = definition.converge_config.unwrap();
        assert_eq!(converge.timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_defaults_to_single_replica() {
        let definition =
            ServiceDefinition::from_json(r#"{"name": "api", "image": "api:latest"}"#).unwrap();
        assert_eq!(definition.mode, ModeSpec::Replicated { replicas: 1 });
        assert!(definition.converge_config.is_none());
    }

    #[test]
    fn test_global_mode_parses() {
        let definition = ServiceDefinition::from_json(
            r#"{"name": "agent", "image": "agent:1", "mode": "global"}"#,
        )
        .unwrap();
        assert_eq!(definition.mode, ModeSpec::Global);
    }

    #[test]
    fn test_rejects_empty_image() {
        let err = ServiceDefinition::from_json(r#"{"name": "api", "image": " "}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidDefinition(_)));
    }

    #[test]
    fn test_rejects_converge_config_on_global_service() {
        let err = ServiceDefinition::from_json(
            r#"{"name": "agent", "image": "agent:1", "mode": "global", "converge_config": {}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("replicated mode"));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let err = ServiceDefinition::from_json(
            r#"{"name": "api", "image": "api:1", "replicas": 3}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_rejects_bad_failure_ratio() {
        let mut definition = ServiceDefinition::new("api", "api:1", 2);
        definition.rollback_config = Some(UpdatePolicy {
            max_failure_ratio: 1.5,
            ..UpdatePolicy::default()
        });
        assert!(definition.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.json");
        std::fs::write(&path, r#"{"name": "api", "image": "api:2"}"#).unwrap();

        let definition = ServiceDefinition::from_file(&path).unwrap();
        assert_eq!(definition.image, "api:2");
    }
}
