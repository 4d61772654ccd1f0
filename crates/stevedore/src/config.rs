// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for stevedore.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Fixed interval between convergence polls.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default wait before the first convergence poll.
pub const DEFAULT_CONVERGE_DELAY: Duration = Duration::from_secs(7);

/// Default total convergence budget.
pub const DEFAULT_CONVERGE_TIMEOUT: Duration = Duration::from_secs(180);

/// Default bound on waiting for a removed service's tasks to disappear.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Convergence parameters for one create or update.
///
/// Durations are written as humantime strings (`"7s"`, `"3m"`, `"1m30s"`).
/// Polls run every [`MIN_POLL_INTERVAL`] after the initial `delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConvergeConfig {
    /// Wait before the first poll.
    #[serde(with = "humantime_serde", default = "default_delay")]
    pub delay: Duration,
    /// Total budget, measured from the start of the poll loop.
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

fn default_delay() -> Duration {
    DEFAULT_CONVERGE_DELAY
}

fn default_timeout() -> Duration {
    DEFAULT_CONVERGE_TIMEOUT
}

impl Default for ConvergeConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_CONVERGE_DELAY,
            timeout: DEFAULT_CONVERGE_TIMEOUT,
        }
    }
}

impl ConvergeConfig {
    /// Config with explicit delay and timeout.
    pub fn new(delay: Duration, timeout: Duration) -> Self {
        Self { delay, timeout }
    }

    /// Interval between polls.
    pub fn poll_interval(&self) -> Duration {
        MIN_POLL_INTERVAL
    }
}

/// stevedore configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Docker daemon address. `None` uses the local socket.
    pub docker_host: Option<String>,
    /// Convergence parameters used when a definition carries none.
    pub converge: ConvergeConfig,
    /// How long `remove` waits for the service's tasks to go away.
    pub drain_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let docker_host = lookup("DOCKER_HOST").filter(|v| !v.is_empty());

        let delay = duration_var(&lookup, "STEVEDORE_CONVERGE_DELAY", DEFAULT_CONVERGE_DELAY)?;
        let timeout = duration_var(
            &lookup,
            "STEVEDORE_CONVERGE_TIMEOUT",
            DEFAULT_CONVERGE_TIMEOUT,
        )?;
        if timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("STEVEDORE_CONVERGE_TIMEOUT"));
        }

        let drain_timeout =
            duration_var(&lookup, "STEVEDORE_DRAIN_TIMEOUT", DEFAULT_DRAIN_TIMEOUT)?;

        Ok(Self {
            docker_host,
            converge: ConvergeConfig::new(delay, timeout),
            drain_timeout,
        })
    }
}

fn duration_var<F>(lookup: &F, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => humantime::parse_duration(value.trim()).map_err(|e| {
            ConfigError::InvalidDuration {
                var: key,
                value,
                reason: e.to_string(),
            }
        }),
        None => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A duration variable could not be parsed.
    #[error("Invalid duration in {var}={value:?}: {reason}")]
    InvalidDuration {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
        /// Parser message.
        reason: String,
    },
    /// A timeout variable was set to zero.
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

/// Serde adapter for humantime duration strings.
pub(crate) mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.docker_host, None);
        assert_eq!(config.converge, ConvergeConfig::default());
        assert_eq!(config.drain_timeout, DEFAULT_DRAIN_TIMEOUT);
    }

    #[test]
    fn test_reads_humantime_values() {
        let config = Config::from_lookup(lookup(&[
            ("DOCKER_HOST", "tcp://swarm-manager:2375"),
            ("STEVEDORE_CONVERGE_DELAY", "2s"),
            ("STEVEDORE_CONVERGE_TIMEOUT", "1m30s"),
            ("STEVEDORE_DRAIN_TIMEOUT", "10s"),
        ]))
        .unwrap();
        assert_eq!(config.docker_host.as_deref(), Some("tcp://swarm-manager:2375"));
        assert_eq!(config.converge.delay, Duration::from_secs(2));
        assert_eq!(config.converge.timeout, Duration::from_secs(90));
        assert_eq!(config.drain_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_duration_names_variable() {
        let err = Config::from_lookup(lookup(&[("STEVEDORE_CONVERGE_TIMEOUT", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("STEVEDORE_CONVERGE_TIMEOUT"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err =
            Config::from_lookup(lookup(&[("STEVEDORE_CONVERGE_TIMEOUT", "0s")])).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroTimeout(_)));
    }

    #[test]
    fn test_converge_config_deserialize_defaults() {
        let config: ConvergeConfig = serde_json::from_str(r#"{"timeout": "45s"}"#).unwrap();
        assert_eq!(config.delay, DEFAULT_CONVERGE_DELAY);
        assert_eq!(config.timeout, Duration::from_secs(45));
        assert_eq!(config.poll_interval(), MIN_POLL_INTERVAL);
    }
}
