// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Docker Engine API payloads.
//!
//! Responses are decoded from their JSON form into the handful of fields the
//! engine reads, and service specs are encoded as Engine API JSON. Field names
//! follow the Engine API (`PascalCase`, `ID` suffixes).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use super::traits::{
    ClientError, Node, NodeState, Result, ServiceInspection, ServiceMode, Task, UpdateState,
};
use crate::definition::{ModeSpec, ServiceDefinition, UpdatePolicy};
use crate::task_state::TaskState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireService {
    #[serde(rename = "ID")]
    id: Option<String>,
    version: Option<WireVersion>,
    spec: Option<WireServiceSpec>,
    update_status: Option<WireUpdateStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireVersion {
    index: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireServiceSpec {
    name: Option<String>,
    mode: Option<WireServiceMode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireServiceMode {
    replicated: Option<WireReplicated>,
    global: Option<Value>,
    replicated_job: Option<Value>,
    global_job: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireReplicated {
    replicas: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireUpdateStatus {
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireTask {
    #[serde(rename = "ID")]
    id: Option<String>,
    #[serde(rename = "ServiceID")]
    service_id: Option<String>,
    slot: Option<u64>,
    #[serde(rename = "NodeID")]
    node_id: Option<String>,
    desired_state: Option<String>,
    status: Option<WireTaskStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireTaskStatus {
    timestamp: Option<String>,
    state: Option<String>,
    err: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireNode {
    #[serde(rename = "ID")]
    id: Option<String>,
    status: Option<WireNodeStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireNodeStatus {
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireCreated {
    #[serde(rename = "ID")]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUpdated {
    #[serde(rename = "Warnings", default)]
    warnings: Option<Vec<String>>,
}

/// Decode a `ServiceInspect` response.
pub(crate) fn service_from_json(value: Value) -> Result<ServiceInspection> {
    let service: WireService = serde_json::from_value(value)?;
    let id = service
        .id
        .ok_or_else(|| ClientError::InvalidResponse("service without ID".into()))?;
    let spec = service.spec;
    let name = spec
        .as_ref()
        .and_then(|s| s.name.clone())
        .unwrap_or_default();
    let mode = match spec.and_then(|s| s.mode) {
        Some(WireServiceMode {
            replicated: Some(replicated),
            ..
        }) => ServiceMode::Replicated {
            replicas: replicated.replicas,
        },
        Some(WireServiceMode {
            global: Some(_), ..
        }) => ServiceMode::Global,
        Some(WireServiceMode {
            replicated_job: Some(_),
            ..
        }) => ServiceMode::ReplicatedJob,
        Some(WireServiceMode {
            global_job: Some(_),
            ..
        }) => ServiceMode::GlobalJob,
        _ => ServiceMode::Replicated { replicas: None },
    };
    let update_state = service
        .update_status
        .and_then(|status| status.state)
        .filter(|state| !state.is_empty())
        .map(|state| UpdateState::parse(&state));

    Ok(ServiceInspection {
        id,
        name,
        version: service.version.and_then(|v| v.index).unwrap_or(0),
        mode,
        update_state,
    })
}

/// Decode a `TaskList` response item.
pub(crate) fn task_from_json(value: Value) -> Result<Task> {
    let task: WireTask = serde_json::from_value(value)?;
    let id = task
        .id
        .ok_or_else(|| ClientError::InvalidResponse("task without ID".into()))?;
    let status = task.status;
    let observed_at = status
        .as_ref()
        .and_then(|s| s.timestamp.as_deref())
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    let (state, error) = match status {
        Some(status) => (
            status.state.as_deref().map(TaskState::parse).unwrap_or_default(),
            status.err.filter(|e| !e.is_empty()),
        ),
        None => (TaskState::Unknown, None),
    };

    Ok(Task {
        id,
        service_id: task.service_id.unwrap_or_default(),
        slot: task.slot.unwrap_or(0),
        desired_state: task
            .desired_state
            .as_deref()
            .map(TaskState::parse)
            .unwrap_or_default(),
        state,
        node_id: task.node_id.filter(|n| !n.is_empty()),
        error,
        observed_at,
    })
}

/// Decode a `NodeList` response item.
pub(crate) fn node_from_json(value: Value) -> Result<Node> {
    let node: WireNode = serde_json::from_value(value)?;
    let id = node
        .id
        .ok_or_else(|| ClientError::InvalidResponse("node without ID".into()))?;
    let state = node
        .status
        .and_then(|s| s.state)
        .map(|s| NodeState::parse(&s))
        .unwrap_or_default();
    Ok(Node { id, state })
}

/// Decode a `ServiceCreate` response.
pub(crate) fn created_id_from_json(value: Value) -> Result<String> {
    let created: WireCreated = serde_json::from_value(value)?;
    created
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ClientError::InvalidResponse("service create returned no ID".into()))
}

/// Decode a `ServiceUpdate` response.
pub(crate) fn warnings_from_json(value: Value) -> Result<Vec<String>> {
    let updated: WireUpdated = serde_json::from_value(value)?;
    Ok(updated.warnings.unwrap_or_default())
}

fn nanos(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

fn policy_json(policy: &UpdatePolicy) -> Value {
    json!({
        "Parallelism": policy.parallelism,
        "Delay": nanos(policy.delay),
        "FailureAction": policy.failure_action.as_str(),
        "Monitor": nanos(policy.monitor),
        "MaxFailureRatio": policy.max_failure_ratio,
        "Order": policy.order.as_str(),
    })
}

/// Encode a definition as an Engine API `ServiceSpec`.
pub(crate) fn service_spec_json(definition: &ServiceDefinition) -> Value {
    let mut container = json!({ "Image": definition.image });
    if !definition.command.is_empty() {
        container["Command"] = json!(definition.command);
    }
    if !definition.args.is_empty() {
        container["Args"] = json!(definition.args);
    }
    if !definition.env.is_empty() {
        container["Env"] = json!(definition.env_list());
    }

    let mode = match definition.mode {
        ModeSpec::Replicated { replicas } => json!({ "Replicated": { "Replicas": replicas } }),
        ModeSpec::Global => json!({ "Global": {} }),
    };

    let labels: BTreeMap<&str, &str> = definition
        .labels
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    let mut spec = json!({
        "Name": definition.name,
        "Labels": labels,
        "TaskTemplate": { "ContainerSpec": container },
        "Mode": mode,
    });
    if let Some(update) = &definition.update_config {
        spec["UpdateConfig"] = policy_json(update);
    }
    if let Some(rollback) = &definition.rollback_config {
        spec["RollbackConfig"] = policy_json(rollback);
    }
    spec
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::FailureAction;
    use std::time::Duration;

    #[test]
    fn test_decode_replicated_service_with_update_status() {
        let service = service_from_json(json!({
            "ID": "9mnpnzenvg8p8tdbtq4wvbkcz",
            "Version": {"Index": 19},
            "Spec": {
                "Name": "web",
                "Mode": {"Replicated": {"Replicas": 3}}
            },
            "UpdateStatus": {"State": "rollback_started", "Message": "update rolled back"}
        }))
        .unwrap();

        assert_eq!(service.id, "9mnpnzenvg8p8tdbtq4wvbkcz");
        assert_eq!(service.name, "web");
        assert_eq!(service.version, 19);
        assert_eq!(service.mode, ServiceMode::Replicated { replicas: Some(3) });
        assert_eq!(service.update_state, Some(UpdateState::RollbackStarted));
    }

    #[test]
    fn test_decode_global_service() {
        let service = service_from_json(json!({
            "ID": "abc",
            "Spec": {"Name": "agent", "Mode": {"Global": {}}}
        }))
        .unwrap();
        assert_eq!(service.mode, ServiceMode::Global);
        assert_eq!(service.update_state, None);
        assert_eq!(service.version, 0);
    }

    #[test]
    fn test_decode_replicated_without_count() {
        let service = service_from_json(json!({
            "ID": "abc",
            "Spec": {"Name": "web", "Mode": {"Replicated": {}}}
        }))
        .unwrap();
        assert_eq!(service.mode, ServiceMode::Replicated { replicas: None });
    }

    #[test]
    fn test_decode_task() {
        let task = task_from_json(json!({
            "ID": "0kzzo1i0y4jz6027t0k7aezc7",
            "ServiceID": "9mnpnzenvg8p8tdbtq4wvbkcz",
            "Slot": 2,
            "NodeID": "60gvrl6tm78dmak4yl7srz94v",
            "DesiredState": "running",
            "Status": {
                "Timestamp": "2025-06-20T10:15:30.123456789Z",
                "State": "starting",
                "Err": ""
            }
        }))
        .unwrap();

        assert_eq!(task.slot, 2);
        assert_eq!(task.desired_state, TaskState::Running);
        assert_eq!(task.state, TaskState::Starting);
        assert_eq!(task.node_id.as_deref(), Some("60gvrl6tm78dmak4yl7srz94v"));
        assert_eq!(task.error, None);
        assert_eq!(task.observed_at.timestamp(), 1_750_414_530);
    }

    #[test]
    fn test_decode_unscheduled_task_with_unknown_state() {
        let task = task_from_json(json!({
            "ID": "t1",
            "ServiceID": "s1",
            "Slot": 1,
            "NodeID": "",
            "DesiredState": "running",
            "Status": {"State": "orphaned", "Err": "no suitable node"}
        }))
        .unwrap();
        assert_eq!(task.node_id, None);
        assert_eq!(task.state, TaskState::Unknown);
        assert_eq!(task.error.as_deref(), Some("no suitable node"));
    }

    #[test]
    fn test_decode_node() {
        let node = node_from_json(json!({
            "ID": "n1",
            "Status": {"State": "down", "Addr": "10.0.0.4"}
        }))
        .unwrap();
        assert_eq!(node.state, NodeState::Down);
    }

    #[test]
    fn test_missing_ids_are_invalid() {
        assert!(matches!(
            task_from_json(json!({"Slot": 1})),
            Err(ClientError::InvalidResponse(_))
        ));
        assert!(matches!(
            created_id_from_json(json!({"ID": ""})),
            Err(ClientError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_encode_service_spec() {
        let mut definition = ServiceDefinition::new("web", "nginx:1.27", 3);
        definition.env.insert("PORT".into(), "8080".into());
        definition.labels.insert("team".into(), "edge".into());
        definition.update_config = Some(UpdatePolicy {
            parallelism: 2,
            delay: Duration::from_secs(10),
            failure_action: FailureAction::Rollback,
            ..UpdatePolicy::default()
        });

        let spec = service_spec_json(&definition);

        assert_eq!(spec["Name"], "web");
        assert_eq!(spec["TaskTemplate"]["ContainerSpec"]["Image"], "nginx:1.27");
        assert_eq!(spec["TaskTemplate"]["ContainerSpec"]["Env"][0], "PORT=8080");
        assert_eq!(spec["Mode"]["Replicated"]["Replicas"], 3);
        assert_eq!(spec["Labels"]["team"], "edge");
        assert_eq!(spec["UpdateConfig"]["Delay"], 10_000_000_000u64);
        assert_eq!(spec["UpdateConfig"]["FailureAction"], "rollback");
        assert_eq!(spec["UpdateConfig"]["Order"], "stop-first");
        assert!(spec.get("RollbackConfig").is_none());
        assert!(spec["TaskTemplate"]["ContainerSpec"].get("Command").is_none());
    }

    #[test]
    fn test_encode_global_mode() {
        let mut definition = ServiceDefinition::new("agent", "agent:1", 1);
        definition.mode = ModeSpec::Global;
        let spec = service_spec_json(&definition);
        assert!(spec["Mode"]["Global"].is_object());
        assert!(spec["Mode"].get("Replicated").is_none());
    }
}
