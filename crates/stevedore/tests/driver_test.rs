// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the service reconciler against the mock Swarm client.

mod common;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use stevedore::client::{ClientError, MockSwarmClient, UpdateState};
use stevedore::config::Config;
use stevedore::definition::ServiceDefinition;
use stevedore::driver::ServiceReconciler;
use stevedore::error::{ConvergeError, Error};
use tempfile::NamedTempFile;

use common::{SERVICE_ID, converge, replicated, updating};

fn reconciler(mock: &MockSwarmClient) -> ServiceReconciler {
    ServiceReconciler::new(Arc::new(mock.clone()))
}

fn definition_file(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_create_from_file_and_converge() {
    let file = definition_file(
        r#"{
            "name": "web",
            "image": "nginx:1.27",
            "mode": {"replicated": {"replicas": 2}},
            "converge_config": {"delay": "2s", "timeout": "1m"}
        }"#,
    );
    let definition = ServiceDefinition::from_file(file.path()).unwrap();
    let mock = MockSwarmClient::with_frames(vec![replicated(2, 1), replicated(2, 2)]);

    let service_id = reconciler(&mock).create(&definition).await.unwrap();

    assert_eq!(service_id, SERVICE_ID);
    assert_eq!(mock.created().await[0].name, "web");
    assert_eq!(mock.inspect_calls().await, 2);
    assert!(mock.removed().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_create_with_huge_timeout_from_file() {
    let file = definition_file(
        r#"{
            "name": "web",
            "image": "nginx:1.27",
            "mode": {"replicated": {"replicas": 2}},
            "converge_config": {"delay": "1s", "timeout": "500000000000years"}
        }"#,
    );
    let definition = ServiceDefinition::from_file(file.path()).unwrap();
    let mock = MockSwarmClient::with_frames(vec![replicated(2, 2)]);

    let service_id = reconciler(&mock).create(&definition).await.unwrap();

    assert_eq!(service_id, SERVICE_ID);
    assert_eq!(mock.inspect_calls().await, 1);
}

#[tokio::test]
async fn test_create_without_converge_config_does_not_poll() {
    let mock = MockSwarmClient::new();

    reconciler(&mock)
        .create(&ServiceDefinition::new("web", "nginx:1.27", 3))
        .await
        .unwrap();

    assert_eq!(mock.inspect_calls().await, 0);
    assert_eq!(mock.list_task_calls().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_create_timeout_surfaces_service_and_timeout() {
    let mock = MockSwarmClient::with_frames(vec![replicated(3, 1)]);
    let definition =
        ServiceDefinition::new("web", "nginx:1.27", 3).with_converge_config(converge(1, 30));

    let err = reconciler(&mock).create(&definition).await.unwrap_err();

    match err {
        Error::Converge {
            service_id,
            timeout,
            source,
        } => {
            assert_eq!(service_id, SERVICE_ID);
            assert_eq!(timeout, Duration::from_secs(30));
            assert!(source.is_timeout());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(mock.removed().await, vec![SERVICE_ID.to_string()]);
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_update_converges_after_completed_status() {
    let mock = MockSwarmClient::with_frames(vec![
        replicated(2, 2).version(5),
        updating(2, 2, UpdateState::Updating).version(6),
        updating(2, 2, UpdateState::Completed).version(6),
    ]);
    let definition =
        ServiceDefinition::new("web", "nginx:1.28", 2).with_converge_config(converge(0, 60));

    let warnings = reconciler(&mock)
        .update(SERVICE_ID, &definition)
        .await
        .unwrap();

    assert!(warnings.is_empty());
    let updated = mock.updated().await;
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].1, 5);
    assert_eq!(mock.inspect_calls().await, 3);
}

#[tokio::test(start_paused = true)]
async fn test_update_rollback_is_reported_as_failure() {
    let mock = MockSwarmClient::with_frames(vec![
        replicated(2, 2),
        updating(2, 1, UpdateState::RollbackStarted),
        updating(2, 2, UpdateState::RollbackCompleted),
    ]);
    let definition =
        ServiceDefinition::new("web", "nginx:broken", 2).with_converge_config(converge(0, 60));

    let err = reconciler(&mock)
        .update(SERVICE_ID, &definition)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Converge {
            source: ConvergeError::RollbackCompleted { .. },
            ..
        }
    ));
    assert!(mock.removed().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_converge_existing_service() {
    let mock = MockSwarmClient::with_frames(vec![replicated(2, 0), replicated(2, 2)]);

    reconciler(&mock)
        .converge(SERVICE_ID, &converge(0, 60), false)
        .await
        .unwrap();

    assert_eq!(mock.inspect_calls().await, 2);
}

// ============================================================================
// Inspect / remove
// ============================================================================

#[tokio::test]
async fn test_inspect_returns_service() {
    let mock = MockSwarmClient::with_frames(vec![replicated(4, 0).version(12)]);

    let inspection = reconciler(&mock).inspect(SERVICE_ID).await.unwrap();

    assert_eq!(inspection.version, 12);
    assert_eq!(inspection.id, SERVICE_ID);
}

#[tokio::test(start_paused = true)]
async fn test_remove_then_inspect_is_not_found() {
    let mock = MockSwarmClient::with_frames(vec![replicated(2, 2)]);
    let config = Config::from_lookup(|key| match key {
        "STEVEDORE_DRAIN_TIMEOUT" => Some("5s".to_string()),
        _ => None,
    })
    .unwrap();
    let reconciler = ServiceReconciler::from_config(Arc::new(mock.clone()), &config);

    reconciler.remove(SERVICE_ID).await.unwrap();

    let err = reconciler.inspect(SERVICE_ID).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Client(ClientError::ServiceNotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_remove_with_huge_drain_timeout() {
    let mock = MockSwarmClient::with_frames(vec![replicated(2, 2)]);
    let reconciler =
        ServiceReconciler::new(Arc::new(mock.clone())).with_drain_timeout(Duration::MAX);

    reconciler.remove(SERVICE_ID).await.unwrap();

    assert_eq!(mock.removed().await, vec![SERVICE_ID.to_string()]);
}
