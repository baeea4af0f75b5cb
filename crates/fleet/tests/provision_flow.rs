//! End-to-end provisioning against a mocked Houston API.

use std::fs;
use std::time::Duration;

use fleet::config::ProvisionerConfig;
use fleet::houston::{ExecutorKind, HoustonClient};
use fleet::ledger::{Ledger, Record};
use fleet::provision::{self, ProvisionError, ProvisionPlan};
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WORKSPACE: &str = "0f9b8c3e-3c1d-4a5e-9d3a-6a1f2e7c4b10";

fn client_for(server: &MockServer) -> HoustonClient {
    let config = ProvisionerConfig::new(
        Some("example.com".into()),
        Some("test-token".into()),
        Some(WORKSPACE.into()),
    )
    .unwrap();
    HoustonClient::with_endpoint(&config, format!("{}/v1", server.uri())).unwrap()
}

fn single_label_plan() -> ProvisionPlan {
    ProvisionPlan {
        count: 1,
        executors: vec![ExecutorKind::CeleryExecutor],
        settle: Duration::ZERO,
        ..ProvisionPlan::default()
    }
}

#[tokio::test]
async fn provisions_into_empty_ledger() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1"))
        .and(header("Authorization", "test-token"))
        .and(body_partial_json(json!({
            "variables": { "label": "Deployment-000", "executor": "CeleryExecutor" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "createDeployment": {
                    "id": "ckx123",
                    "label": "Deployment-000",
                    "releaseName": "stellar-orbit-1234",
                    "airflowVersion": "2.4.3",
                    "executor": "CeleryExecutor"
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let ledger = Ledger::new(dir.path().join("deploy.json"));
    let client = client_for(&server);

    let report = provision::run(
        &client,
        &ledger,
        &single_label_plan(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(report.created, vec!["Deployment-000"]);

    let records = ledger.load().unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.label, "Deployment-000");
    assert_eq!(record.id, "ckx123");
    assert_eq!(record.release_name, "stellar-orbit-1234");
    assert_eq!(record.executor, "CeleryExecutor");
    assert_eq!(record.airflow_version, "2.4.3");
    assert_eq!(record.tag, None);
}

#[tokio::test]
async fn existing_label_makes_no_remote_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let ledger = Ledger::new(dir.path().join("deploy.json"));
    ledger
        .save(&[Record {
            label: "Deployment-000".into(),
            id: "ckx123".into(),
            release_name: "stellar-orbit-1234".into(),
            executor: "KubernetesExecutor".into(),
            airflow_version: "2.4.3".into(),
            ..Record::default()
        }])
        .unwrap();
    let before = fs::read_to_string(ledger.path()).unwrap();

    let client = client_for(&server);
    let report = provision::run(
        &client,
        &ledger,
        &single_label_plan(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(report.created.is_empty());
    assert_eq!(report.skipped, vec!["Deployment-000"]);
    assert_eq!(fs::read_to_string(ledger.path()).unwrap(), before);
}

#[tokio::test]
async fn graphql_error_aborts_without_recording() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{ "message": "Deployment label already in use" }],
            "data": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let ledger = Ledger::new(dir.path().join("deploy.json"));
    let client = client_for(&server);

    let plan = ProvisionPlan {
        count: 3,
        ..single_label_plan()
    };
    let err = provision::run(&client, &ledger, &plan, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::Remote { ref label, .. } if label == "Deployment-000"));
    assert!(err.to_string().contains("Deployment label already in use"));
    assert!(ledger.load().unwrap().is_empty());
}
