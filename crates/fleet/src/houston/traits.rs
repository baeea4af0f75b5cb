//! Control-plane trait and common types.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::models::GraphqlError;

/// Errors that can occur while talking to the control plane.
#[derive(Error, Debug)]
pub enum HoustonError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned a non-success status without GraphQL errors.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The response carried an `errors` list.
    #[error("GraphQL errors: {}", join_messages(.0))]
    Graphql(Vec<GraphqlError>),

    /// The response had neither errors nor data.
    #[error("GraphQL response carried no data")]
    MissingData,

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

fn join_messages(errors: &[GraphqlError]) -> String {
    if errors.is_empty() {
        return "<empty error list>".to_string();
    }
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Airflow executor a deployment runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutorKind {
    LocalExecutor,
    CeleryExecutor,
    KubernetesExecutor,
}

impl ExecutorKind {
    /// Name used by the API.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocalExecutor => "LocalExecutor",
            Self::CeleryExecutor => "CeleryExecutor",
            Self::KubernetesExecutor => "KubernetesExecutor",
        }
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "localexecutor" => Ok(Self::LocalExecutor),
            "celery" | "celeryexecutor" => Ok(Self::CeleryExecutor),
            "kubernetes" | "k8s" | "kubernetesexecutor" => Ok(Self::KubernetesExecutor),
            other => Err(format!(
                "unknown executor '{other}' (expected LocalExecutor, CeleryExecutor or KubernetesExecutor)"
            )),
        }
    }
}

/// Request to create a new deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDeploymentRequest {
    /// Human-readable label, unique within the ledger.
    pub label: String,
    /// Executor to run with.
    pub executor: ExecutorKind,
    /// Airflow version, e.g. `2.4.3`.
    pub airflow_version: String,
    /// Free-form description shown in the UI.
    pub description: String,
}

/// A deployment as echoed back by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// Identifier assigned by the control plane.
    pub id: String,
    /// Deployment label.
    pub label: String,
    /// Generated release name.
    pub release_name: String,
    /// Airflow version, when reported.
    #[serde(default)]
    pub airflow_version: Option<String>,
    /// Executor, when reported.
    #[serde(default)]
    pub executor: Option<String>,
}

/// Trait for control planes that can create deployments.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Create a deployment and return what the control plane recorded.
    async fn create_deployment(
        &self,
        req: CreateDeploymentRequest,
    ) -> Result<Deployment, HoustonError>;
}
