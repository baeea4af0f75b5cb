//! Houston GraphQL request and response models.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::traits::{Deployment, ExecutorKind};

// ============================================================================
// GraphQL envelope
// ============================================================================

/// GraphQL request body.
#[derive(Debug, Serialize)]
pub struct GraphqlRequest<'a, V: Serialize> {
    pub query: &'a str,
    pub variables: V,
}

/// GraphQL response wrapper.
#[derive(Debug, Deserialize)]
pub struct GraphqlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Option<Vec<GraphqlError>>,
}

/// One entry of a GraphQL `errors` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    /// Error message.
    pub message: String,
    /// Path of the field that failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    /// Server-specific details (error code and so on).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

// ============================================================================
// createDeployment
// ============================================================================

pub const CREATE_DEPLOYMENT_MUTATION: &str = r"
mutation CreateDeployment(
  $workspaceUuid: Uuid!
  $type: String!
  $label: String!
  $releaseName: String
  $namespace: String
  $description: String
  $airflowVersion: String
  $runtimeVersion: String
  $executor: ExecutorType
  $workers: Workers
  $webserver: Webserver
  $scheduler: Scheduler
  $triggerer: Triggerer
  $dagDeployment: DagDeployment
  $properties: JSON
) {
  createDeployment(
    workspaceUuid: $workspaceUuid
    type: $type
    label: $label
    releaseName: $releaseName
    namespace: $namespace
    description: $description
    airflowVersion: $airflowVersion
    runtimeVersion: $runtimeVersion
    executor: $executor
    workers: $workers
    webserver: $webserver
    scheduler: $scheduler
    triggerer: $triggerer
    dagDeployment: $dagDeployment
    properties: $properties
  ) {
    id
    label
    releaseName
    airflowVersion
    executor
  }
}
";

/// Variables for [`CREATE_DEPLOYMENT_MUTATION`].
///
/// Release name, namespace and runtime version are sent empty so the
/// platform generates them.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeploymentVariables<'a> {
    pub workspace_uuid: String,
    #[serde(rename = "type")]
    pub deployment_type: &'static str,
    pub label: &'a str,
    pub release_name: &'static str,
    pub namespace: &'static str,
    pub description: &'a str,
    pub airflow_version: &'a str,
    pub runtime_version: &'static str,
    pub executor: ExecutorKind,
    pub dag_deployment: DagDeployment,
    pub properties: Map<String, Value>,
}

/// How DAGs reach the deployment.
#[derive(Debug, Serialize)]
pub struct DagDeployment {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl DagDeployment {
    /// DAGs are baked into the pushed image.
    pub fn image() -> Self {
        Self { kind: "image" }
    }
}

/// `data` payload of the mutation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeploymentData {
    pub create_deployment: Option<Deployment>,
}
