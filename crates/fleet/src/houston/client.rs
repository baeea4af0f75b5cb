//! Houston GraphQL client implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::models::{
    CreateDeploymentData, CreateDeploymentVariables, DagDeployment, GraphqlRequest,
    GraphqlResponse, CREATE_DEPLOYMENT_MUTATION,
};
use super::traits::{ControlPlane, CreateDeploymentRequest, Deployment, HoustonError};
use crate::config::ProvisionerConfig;

/// Timeout for a single API request. Deployment creation is slow.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Houston GraphQL client.
#[derive(Debug, Clone)]
pub struct HoustonClient {
    /// HTTP client carrying the authorization header.
    client: Client,
    /// GraphQL endpoint.
    endpoint: String,
    /// Workspace new deployments are created in.
    workspace_id: Uuid,
}

impl HoustonClient {
    /// Create a client for `https://houston.<SERVER_URL>/v1`.
    ///
    /// # Errors
    /// Returns error if the token is not a valid header value or the HTTP
    /// client cannot be created.
    pub fn new(config: &ProvisionerConfig) -> Result<Self, HoustonError> {
        Self::with_endpoint(config, config.server.houston_endpoint())
    }

    /// Create a client for an explicit endpoint URL.
    ///
    /// # Errors
    /// Same as [`HoustonClient::new`].
    pub fn with_endpoint(
        config: &ProvisionerConfig,
        endpoint: impl Into<String>,
    ) -> Result<Self, HoustonError> {
        let mut auth = HeaderValue::from_str(&config.token)
            .map_err(|_| HoustonError::Config("TOKEN is not a valid header value".into()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        // Houston expects the raw token, no "Bearer" prefix.
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            workspace_id: config.workspace_id,
        })
    }

    /// GraphQL endpoint this client talks to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Execute a GraphQL query or mutation and return its `data`.
    ///
    /// A body with an `errors` key is a failure whatever the HTTP status or
    /// the shape of `data`.
    ///
    /// # Errors
    /// Returns [`HoustonError::Graphql`] with the remote error list,
    /// [`HoustonError::Api`] for other non-success responses and
    /// [`HoustonError::MissingData`] when `data` is null or absent.
    pub async fn execute<V, R>(&self, query: &str, variables: V) -> Result<R, HoustonError>
    where
        V: Serialize + Send,
        R: DeserializeOwned,
    {
        debug!(endpoint = %self.endpoint, "GraphQL request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&GraphqlRequest { query, variables })
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        match serde_json::from_str::<GraphqlResponse<Value>>(&text) {
            Ok(GraphqlResponse {
                errors: Some(errors),
                ..
            }) => {
                warn!(status = status.as_u16(), errors = errors.len(), "GraphQL errors returned");
                Err(HoustonError::Graphql(errors))
            }
            Ok(GraphqlResponse { data, .. }) if status.is_success() => {
                let data = data.ok_or(HoustonError::MissingData)?;
                serde_json::from_value(data).map_err(|e| {
                    warn!(error = %e, body = %text, "Unexpected shape of response data");
                    HoustonError::Serialization(e)
                })
            }
            Err(e) if status.is_success() => {
                warn!(error = %e, body = %text, "Failed to parse response");
                Err(HoustonError::Serialization(e))
            }
            _ => Err(HoustonError::Api {
                status: status.as_u16(),
                message: text,
            }),
        }
    }
}

#[async_trait]
impl ControlPlane for HoustonClient {
    async fn create_deployment(
        &self,
        req: CreateDeploymentRequest,
    ) -> Result<Deployment, HoustonError> {
        info!(
            label = %req.label,
            executor = %req.executor,
            airflow_version = %req.airflow_version,
            "Creating deployment"
        );

        let variables = CreateDeploymentVariables {
            workspace_uuid: self.workspace_id.to_string(),
            deployment_type: "airflow",
            label: &req.label,
            release_name: "",
            namespace: "",
            description: &req.description,
            airflow_version: &req.airflow_version,
            runtime_version: "",
            executor: req.executor,
            dag_deployment: DagDeployment::image(),
            properties: Map::new(),
        };

        let data: CreateDeploymentData = self.execute(CREATE_DEPLOYMENT_MUTATION, variables).await?;
        let deployment = data.create_deployment.ok_or(HoustonError::MissingData)?;

        info!(
            deployment_id = %deployment.id,
            release_name = %deployment.release_name,
            "Deployment created"
        );

        Ok(deployment)
    }
}
