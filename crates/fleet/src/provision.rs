//! Deployment provisioning.
//!
//! Creates a numbered batch of deployments (`Deployment-000`,
//! `Deployment-001`, ...) and records each one in the ledger. Labels already
//! in the ledger are skipped, so a re-run only creates what is missing.

use std::time::Duration;

use chrono::Utc;
use rand::seq::SliceRandom;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::houston::{ControlPlane, CreateDeploymentRequest, ExecutorKind, HoustonError};
use crate::ledger::{contains_label, Ledger, LedgerError, Record};

/// Errors that stop a provisioning run.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// The ledger could not be read or written.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Creating a deployment failed.
    #[error("Failed to create deployment '{label}': {source}")]
    Remote {
        label: String,
        #[source]
        source: HoustonError,
    },

    /// The plan lists no executor to choose from.
    #[error("No executors configured")]
    NoExecutors,
}

/// What to do when a single deployment cannot be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop the whole run.
    #[default]
    Abort,
    /// Record the failure and move on to the next label.
    Continue,
}

/// The batch to provision.
#[derive(Debug, Clone)]
pub struct ProvisionPlan {
    /// Number of labels, numbered from zero.
    pub count: u32,
    /// Label prefix.
    pub label_prefix: String,
    /// Executors to pick from at random for each new deployment.
    pub executors: Vec<ExecutorKind>,
    /// Airflow version for every deployment.
    pub airflow_version: String,
    /// Description for every deployment.
    pub description: String,
    /// Pause after each creation before the next request.
    pub settle: Duration,
    /// Per-label failure handling.
    pub on_failure: FailurePolicy,
}

impl Default for ProvisionPlan {
    fn default() -> Self {
        Self {
            count: 32,
            label_prefix: "Deployment".to_string(),
            executors: vec![ExecutorKind::KubernetesExecutor, ExecutorKind::CeleryExecutor],
            airflow_version: "2.4.3".to_string(),
            description: "CreateApi_k8s_image_01".to_string(),
            settle: Duration::from_secs(60),
            on_failure: FailurePolicy::Abort,
        }
    }
}

impl ProvisionPlan {
    /// Label for the deployment at `index`, zero-padded to three digits.
    #[must_use]
    pub fn label(&self, index: u32) -> String {
        format!("{}-{index:0>3}", self.label_prefix)
    }

    /// Every label in the batch, in order.
    pub fn labels(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.count).map(|i| self.label(i))
    }
}

/// Outcome of a provisioning run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Labels created during this run.
    pub created: Vec<String>,
    /// Labels already present in the ledger.
    pub skipped: Vec<String>,
    /// Labels that failed under [`FailurePolicy::Continue`], with the reason.
    pub failed: Vec<(String, String)>,
    /// Whether the run stopped early because it was cancelled.
    pub cancelled: bool,
}

/// Provision every label in `plan` that the ledger does not know yet.
///
/// Each new record is saved before the settle delay starts, so an
/// interrupted wait never loses a deployment that was already created.
///
/// `cancel` is checked before every label and raced against the settle
/// delay. A create call in flight when it fires is allowed to finish and
/// its record is saved before the run stops.
///
/// # Errors
/// Returns an error if the ledger cannot be read or written, or (under
/// [`FailurePolicy::Abort`]) when a deployment cannot be created.
pub async fn run<C>(
    control_plane: &C,
    ledger: &Ledger,
    plan: &ProvisionPlan,
    cancel: &CancellationToken,
) -> Result<ProvisionReport, ProvisionError>
where
    C: ControlPlane + ?Sized,
{
    if plan.executors.is_empty() {
        return Err(ProvisionError::NoExecutors);
    }

    let mut report = ProvisionReport::default();
    let labels: Vec<String> = plan.labels().collect();

    for (index, label) in labels.iter().enumerate() {
        if cancel.is_cancelled() {
            warn!(label = %label, "Cancelled, stopping before next deployment");
            report.cancelled = true;
            break;
        }

        let mut records = ledger.load()?;
        if contains_label(&records, label) {
            info!(label = %label, "Deployment already exists, skipping");
            report.skipped.push(label.clone());
            continue;
        }

        let executor = plan
            .executors
            .choose(&mut rand::thread_rng())
            .copied()
            .ok_or(ProvisionError::NoExecutors)?;

        info!(label = %label, "Deployment does not exist, creating");
        let req = CreateDeploymentRequest {
            label: label.clone(),
            executor,
            airflow_version: plan.airflow_version.clone(),
            description: plan.description.clone(),
        };

        let deployment = match control_plane.create_deployment(req).await {
            Ok(deployment) => deployment,
            Err(source) => match plan.on_failure {
                FailurePolicy::Abort => {
                    return Err(ProvisionError::Remote {
                        label: label.clone(),
                        source,
                    })
                }
                FailurePolicy::Continue => {
                    error!(label = %label, error = %source, "Failed to create deployment, continuing");
                    report.failed.push((label.clone(), source.to_string()));
                    continue;
                }
            },
        };

        records.push(Record {
            label: label.clone(),
            id: deployment.id,
            release_name: deployment.release_name,
            executor: executor.to_string(),
            airflow_version: plan.airflow_version.clone(),
            tag: None,
            created_at: Some(Utc::now()),
            ..Record::default()
        });
        ledger.save(&records)?;
        info!(label = %label, "Deployment recorded");
        report.created.push(label.clone());

        let more_to_do = index + 1 < labels.len();
        if more_to_do && !settle(plan.settle, cancel).await {
            report.cancelled = true;
            break;
        }
    }

    Ok(report)
}

/// Wait for `delay`, returning `false` if `cancel` fires first.
async fn settle(delay: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        warn!("Cancelled, skipping settle delay");
        return false;
    }
    if delay.is_zero() {
        return true;
    }

    info!(secs = delay.as_secs(), "Waiting for deployment to settle");
    tokio::select! {
        () = tokio::time::sleep(delay) => true,
        () = cancel.cancelled() => {
            warn!("Cancelled while waiting, stopping");
            false
        }
    }
}
