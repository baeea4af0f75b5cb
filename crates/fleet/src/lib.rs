//! Batch provisioning and image publishing for Houston-managed Airflow.
//!
//! Two sequential procedures share one JSON ledger (`deploy.json`):
//!
//! 1. [`provision::run`] creates a batch of labelled deployments through the
//!    Houston GraphQL API and records each one in the ledger.
//! 2. [`publish::run`] builds and pushes an Airflow image for every ledger
//!    record that has not been published under the current tag yet.
//!
//! Both procedures consult the ledger before doing any remote work, so
//! re-running either one after a partial success only does what is left.
//!
//! # Example
//!
//! ```rust,ignore
//! use fleet::config::ProvisionerConfig;
//! use fleet::houston::HoustonClient;
//! use fleet::ledger::Ledger;
//! use fleet::provision::{self, ProvisionPlan};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ProvisionerConfig::new(
//!         Some("example.com".into()),
//!         Some("token".into()),
//!         Some("0f9b8c3e-3c1d-4a5e-9d3a-6a1f2e7c4b10".into()),
//!     )?;
//!     let client = HoustonClient::new(&config)?;
//!     let ledger = Ledger::new("deploy.json");
//!
//!     let cancel = CancellationToken::new();
//!     let report = provision::run(&client, &ledger, &ProvisionPlan::default(), &cancel).await?;
//!     println!("created {} deployments", report.created.len());
//!     Ok(())
//! }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod houston;
pub mod image;
pub mod ledger;
pub mod provision;
pub mod publish;

pub use config::{ConfigError, ProvisionerConfig, PublisherConfig, ServerDomain};
pub use houston::{ControlPlane, CreateDeploymentRequest, Deployment, ExecutorKind, HoustonClient, HoustonError};
pub use image::{BuildRequest, DockerCli, EngineError, ImageEngine, ImageRef};
pub use ledger::{contains_label, find_unpublished, Ledger, LedgerError, Record};
