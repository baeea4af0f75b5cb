//! Houston control-plane API.
//!
//! Implements the [`ControlPlane`] trait against the Houston GraphQL API.

mod client;
mod models;
mod traits;

pub use client::HoustonClient;
pub use models::GraphqlError;
pub use traits::{ControlPlane, CreateDeploymentRequest, Deployment, ExecutorKind, HoustonError};
