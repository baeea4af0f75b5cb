//! Image engine trait and image references.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ServerDomain;

/// Repository suffix every deployment image is pushed under.
const IMAGE_NAME: &str = "airflow";

/// Errors that can occur while driving the container engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine binary could not be started.
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine ran but reported failure.
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Fully qualified image reference, `[registry/]repository:tag`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    /// Registry host, `None` for a local-only name.
    pub registry: Option<String>,
    /// Repository path, e.g. `stellar-orbit-1234/airflow`.
    pub repository: String,
    /// Image tag.
    pub tag: String,
}

impl ImageRef {
    /// Registry reference for a deployment release:
    /// `registry.<domain>/<release_name>/airflow:<tag>`.
    #[must_use]
    pub fn for_release(server: &ServerDomain, release_name: &str, tag: &str) -> Self {
        Self {
            registry: Some(server.registry_host()),
            ..Self::local(release_name, tag)
        }
    }

    /// Local name the image is built under before it is tagged for the registry.
    #[must_use]
    pub fn local(release_name: &str, tag: &str) -> Self {
        Self {
            registry: None,
            repository: format!("{release_name}/{IMAGE_NAME}"),
            tag: tag.to_string(),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{registry}/")?;
        }
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// Request to build an image from a local context directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Build context (directory holding the Dockerfile).
    pub context: PathBuf,
    /// Name to give the built image.
    pub image: ImageRef,
    /// `--build-arg` pairs.
    pub build_args: Vec<(String, String)>,
}

/// Trait for container engines able to build, tag and push images.
#[async_trait]
pub trait ImageEngine: Send + Sync {
    /// Build an image.
    async fn build(&self, req: &BuildRequest) -> Result<(), EngineError>;

    /// Add `target` as another name for `source`.
    async fn tag(&self, source: &ImageRef, target: &ImageRef) -> Result<(), EngineError>;

    /// Push an image to its registry.
    async fn push(&self, image: &ImageRef) -> Result<(), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_ref_for_release() {
        let server = ServerDomain::parse(Some("example.com".into())).unwrap();
        let image = ImageRef::for_release(&server, "rel1", "deploy-1");
        assert_eq!(image.to_string(), "registry.example.com/rel1/airflow:deploy-1");
    }

    #[test]
    fn test_local_image_ref() {
        assert_eq!(ImageRef::local("rel1", "deploy-1").to_string(), "rel1/airflow:deploy-1");
    }
}
