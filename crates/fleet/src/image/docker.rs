//! Docker CLI engine.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::traits::{BuildRequest, EngineError, ImageEngine, ImageRef};

/// Default engine binary.
const DOCKER_BIN: &str = "docker";

/// Drives a local Docker daemon through the `docker` binary.
///
/// Registry credentials come from the engine's own login state.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
}

impl DockerCli {
    /// Use `docker` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_program(DOCKER_BIN)
    }

    /// Use a different docker-compatible binary (e.g. `podman`).
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments for `docker build`.
    fn build_args(req: &BuildRequest) -> Vec<String> {
        let mut args = vec!["build".to_string(), "-t".to_string(), req.image.to_string()];
        for (key, value) in &req.build_args {
            args.push("--build-arg".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(req.context.display().to_string());
        args
    }

    async fn run(&self, args: &[String]) -> Result<(), EngineError> {
        let command = format!("{} {}", self.program, args.join(" "));
        debug!(command = %command, "Running container engine");

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| EngineError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(())
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageEngine for DockerCli {
    async fn build(&self, req: &BuildRequest) -> Result<(), EngineError> {
        info!(image = %req.image, context = %req.context.display(), "Building image");
        self.run(&Self::build_args(req)).await
    }

    async fn tag(&self, source: &ImageRef, target: &ImageRef) -> Result<(), EngineError> {
        debug!(source = %source, target = %target, "Tagging image");
        self.run(&["tag".to_string(), source.to_string(), target.to_string()])
            .await
    }

    async fn push(&self, image: &ImageRef) -> Result<(), EngineError> {
        info!(image = %image, "Pushing image");
        self.run(&["push".to_string(), image.to_string()]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn build_request() -> BuildRequest {
        BuildRequest {
            context: PathBuf::from("./qa-scenario-dags"),
            image: ImageRef::local("rel1", "deploy-1"),
            build_args: vec![("platform".into(), "linux/amd64".into())],
        }
    }

    #[test]
    fn test_build_args() {
        assert_eq!(
            DockerCli::build_args(&build_request()),
            vec![
                "build",
                "-t",
                "rel1/airflow:deploy-1",
                "--build-arg",
                "platform=linux/amd64",
                "./qa-scenario-dags",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let engine = DockerCli::with_program("fleet-test-no-such-engine");
        let err = engine.push(&ImageRef::local("rel1", "deploy-1")).await.unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_reports_status() {
        let engine = DockerCli::with_program("false");
        let err = engine.push(&ImageRef::local("rel1", "deploy-1")).await.unwrap_err();
        match err {
            EngineError::CommandFailed { command, .. } => {
                assert_eq!(command, "false push rel1/airflow:deploy-1");
            }
            other => panic!("expected command failure, got {other:?}"),
        }
    }
}
