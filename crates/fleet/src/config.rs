//! Process configuration.
//!
//! Settings are resolved once at start-up (command line, environment and
//! `.env` file) and handed to each collaborator explicitly.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Errors raised while assembling configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting was not provided or was blank.
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    /// A setting was provided but could not be used.
    #[error("Invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

fn required(name: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ConfigError::Missing(name)),
    }
}

/// Base domain of a platform installation, e.g. `example.com`.
///
/// Every service hostname is derived from it: the control plane lives at
/// `houston.<domain>` and the image registry at `registry.<domain>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDomain(String);

impl ServerDomain {
    /// Parse the value of `SERVER_URL`.
    ///
    /// A scheme prefix or trailing slash is tolerated and stripped.
    ///
    /// # Errors
    /// Returns [`ConfigError::Missing`] when the value is absent or blank and
    /// [`ConfigError::Invalid`] when it still contains a path.
    pub fn parse(value: Option<String>) -> Result<Self, ConfigError> {
        let raw = required("SERVER_URL", value)?;
        let domain = raw
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');

        if domain.is_empty() {
            return Err(ConfigError::Missing("SERVER_URL"));
        }
        if domain.contains('/') {
            return Err(ConfigError::Invalid {
                name: "SERVER_URL",
                reason: format!("expected a bare domain, got '{raw}'"),
            });
        }

        Ok(Self(domain.to_string()))
    }

    /// The bare domain.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// GraphQL endpoint of the control plane.
    #[must_use]
    pub fn houston_endpoint(&self) -> String {
        format!("https://houston.{}/v1", self.0)
    }

    /// Host of the image registry.
    #[must_use]
    pub fn registry_host(&self) -> String {
        format!("registry.{}", self.0)
    }
}

impl fmt::Display for ServerDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Settings needed to create deployments.
#[derive(Clone)]
pub struct ProvisionerConfig {
    /// Platform domain.
    pub server: ServerDomain,
    /// API token sent verbatim in the `Authorization` header.
    pub token: String,
    /// Workspace the deployments are created in.
    pub workspace_id: Uuid,
}

impl ProvisionerConfig {
    /// Build the provisioner configuration from `SERVER_URL`, `TOKEN` and
    /// `WORKSPACE_ID`.
    ///
    /// # Errors
    /// Returns an error if any value is missing or `WORKSPACE_ID` is not a UUID.
    pub fn new(
        server_url: Option<String>,
        token: Option<String>,
        workspace_id: Option<String>,
    ) -> Result<Self, ConfigError> {
        let server = ServerDomain::parse(server_url)?;
        let token = required("TOKEN", token)?;
        let workspace_raw = required("WORKSPACE_ID", workspace_id)?;
        let workspace_id = Uuid::parse_str(&workspace_raw).map_err(|e| ConfigError::Invalid {
            name: "WORKSPACE_ID",
            reason: e.to_string(),
        })?;

        Ok(Self {
            server,
            token,
            workspace_id,
        })
    }
}

impl fmt::Debug for ProvisionerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionerConfig")
            .field("server", &self.server)
            .field("token", &"<redacted>")
            .field("workspace_id", &self.workspace_id)
            .finish()
    }
}

/// Settings needed to publish images.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Platform domain.
    pub server: ServerDomain,
}

impl PublisherConfig {
    /// Build the publisher configuration from `SERVER_URL`.
    ///
    /// # Errors
    /// Returns an error if `SERVER_URL` is missing or malformed.
    pub fn new(server_url: Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerDomain::parse(server_url)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKSPACE: &str = "0f9b8c3e-3c1d-4a5e-9d3a-6a1f2e7c4b10";

    #[test]
    fn test_server_domain_derives_hosts() {
        let server = ServerDomain::parse(Some("example.com".into())).unwrap();
        assert_eq!(server.houston_endpoint(), "https://houston.example.com/v1");
        assert_eq!(server.registry_host(), "registry.example.com");
    }

    #[test]
    fn test_server_domain_strips_scheme_and_slash() {
        let server = ServerDomain::parse(Some("https://example.com/".into())).unwrap();
        assert_eq!(server.as_str(), "example.com");
    }

    #[test]
    fn test_server_domain_rejects_paths() {
        let err = ServerDomain::parse(Some("example.com/v1".into())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "SERVER_URL", .. }));
    }

    #[test]
    fn test_missing_settings() {
        assert_eq!(
            PublisherConfig::new(None).unwrap_err(),
            ConfigError::Missing("SERVER_URL")
        );
        assert_eq!(
            ProvisionerConfig::new(Some("example.com".into()), Some("  ".into()), Some(WORKSPACE.into()))
                .unwrap_err(),
            ConfigError::Missing("TOKEN")
        );
        assert_eq!(
            ProvisionerConfig::new(Some("example.com".into()), Some("tok".into()), None).unwrap_err(),
            ConfigError::Missing("WORKSPACE_ID")
        );
    }

    #[test]
    fn test_workspace_id_must_be_uuid() {
        let err = ProvisionerConfig::new(
            Some("example.com".into()),
            Some("tok".into()),
            Some("not-a-uuid".into()),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "WORKSPACE_ID", .. }));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = ProvisionerConfig::new(
            Some("example.com".into()),
            Some("super-secret".into()),
            Some(WORKSPACE.into()),
        )
        .unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
