//! Backend transports for talking to Linear.
//!
//! Both transports implement the [`Transport`] capability set, so the
//! resolver and orchestrator never know which one they are driving:
//!
//! - [`managed::ManagedSessionClient`]: a persistent MCP session. No template support.
//! - [`direct::DirectApiClient`]: stateless GraphQL requests. Supports templates.
//!
//! [`Backend`] holds exactly one of them and is chosen once per run by
//! [`selector::select`].

pub mod direct;
pub mod managed;
pub mod selector;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{IssueCreationError, TransportError};
use crate::models::{CreatedIssue, IssueRequest, Project, Team};

pub use direct::DirectApiClient;
pub use managed::ManagedSessionClient;
pub use selector::{select, select_kind};

/// Colour given to auto-created projects (Linear's default grey).
pub(crate) const DEFAULT_PROJECT_COLOR: &str = "#bec2c8";

/// Capability set shared by every backend transport.
///
/// `open` must be called before any other operation and `close` must be
/// called on every exit path once `open` has succeeded.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name reported to the operator (`managed` or `direct`).
    fn name(&self) -> &'static str;

    async fn open(&mut self) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;

    async fn list_teams(&self) -> Result<Vec<Team>, TransportError>;

    async fn list_projects(&self, team_id: &str) -> Result<Vec<Project>, TransportError>;

    async fn create_project(&self, team_id: &str, name: &str) -> Result<Project, TransportError>;

    async fn create_issue(
        &self,
        request: &IssueRequest<'_>,
    ) -> Result<CreatedIssue, IssueCreationError>;

    /// Find a template by name for the team. `Ok(None)` means "no match" and
    /// is not a failure.
    async fn resolve_template(
        &self,
        team_id: &str,
        name: &str,
    ) -> Result<Option<String>, TransportError>;
}

// ---------------------------------------------------------------------------
// Mode and kind
// ---------------------------------------------------------------------------

/// How the operator asked for the transport to be chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[serde(alias = "mcp")]
    Managed,
    #[serde(alias = "api")]
    Direct,
    #[default]
    Auto,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Managed => write!(f, "managed"),
            Self::Direct => write!(f, "direct"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl std::str::FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "managed" | "mcp" => Ok(Self::Managed),
            "direct" | "api" => Ok(Self::Direct),
            "auto" => Ok(Self::Auto),
            other => Err(format!(
                "unknown transport mode '{}': expected managed, direct, or auto",
                other
            )),
        }
    }
}

/// The concrete transport a run will use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Managed,
    Direct,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Managed => "managed",
            Self::Direct => "direct",
        }
    }

    pub fn supports_templates(&self) -> bool {
        matches!(self, Self::Direct)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// The transport chosen for a run.
pub enum Backend {
    Managed(ManagedSessionClient),
    Direct(DirectApiClient),
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Managed(_) => BackendKind::Managed,
            Self::Direct(_) => BackendKind::Direct,
        }
    }
}

#[async_trait]
impl Transport for Backend {
    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        match self {
            Self::Managed(t) => t.open().await,
            Self::Direct(t) => t.open().await,
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self {
            Self::Managed(t) => t.close().await,
            Self::Direct(t) => t.close().await,
        }
    }

    async fn list_teams(&self) -> Result<Vec<Team>, TransportError> {
        match self {
            Self::Managed(t) => t.list_teams().await,
            Self::Direct(t) => t.list_teams().await,
        }
    }

    async fn list_projects(&self, team_id: &str) -> Result<Vec<Project>, TransportError> {
        match self {
            Self::Managed(t) => t.list_projects(team_id).await,
            Self::Direct(t) => t.list_projects(team_id).await,
        }
    }

    async fn create_project(&self, team_id: &str, name: &str) -> Result<Project, TransportError> {
        match self {
            Self::Managed(t) => t.create_project(team_id, name).await,
            Self::Direct(t) => t.create_project(team_id, name).await,
        }
    }

    async fn create_issue(
        &self,
        request: &IssueRequest<'_>,
    ) -> Result<CreatedIssue, IssueCreationError> {
        match self {
            Self::Managed(t) => t.create_issue(request).await,
            Self::Direct(t) => t.create_issue(request).await,
        }
    }

    async fn resolve_template(
        &self,
        team_id: &str,
        name: &str,
    ) -> Result<Option<String>, TransportError> {
        match self {
            Self::Managed(t) => t.resolve_template(team_id, name).await,
            Self::Direct(t) => t.resolve_template(team_id, name).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse_accepts_aliases() {
        assert_eq!("managed".parse::<TransportMode>().unwrap(), TransportMode::Managed);
        assert_eq!("MCP".parse::<TransportMode>().unwrap(), TransportMode::Managed);
        assert_eq!("api".parse::<TransportMode>().unwrap(), TransportMode::Direct);
        assert_eq!(" auto ".parse::<TransportMode>().unwrap(), TransportMode::Auto);
        assert!("graphql".parse::<TransportMode>().is_err());
    }

    #[test]
    fn test_mode_deserialize_aliases() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: TransportMode,
        }
        let w: Wrapper = toml::from_str("mode = \"api\"").unwrap();
        assert_eq!(w.mode, TransportMode::Direct);
        let w: Wrapper = toml::from_str("mode = \"managed\"").unwrap();
        assert_eq!(w.mode, TransportMode::Managed);
    }

    #[test]
    fn test_kind_template_support() {
        assert!(BackendKind::Direct.supports_templates());
        assert!(!BackendKind::Managed.supports_templates());
        assert_eq!(BackendKind::Managed.to_string(), "managed");
    }
}
