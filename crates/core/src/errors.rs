//! Error types for the issuemaker core library.
//!
//! Each subsystem has its own error type derived with `thiserror`. Failed
//! records are categorized by [`ErrorKind`]; the binary wraps everything else
//! in `anyhow`.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

/// Network, authentication, or protocol failures from either backend
/// transport. Never retried by the core.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP-level transport error (network, TLS, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status code.
    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    /// The token was rejected.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The GraphQL endpoint returned an `errors` array.
    #[error("GraphQL errors: {0}")]
    GraphQl(String),

    /// An MCP session could not be established or a tool call failed.
    #[error("MCP error: {0}")]
    Session(String),

    /// The backend answered with data we could not interpret.
    #[error("unexpected response from '{operation}': {detail}")]
    UnexpectedResponse { operation: String, detail: String },

    /// The backend refused to create a project.
    #[error("failed to create project '{project}' in team '{team}': {detail}")]
    ProjectCreationRejected {
        team: String,
        project: String,
        detail: String,
    },

    /// A call was made before `open()` or after `close()`.
    #[error("transport is not open")]
    NotOpen,
}

// ---------------------------------------------------------------------------
// Issue creation errors
// ---------------------------------------------------------------------------

/// Failures from the `create_issue` call.
#[derive(Debug, Error)]
pub enum IssueCreationError {
    /// The backend rejected the create call. The message is passed through
    /// verbatim.
    #[error("issue creation rejected: {0}")]
    Rejected(String),

    /// The call never reached a verdict.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

// ---------------------------------------------------------------------------
// Resolution errors
// ---------------------------------------------------------------------------

/// Errors from turning team/project names into backend identifiers.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No team matched. `available` lists the team names the backend knows.
    #[error("could not find team '{name}'. Available teams: {}", join_names(.available))]
    TeamNotFound { name: String, available: Vec<String> },

    /// No project matched in the team and auto-creation was not possible.
    #[error(
        "could not find project '{name}' in team '{team}'. Available projects: {}",
        join_names(.available)
    )]
    ProjectNotFound {
        team: String,
        name: String,
        available: Vec<String>,
    },

    /// An earlier record already tried to create this project and failed.
    /// Creation is not retried within a run.
    #[error("project '{name}' in team '{team}' was not created: an earlier attempt failed: {reason}")]
    EarlierCreationFailed {
        team: String,
        name: String,
        reason: String,
    },

    /// Looking up or creating an entity failed at the transport level.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

fn join_names(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".into()
    } else {
        names.join(", ")
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// No token could be found for the selected transport.
    #[error("no access token for the {transport} transport: set {env_var}, pass --token, or configure a token_path")]
    MissingCredentials { transport: String, env_var: String },

    /// A token file could not be read.
    #[error("token file '{path}' could not be read: {detail}")]
    TokenFile { path: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Input parsing errors
// ---------------------------------------------------------------------------

/// Errors from parsing tabular input into records.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("CSV input is empty")]
    Empty,

    #[error("CSV has no header row")]
    MissingHeader,

    #[error("CSV is missing required columns: {missing}. Available columns: {available}")]
    MissingColumns { missing: String, available: String },

    /// Per-row validation failures, aggregated.
    #[error("CSV parsing errors:\n  {}", .0.join("\n  "))]
    InvalidRows(Vec<String>),

    #[error("no valid issues found in CSV")]
    NoRecords,

    #[error("invalid delimiter '{0}': must be a single ASCII character")]
    InvalidDelimiter(String),

    #[error("CSV read error: {0}")]
    Csv(#[from] csv::Error),
}

// ---------------------------------------------------------------------------
// Outcome categories
// ---------------------------------------------------------------------------

/// Category attached to a failed [`crate::models::Outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TeamNotFound,
    ProjectNotFound,
    Transport,
    IssueCreation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TeamNotFound => write!(f, "team not found"),
            Self::ProjectNotFound => write!(f, "project not found"),
            Self::Transport => write!(f, "transport"),
            Self::IssueCreation => write!(f, "issue creation"),
        }
    }
}

impl ResolveError {
    /// The outcome category for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TeamNotFound { .. } => ErrorKind::TeamNotFound,
            Self::ProjectNotFound { .. } => ErrorKind::ProjectNotFound,
            Self::EarlierCreationFailed { .. } | Self::Transport(_) => ErrorKind::Transport,
        }
    }
}

impl IssueCreationError {
    /// The outcome category for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Rejected(_) => ErrorKind::IssueCreation,
            Self::Transport(_) => ErrorKind::Transport,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = ResolveError::TeamNotFound {
            name: "Platform".into(),
            available: vec!["Backend".into(), "Mobile".into()],
        };
        assert_eq!(
            err.to_string(),
            "could not find team 'Platform'. Available teams: Backend, Mobile"
        );

        let err = ResolveError::ProjectNotFound {
            team: "Backend".into(),
            name: "Payments".into(),
            available: vec![],
        };
        assert!(err.to_string().contains("(none)"));

        let err = IssueCreationError::Rejected("title is too long".into());
        assert!(err.to_string().ends_with("title is too long"));

        let err = ConfigError::MissingCredentials {
            transport: "direct".into(),
            env_var: "LINEAR_API_ACCESS_TOKEN".into(),
        };
        assert!(err.to_string().contains("LINEAR_API_ACCESS_TOKEN"));
    }

    #[test]
    fn test_invalid_rows_lists_every_row() {
        let err = ParseError::InvalidRows(vec![
            "Row 2: field 'title' cannot be empty".into(),
            "Row 4: field 'team' cannot be empty".into(),
        ]);
        let text = err.to_string();
        assert!(text.contains("Row 2"));
        assert!(text.contains("Row 4"));
    }

    #[test]
    fn test_error_kinds() {
        let err = ResolveError::Transport(TransportError::NotOpen);
        assert_eq!(err.kind(), ErrorKind::Transport);

        let err = IssueCreationError::Rejected("nope".into());
        assert_eq!(err.kind(), ErrorKind::IssueCreation);

        let err: IssueCreationError = TransportError::NotOpen.into();
        assert_eq!(err.kind(), ErrorKind::Transport);

        let err = ResolveError::EarlierCreationFailed {
            team: "Backend".into(),
            name: "Payments".into(),
            reason: "quota exceeded".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().ends_with("an earlier attempt failed: quota exceeded"));
    }
}
