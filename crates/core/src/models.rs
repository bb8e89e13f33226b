//! Shared data models used across the issuemaker core library.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ErrorKind;

// ---------------------------------------------------------------------------
// Input records
// ---------------------------------------------------------------------------

/// One input row: an issue to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
    /// 1-based position in the input, used for error reporting.
    pub position: usize,
    pub team: String,
    pub project: String,
    pub title: String,
    /// Issue description (the `summary` column).
    pub body: String,
    /// Template name; `None` when the cell is absent or blank.
    pub template: Option<String>,
}

impl IssueRecord {
    /// The requested template name, if it is non-empty after trimming.
    pub fn template_name(&self) -> Option<&str> {
        self.template
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Backend entities (normalized across transports)
// ---------------------------------------------------------------------------

/// A team as returned by either transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    /// Short team key such as `ENG`, when the backend reports one.
    #[serde(default)]
    pub key: Option<String>,
}

/// A project within a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

/// Everything a transport needs to create one issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRequest<'a> {
    pub team_id: &'a str,
    pub project_id: &'a str,
    pub title: &'a str,
    pub body: &'a str,
    pub template_id: Option<&'a str>,
}

/// An issue returned by a successful create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedIssue {
    pub id: String,
    /// Human-facing identifier such as `ENG-42`.
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl CreatedIssue {
    /// The identifier to show to a person: `ENG-42` when known, the raw id otherwise.
    pub fn display_id(&self) -> &str {
        self.identifier.as_deref().unwrap_or(&self.id)
    }
}

// ---------------------------------------------------------------------------
// Resolution results
// ---------------------------------------------------------------------------

/// Concrete backend identifiers for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentifiers {
    pub team_id: String,
    pub project_id: String,
    pub template_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Informational note attached to a successful outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "note", rename_all = "snake_case")]
pub enum Note {
    /// The project did not exist and was created for this record.
    ProjectCreated { project: String },
    /// The requested template matched nothing; the issue was created without it.
    TemplateNotFound { template: String },
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProjectCreated { project } => write!(f, "created new project: {}", project),
            Self::TemplateNotFound { template } => write!(
                f,
                "template '{}' not found, issue created without a template",
                template
            ),
        }
    }
}

/// Per-record result of a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        position: usize,
        title: String,
        issue: CreatedIssue,
        notes: Vec<Note>,
    },
    Failure {
        position: usize,
        title: String,
        kind: ErrorKind,
        message: String,
    },
}

impl Outcome {
    /// 1-based position of the originating record.
    pub fn position(&self) -> usize {
        match self {
            Self::Success { position, .. } | Self::Failure { position, .. } => *position,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Final tally of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Number of records in the input, including any never attempted.
    pub total: usize,
}

/// Outcomes plus tally, as returned by a full batch execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Name of the transport that ran the batch.
    pub transport: String,
    pub outcomes: Vec<Outcome>,
    pub summary: BatchSummary,
}

impl BatchReport {
    pub fn new(transport: impl Into<String>, outcomes: Vec<Outcome>, total: usize) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        let failed = outcomes.len() - succeeded;
        Self {
            transport: transport.into(),
            outcomes,
            summary: BatchSummary {
                succeeded,
                failed,
                total,
            },
        }
    }

    /// True when every attempted record succeeded and none were skipped.
    pub fn is_complete_success(&self) -> bool {
        self.summary.failed == 0 && self.summary.succeeded == self.summary.total
    }
}
