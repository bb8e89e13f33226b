//! Managed MCP session transport.
//!
//! Talks to Linear's hosted MCP server over streamable HTTP. One session is
//! opened per run and every operation is a tool call on it. Tool results come
//! back either as structured content or as JSON embedded in a text block, and
//! the listing tools are loose about where the actual list lives, so replies
//! are normalized before they reach the rest of the crate.
//!
//! This transport cannot apply templates.

use std::time::Duration;

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParams, CallToolResult, RawContent};
use rmcp::service::RunningService;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::{ClientHandler, RoleClient, ServiceExt};
use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::config::TransportSettings;
use crate::errors::{IssueCreationError, TransportError};
use crate::models::{CreatedIssue, IssueRequest, Project, Team};

use super::{Transport, DEFAULT_PROJECT_COLOR};

/// Keys under which listing tools have been seen to nest their results.
const LIST_KEYS: &[&str] = &["content", "items", "nodes", "data", "teams", "projects"];

/// Keys that may carry an entity identifier, in preference order.
const ID_KEYS: &[&str] = &["id", "teamId", "projectId", "templateId", "identifier"];

/// Keys that may carry an entity's display name, in preference order.
const NAME_KEYS: &[&str] = &["name", "title", "key", "slug"];

/// Client handler with default behaviour; the session only issues requests.
#[derive(Clone, Debug)]
pub struct SessionHandler;

impl ClientHandler for SessionHandler {}

/// A persistent MCP session against the managed Linear server.
pub struct ManagedSessionClient {
    settings: TransportSettings,
    service: Option<RunningService<RoleClient, SessionHandler>>,
}

impl ManagedSessionClient {
    pub fn new(settings: TransportSettings) -> Self {
        info!(server_url = %settings.endpoint, "created ManagedSessionClient");
        Self {
            settings,
            service: None,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.settings.timeout_secs)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolReply, TransportError> {
        let service = self.service.as_ref().ok_or(TransportError::NotOpen)?;
        let mut params = CallToolRequestParams::new(name.to_string());
        if let Some(map) = arguments.as_object().cloned() {
            params = params.with_arguments(map);
        }
        debug!(tool = name, "calling MCP tool");
        let result = timeout(self.timeout(), service.call_tool(params))
            .await
            .map_err(|_| {
                TransportError::Session(format!(
                    "tool '{}' timed out after {}s",
                    name, self.settings.timeout_secs
                ))
            })?
            .map_err(|e| TransportError::Session(format!("tool '{}' failed: {}", name, e)))?;
        Ok(ToolReply::from_result(result))
    }
}

#[async_trait]
impl Transport for ManagedSessionClient {
    fn name(&self) -> &'static str {
        "managed"
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        if self.service.is_some() {
            return Ok(());
        }
        let config = StreamableHttpClientTransportConfig::with_uri(self.settings.endpoint.clone())
            .auth_header(self.settings.token.clone());
        let transport = StreamableHttpClientTransport::from_config(config);
        let service = timeout(self.timeout(), SessionHandler.serve(transport))
            .await
            .map_err(|_| {
                TransportError::Session(format!(
                    "timed out connecting to {}",
                    self.settings.endpoint
                ))
            })?
            .map_err(|e| {
                TransportError::Session(format!(
                    "failed to connect to {}: {}",
                    self.settings.endpoint, e
                ))
            })?;
        info!(server_url = %self.settings.endpoint, "MCP session opened");
        self.service = Some(service);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(service) = self.service.take() {
            service
                .cancel()
                .await
                .map_err(|e| TransportError::Session(format!("failed to close session: {}", e)))?;
            debug!("MCP session closed");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_teams(&self) -> Result<Vec<Team>, TransportError> {
        let tool = &self.settings.tools.list_teams_tool;
        let payload = self.call_tool(tool, json!({})).await?.payload(tool)?;
        let teams: Vec<Team> = extract_list(&payload).into_iter().filter_map(to_team).collect();
        debug!(count = teams.len(), "fetched teams");
        Ok(teams)
    }

    #[instrument(skip(self))]
    async fn list_projects(&self, team_id: &str) -> Result<Vec<Project>, TransportError> {
        let tool = &self.settings.tools.list_projects_tool;
        let payload = self
            .call_tool(tool, json!({ "team": team_id }))
            .await?
            .payload(tool)?;
        let projects: Vec<Project> = extract_list(&payload)
            .into_iter()
            .filter_map(to_project)
            .collect();
        debug!(count = projects.len(), "fetched projects");
        Ok(projects)
    }

    #[instrument(skip(self))]
    async fn create_project(&self, team_id: &str, name: &str) -> Result<Project, TransportError> {
        let tool = &self.settings.tools.create_project_tool;
        let reply = self
            .call_tool(
                tool,
                json!({ "name": name, "team": team_id, "color": DEFAULT_PROJECT_COLOR }),
            )
            .await?;
        let rejected = |detail: String| TransportError::ProjectCreationRejected {
            team: team_id.into(),
            project: name.into(),
            detail,
        };
        if reply.is_error {
            return Err(rejected(reply.message()));
        }
        let payload = reply.payload(tool)?;
        let project = extract_object(&payload)
            .and_then(to_project)
            .ok_or_else(|| rejected("no project id in response".into()))?;
        info!(project_id = %project.id, "created project");
        Ok(project)
    }

    #[instrument(skip(self, request), fields(team_id = request.team_id, project_id = request.project_id))]
    async fn create_issue(
        &self,
        request: &IssueRequest<'_>,
    ) -> Result<CreatedIssue, IssueCreationError> {
        if request.template_id.is_some() {
            warn!("managed transport cannot apply templates, ignoring template");
        }
        let tool = &self.settings.tools.create_issue_tool;
        let reply = self
            .call_tool(
                tool,
                json!({
                    "team": request.team_id,
                    "project": request.project_id,
                    "title": request.title,
                    "description": request.body,
                }),
            )
            .await?;
        if reply.is_error {
            return Err(IssueCreationError::Rejected(reply.message()));
        }
        let payload = reply
            .payload(tool)
            .map_err(|e| IssueCreationError::Rejected(e.to_string()))?;
        let issue = extract_object(&payload)
            .and_then(to_issue)
            .ok_or_else(|| IssueCreationError::Rejected("no issue returned from creation".into()))?;
        info!(issue = issue.display_id(), "created issue");
        Ok(issue)
    }

    async fn resolve_template(
        &self,
        _team_id: &str,
        _name: &str,
    ) -> Result<Option<String>, TransportError> {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Reply normalization
// ---------------------------------------------------------------------------

/// The parts of a tool result this transport cares about.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ToolReply {
    pub structured: Option<Value>,
    /// First text block, if any.
    pub text: Option<String>,
    pub is_error: bool,
}

impl ToolReply {
    fn from_result(result: CallToolResult) -> Self {
        let text = result.content.iter().find_map(|content| match &**content {
            RawContent::Text(block) => Some(block.text.clone()),
            _ => None,
        });
        Self {
            structured: result.structured_content,
            text,
            is_error: result.is_error.unwrap_or(false),
        }
    }

    /// Human-readable message carried by the reply, used for errors.
    fn message(&self) -> String {
        match (&self.text, &self.structured) {
            (Some(text), _) if !text.trim().is_empty() => text.trim().to_string(),
            (_, Some(value)) => value.to_string(),
            _ => "tool reported an error without a message".into(),
        }
    }

    /// The decoded JSON payload: structured content when present, otherwise
    /// the text block parsed as JSON.
    fn payload(self, operation: &str) -> Result<Value, TransportError> {
        if self.is_error {
            return Err(TransportError::Session(format!(
                "tool '{}' reported an error: {}",
                operation,
                self.message()
            )));
        }
        if let Some(value) = self.structured {
            return Ok(value);
        }
        let text = self.text.ok_or_else(|| TransportError::UnexpectedResponse {
            operation: operation.into(),
            detail: "empty tool result".into(),
        })?;
        serde_json::from_str(&text).map_err(|e| TransportError::UnexpectedResponse {
            operation: operation.into(),
            detail: format!("tool result is not JSON ({}): {}", e, truncate(&text, 200)),
        })
    }
}

/// Find the list of records in a listing payload.
pub(crate) fn extract_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => LIST_KEYS
            .iter()
            .filter_map(|key| map.get(*key))
            .map(extract_list)
            .find(|items| !items.is_empty())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Find the single record in a create payload: the object itself when it
/// carries an id, an object nested under a common wrapper key, or the first
/// element of a list.
pub(crate) fn extract_object(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.first(),
        Value::Object(map) => {
            if record_id(value).is_some() {
                return Some(value);
            }
            ["issue", "project", "data", "content"]
                .iter()
                .filter_map(|key| map.get(*key))
                .find_map(extract_object)
        }
        _ => None,
    }
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

pub(crate) fn record_id(value: &Value) -> Option<String> {
    string_field(value, ID_KEYS)
}

pub(crate) fn record_name(value: &Value) -> Option<String> {
    string_field(value, NAME_KEYS)
}

fn to_team(value: &Value) -> Option<Team> {
    let (Some(id), Some(name)) = (record_id(value), record_name(value)) else {
        debug!(entry = %value, "skipping team entry without id or name");
        return None;
    };
    Some(Team {
        id,
        name,
        key: string_field(value, &["key"]),
    })
}

fn to_project(value: &Value) -> Option<Project> {
    let (Some(id), Some(name)) = (record_id(value), record_name(value)) else {
        debug!(entry = %value, "skipping project entry without id or name");
        return None;
    };
    Some(Project { id, name })
}

fn to_issue(value: &Value) -> Option<CreatedIssue> {
    let id = string_field(value, &["id", "identifier"])?;
    Some(CreatedIssue {
        id,
        identifier: string_field(value, &["identifier"]),
        title: string_field(value, &["title"]),
        url: string_field(value, &["url"]),
    })
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
