//! Direct GraphQL API transport.
//!
//! Every operation is an independent POST to the GraphQL endpoint; `open`
//! only builds the HTTP client. This is the only transport that can apply
//! issue templates.

use std::cmp::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use crate::cache::normalize_name;
use crate::config::TransportSettings;
use crate::errors::{ConfigError, IssueCreationError, TransportError};
use crate::models::{CreatedIssue, IssueRequest, Project, Team};

use super::{Transport, DEFAULT_PROJECT_COLOR};

const TEAMS_QUERY: &str = r#"
query Teams($after: String) {
    teams(first: 250, after: $after) {
        nodes { id name key }
        pageInfo { hasNextPage endCursor }
    }
}"#;

const PROJECTS_QUERY: &str = r#"
query Projects($teamId: String!, $after: String) {
    team(id: $teamId) {
        projects(first: 250, after: $after) {
            nodes { id name }
            pageInfo { hasNextPage endCursor }
        }
    }
}"#;

const CREATE_PROJECT_MUTATION: &str = r#"
mutation CreateProject($input: ProjectCreateInput!) {
    projectCreate(input: $input) {
        success
        project { id name }
    }
}"#;

const CREATE_ISSUE_MUTATION: &str = r#"
mutation IssueCreate($input: IssueCreateInput!) {
    issueCreate(input: $input) {
        success
        issue { id identifier title url }
    }
}"#;

const TEMPLATES_QUERY: &str = r#"
query Templates {
    templates { id name type teamId createdAt }
}"#;

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GraphQlResponse<D> {
    data: Option<D>,
    #[serde(default)]
    errors: Vec<GraphQlErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorEntry {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection<T> {
    nodes: Vec<T>,
    #[serde(default)]
    page_info: Option<PageInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    has_next_page: bool,
    #[serde(default)]
    end_cursor: Option<String>,
}

impl<T> Connection<T> {
    /// Cursor for the following page, if the server says there is one.
    fn next_cursor(&self) -> Option<String> {
        self.page_info
            .as_ref()
            .filter(|p| p.has_next_page)
            .and_then(|p| p.end_cursor.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TeamsData {
    teams: Connection<Team>,
}

#[derive(Debug, Deserialize)]
struct ProjectsData {
    team: Option<TeamProjects>,
}

#[derive(Debug, Deserialize)]
struct TeamProjects {
    projects: Connection<Project>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateProjectData {
    project_create: ProjectPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateIssueData {
    issue_create: IssuePayload,
}

#[derive(Debug, Deserialize)]
struct ProjectPayload {
    success: bool,
    project: Option<Project>,
}

#[derive(Debug, Deserialize)]
struct IssuePayload {
    success: bool,
    issue: Option<CreatedIssue>,
}

#[derive(Debug, Deserialize)]
struct TemplatesData {
    templates: Vec<TemplateNode>,
}

/// A template as listed by the API. Templates are workspace-wide but may be
/// scoped to a team.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateNode {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Pick the template for `name` among `templates`.
///
/// Names compare case-insensitively. A template scoped to `team_id` beats a
/// workspace-wide one; ties go to the oldest `createdAt`, then the smallest id.
pub fn pick_template(templates: &[TemplateNode], team_id: &str, name: &str) -> Option<String> {
    let needle = normalize_name(name);
    let off_team = |t: &TemplateNode| t.team_id.as_deref() != Some(team_id);
    templates
        .iter()
        .filter(|t| normalize_name(&t.name) == needle)
        .min_by(|a, b| {
            off_team(a)
                .cmp(&off_team(b))
                .then_with(|| match (a.created_at, b.created_at) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                })
                .then_with(|| a.id.cmp(&b.id))
        })
        .map(|t| t.id.clone())
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// GraphQL client for the Linear API. Apart from the template list, which
/// is fetched once per session, every call goes to the server.
pub struct DirectApiClient {
    api_url: String,
    headers: HeaderMap,
    timeout: Duration,
    http: Option<reqwest::Client>,
    templates: OnceCell<Vec<TemplateNode>>,
}

impl DirectApiClient {
    /// Build a client from resolved settings. The token is checked for
    /// header-safety here so a bad credential fails before any request.
    pub fn new(settings: TransportSettings) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&authorization_value(&settings.token)).map_err(|_| {
            ConfigError::InvalidValue {
                field: "direct.token".into(),
                detail: "token contains characters not allowed in an HTTP header".into(),
            }
        })?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("issuemaker/", env!("CARGO_PKG_VERSION"))),
        );
        info!(api_url = %settings.endpoint, "created DirectApiClient");
        Ok(Self {
            api_url: settings.endpoint,
            headers,
            timeout: Duration::from_secs(settings.timeout_secs),
            http: None,
            templates: OnceCell::new(),
        })
    }

    async fn execute<D: DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
        variables: Value,
    ) -> Result<D, TransportError> {
        let http = self.http.as_ref().ok_or(TransportError::NotOpen)?;
        let payload = json!({ "query": query, "variables": variables });
        let resp = http.post(&self.api_url).json(&payload).send().await?;

        let status = resp.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(TransportError::AuthenticationFailed(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let body = describe_body(resp.text().await);
            return Err(TransportError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: GraphQlResponse<D> =
            resp.json()
                .await
                .map_err(|e| TransportError::UnexpectedResponse {
                    operation: operation.into(),
                    detail: e.to_string(),
                })?;
        if !envelope.errors.is_empty() {
            let messages: Vec<String> = envelope.errors.into_iter().map(|e| e.message).collect();
            return Err(TransportError::GraphQl(messages.join(", ")));
        }
        envelope
            .data
            .ok_or_else(|| TransportError::UnexpectedResponse {
                operation: operation.into(),
                detail: "response has no data".into(),
            })
    }

    /// Run a connection query page by page until the server reports no
    /// further page. `connection` picks the connection out of each response;
    /// `None` means the parent object does not exist.
    async fn fetch_all<D, T, F>(
        &self,
        operation: &str,
        query: &str,
        mut variables: Value,
        connection: F,
    ) -> Result<Vec<T>, TransportError>
    where
        D: DeserializeOwned + Send,
        T: Send,
        F: Fn(D) -> Option<Connection<T>> + Send + Sync,
    {
        let mut items = Vec::new();
        let mut after: Option<String> = None;
        loop {
            variables["after"] = json!(after);
            let data: D = self.execute(operation, query, variables.clone()).await?;
            let Some(page) = connection(data) else {
                break;
            };
            let next = page.next_cursor();
            items.extend(page.nodes);
            match next {
                // A repeated cursor would loop forever.
                Some(cursor) if after.as_deref() != Some(cursor.as_str()) => {
                    debug!(operation, cursor = %cursor, "fetching next page");
                    after = Some(cursor);
                }
                _ => break,
            }
        }
        Ok(items)
    }

    /// Templates are listed once per session and reused for every name.
    async fn templates(&self) -> Result<&[TemplateNode], TransportError> {
        let templates = self
            .templates
            .get_or_try_init(|| async {
                let data: TemplatesData =
                    self.execute("templates", TEMPLATES_QUERY, json!({})).await?;
                debug!(count = data.templates.len(), "fetched templates");
                Ok::<_, TransportError>(data.templates)
            })
            .await?;
        Ok(templates.as_slice())
    }
}

/// Text of an error response, or a placeholder naming why it could not be read.
fn describe_body<E: std::fmt::Display>(body: Result<String, E>) -> String {
    match body {
        Ok(text) => text,
        Err(e) => format!("<unreadable body: {}>", e),
    }
}

/// Personal API keys are sent as-is; OAuth tokens need the bearer scheme.
fn authorization_value(token: &str) -> String {
    let token = token.trim();
    if token.starts_with("lin_api_") || token.starts_with("Bearer ") {
        token.to_string()
    } else {
        format!("Bearer {}", token)
    }
}

#[async_trait]
impl Transport for DirectApiClient {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        if self.http.is_some() {
            return Ok(());
        }
        let http = reqwest::Client::builder()
            .default_headers(self.headers.clone())
            .timeout(self.timeout)
            .build()?;
        self.http = Some(http);
        debug!(api_url = %self.api_url, "direct transport ready");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.http = None;
        self.templates = OnceCell::new();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_teams(&self) -> Result<Vec<Team>, TransportError> {
        let teams = self
            .fetch_all("teams", TEAMS_QUERY, json!({}), |data: TeamsData| {
                Some(data.teams)
            })
            .await?;
        debug!(count = teams.len(), "fetched teams");
        Ok(teams)
    }

    #[instrument(skip(self))]
    async fn list_projects(&self, team_id: &str) -> Result<Vec<Project>, TransportError> {
        let projects = self
            .fetch_all(
                "projects",
                PROJECTS_QUERY,
                json!({ "teamId": team_id }),
                |data: ProjectsData| data.team.map(|t| t.projects),
            )
            .await?;
        debug!(count = projects.len(), "fetched projects");
        Ok(projects)
    }

    #[instrument(skip(self))]
    async fn create_project(&self, team_id: &str, name: &str) -> Result<Project, TransportError> {
        let variables = json!({
            "input": { "name": name, "teamIds": [team_id], "color": DEFAULT_PROJECT_COLOR }
        });
        let data: CreateProjectData = self
            .execute("projectCreate", CREATE_PROJECT_MUTATION, variables)
            .await
            .map_err(|e| match e {
                TransportError::GraphQl(detail) => TransportError::ProjectCreationRejected {
                    team: team_id.into(),
                    project: name.into(),
                    detail,
                },
                other => other,
            })?;
        let payload = data.project_create;
        match payload.project {
            Some(project) if payload.success => {
                info!(project_id = %project.id, "created project");
                Ok(project)
            }
            _ => Err(TransportError::ProjectCreationRejected {
                team: team_id.into(),
                project: name.into(),
                detail: "the API reported failure".into(),
            }),
        }
    }

    #[instrument(skip(self, request), fields(team_id = request.team_id, project_id = request.project_id))]
    async fn create_issue(
        &self,
        request: &IssueRequest<'_>,
    ) -> Result<CreatedIssue, IssueCreationError> {
        let mut input = json!({
            "teamId": request.team_id,
            "projectId": request.project_id,
            "title": request.title,
            "description": request.body,
        });
        if let Some(template_id) = request.template_id {
            input["templateId"] = json!(template_id);
        }

        let data: CreateIssueData = self
            .execute("issueCreate", CREATE_ISSUE_MUTATION, json!({ "input": input }))
            .await
            .map_err(|e| match e {
                TransportError::GraphQl(message) => IssueCreationError::Rejected(message),
                other => IssueCreationError::Transport(other),
            })?;

        let payload = data.issue_create;
        match payload.issue {
            Some(issue) if payload.success => {
                info!(issue = issue.display_id(), "created issue");
                Ok(issue)
            }
            Some(_) => Err(IssueCreationError::Rejected("issue creation failed".into())),
            None => Err(IssueCreationError::Rejected(
                "no issue returned from creation".into(),
            )),
        }
    }

    #[instrument(skip(self))]
    async fn resolve_template(
        &self,
        team_id: &str,
        name: &str,
    ) -> Result<Option<String>, TransportError> {
        let templates = self.templates().await?;
        Ok(pick_template(templates, team_id, name))
    }
}
