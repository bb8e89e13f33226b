//! Shared fixtures for the core integration tests.
//!
//! [`RecordingTransport`] is an in-memory backend that counts every call and
//! remembers every issue it was asked to create.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use issuemaker_core::cache::normalize_name;
use issuemaker_core::errors::{IssueCreationError, TransportError};
use issuemaker_core::models::{CreatedIssue, IssueRecord, IssueRequest, Project, Team};
use issuemaker_core::Transport;

/// An issue as the backend received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedIssue {
    pub team_id: String,
    pub project_id: String,
    pub title: String,
    pub body: String,
    pub template_id: Option<String>,
}

/// Per-operation call counters plus the created issues.
#[derive(Debug, Clone, Default)]
pub struct Calls {
    pub open: usize,
    pub close: usize,
    pub list_teams: usize,
    pub list_projects: usize,
    pub create_project: usize,
    pub create_issue: usize,
    pub resolve_template: usize,
    pub issues: Vec<RecordedIssue>,
}

pub struct RecordingTransport {
    name: &'static str,
    teams: Vec<Team>,
    projects: Mutex<HashMap<String, Vec<Project>>>,
    templates: HashMap<(String, String), String>,
    fail_open: bool,
    fail_project_creation: bool,
    fail_template_lookup: bool,
    rejected_titles: HashSet<String>,
    calls: Mutex<Calls>,
}

impl RecordingTransport {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            teams: Vec::new(),
            projects: Mutex::new(HashMap::new()),
            templates: HashMap::new(),
            fail_open: false,
            fail_project_creation: false,
            fail_template_lookup: false,
            rejected_titles: HashSet::new(),
            calls: Mutex::new(Calls::default()),
        }
    }

    pub fn with_team(mut self, id: &str, name: &str, key: &str) -> Self {
        self.teams.push(Team {
            id: id.into(),
            name: name.into(),
            key: Some(key.into()),
        });
        self
    }

    pub fn with_project(self, team_id: &str, id: &str, name: &str) -> Self {
        self.projects
            .lock()
            .unwrap()
            .entry(team_id.into())
            .or_default()
            .push(Project {
                id: id.into(),
                name: name.into(),
            });
        self
    }

    pub fn with_template(mut self, team_id: &str, name: &str, id: &str) -> Self {
        self.templates
            .insert((team_id.into(), normalize_name(name)), id.into());
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn failing_project_creation(mut self) -> Self {
        self.fail_project_creation = true;
        self
    }

    pub fn failing_template_lookup(mut self) -> Self {
        self.fail_template_lookup = true;
        self
    }

    pub fn rejecting_title(mut self, title: &str) -> Self {
        self.rejected_titles.insert(title.into());
        self
    }

    /// Snapshot of everything recorded so far.
    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }
}

/// The default fixture: one team with one existing project.
pub fn acme_transport(name: &'static str) -> RecordingTransport {
    RecordingTransport::new(name)
        .with_team("team-x", "TeamX", "TX")
        .with_team("team-y", "TeamY", "TY")
        .with_project("team-x", "proj-a", "ProjA")
}

pub fn record(position: usize, team: &str, project: &str, template: Option<&str>) -> IssueRecord {
    IssueRecord {
        position,
        team: team.into(),
        project: project.into(),
        title: format!("T{}", position),
        body: format!("B{}", position),
        template: template.map(String::from),
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        self.calls.lock().unwrap().open += 1;
        if self.fail_open {
            return Err(TransportError::Session("connection refused".into()));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.calls.lock().unwrap().close += 1;
        Ok(())
    }

    async fn list_teams(&self) -> Result<Vec<Team>, TransportError> {
        self.calls.lock().unwrap().list_teams += 1;
        Ok(self.teams.clone())
    }

    async fn list_projects(&self, team_id: &str) -> Result<Vec<Project>, TransportError> {
        self.calls.lock().unwrap().list_projects += 1;
        Ok(self
            .projects
            .lock()
            .unwrap()
            .get(team_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_project(&self, team_id: &str, name: &str) -> Result<Project, TransportError> {
        let count = {
            let mut calls = self.calls.lock().unwrap();
            calls.create_project += 1;
            calls.create_project
        };
        if self.fail_project_creation {
            return Err(TransportError::ProjectCreationRejected {
                team: team_id.into(),
                project: name.into(),
                detail: "quota exceeded".into(),
            });
        }
        let project = Project {
            id: format!("created-{}", count),
            name: name.into(),
        };
        self.projects
            .lock()
            .unwrap()
            .entry(team_id.into())
            .or_default()
            .push(project.clone());
        Ok(project)
    }

    async fn create_issue(
        &self,
        request: &IssueRequest<'_>,
    ) -> Result<CreatedIssue, IssueCreationError> {
        let mut calls = self.calls.lock().unwrap();
        calls.create_issue += 1;
        if self.rejected_titles.contains(request.title) {
            return Err(IssueCreationError::Rejected("Title is reserved".into()));
        }
        calls.issues.push(RecordedIssue {
            team_id: request.team_id.into(),
            project_id: request.project_id.into(),
            title: request.title.into(),
            body: request.body.into(),
            template_id: request.template_id.map(String::from),
        });
        let n = calls.issues.len();
        Ok(CreatedIssue {
            id: format!("issue-{}", n),
            identifier: Some(format!("TX-{}", n)),
            title: Some(request.title.into()),
            url: Some(format!("https://linear.app/acme/issue/TX-{}", n)),
        })
    }

    async fn resolve_template(
        &self,
        team_id: &str,
        name: &str,
    ) -> Result<Option<String>, TransportError> {
        self.calls.lock().unwrap().resolve_template += 1;
        if self.fail_template_lookup {
            return Err(TransportError::GraphQl("templates unavailable".into()));
        }
        Ok(self
            .templates
            .get(&(team_id.to_string(), normalize_name(name)))
            .cloned())
    }
}
