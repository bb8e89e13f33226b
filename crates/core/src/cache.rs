//! Per-run identifier cache.
//!
//! [`IdentifierCache`] remembers the team listing, each team's project
//! listing, and template lookups for the lifetime of one batch run. The first
//! access for a key goes to the transport. Every later access is answered
//! locally. Failed fetches leave no trace, so a later record can try again.
//!
//! The cache is passed the transport on each call rather than owning it; it
//! knows nothing about which backend it is talking to.

use std::collections::HashMap;

use tracing::debug;

use crate::errors::TransportError;
use crate::models::{Project, Team};
use crate::transport::Transport;

/// Case-fold and trim a name for comparison.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// In-memory cache of resolved names, scoped to a single run.
#[derive(Debug, Default)]
pub struct IdentifierCache {
    /// Full team listing, fetched once.
    teams: Option<Vec<Team>>,
    /// team_id -> normalized project name -> project.
    projects: HashMap<String, HashMap<String, Project>>,
    /// (team_id, normalized template name) -> template id.
    templates: HashMap<(String, String), Option<String>>,
}

impl IdentifierCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a team by name or key, fetching the team listing on first use.
    ///
    /// Returns `Ok(None)` when the listing has no match.
    pub async fn get_or_fetch_team<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        name: &str,
    ) -> Result<Option<Team>, TransportError> {
        if self.teams.is_none() {
            let fetched = transport.list_teams().await?;
            debug!(count = fetched.len(), "cached team listing");
            self.teams = Some(fetched);
        }
        let teams = self.teams.as_deref().unwrap_or_default();

        let needle = normalize_name(name);
        let found = teams.iter().find(|team| {
            normalize_name(&team.name) == needle
                || team
                    .key
                    .as_deref()
                    .is_some_and(|key| normalize_name(key) == needle)
        });
        Ok(found.cloned())
    }

    /// Names of every cached team, sorted, for diagnostics.
    pub fn team_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .teams
            .iter()
            .flatten()
            .map(|team| team.name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Return the team's projects keyed by normalized name, fetching them on
    /// first use.
    pub async fn get_or_fetch_projects<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        team_id: &str,
    ) -> Result<&HashMap<String, Project>, TransportError> {
        if !self.projects.contains_key(team_id) {
            let fetched = transport.list_projects(team_id).await?;
            debug!(team_id, count = fetched.len(), "cached project listing");
            let mut index = HashMap::with_capacity(fetched.len());
            for project in fetched {
                // First listed project wins on duplicate names.
                index.entry(normalize_name(&project.name)).or_insert(project);
            }
            self.projects.insert(team_id.to_string(), index);
        }
        Ok(&*self.projects.entry(team_id.to_string()).or_default())
    }

    /// Look up a project without touching the network.
    pub fn cached_project(&self, team_id: &str, name: &str) -> Option<&Project> {
        self.projects
            .get(team_id)
            .and_then(|index| index.get(&normalize_name(name)))
    }

    /// Names of the team's cached projects, sorted, for diagnostics.
    pub fn project_names(&self, team_id: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .projects
            .get(team_id)
            .into_iter()
            .flat_map(|index| index.values())
            .map(|project| project.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Insert a project the resolver just created.
    pub fn record_created_project(&mut self, team_id: &str, project: Project) {
        debug!(team_id, project = %project.name, "caching created project");
        self.projects
            .entry(team_id.to_string())
            .or_default()
            .insert(normalize_name(&project.name), project);
    }

    /// Resolve a template name for a team, asking the transport once per
    /// (team, name) pair. A "no match" answer is cached too.
    pub async fn get_or_fetch_template<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        team_id: &str,
        name: &str,
    ) -> Result<Option<String>, TransportError> {
        let key = (team_id.to_string(), normalize_name(name));
        if let Some(cached) = self.templates.get(&key) {
            return Ok(cached.clone());
        }
        let resolved = transport.resolve_template(team_id, name).await?;
        debug!(team_id, template = name, found = resolved.is_some(), "cached template lookup");
        self.templates.insert(key, resolved.clone());
        Ok(resolved)
    }
}
