//! Name-to-identifier resolution with idempotent project auto-creation.
//!
//! A [`Resolver`] owns the per-run [`IdentifierCache`] and the creation
//! tracker. Each batch run builds a fresh one, so two runs in the same process
//! never share state.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::cache::{normalize_name, IdentifierCache};
use crate::errors::ResolveError;
use crate::models::ResolvedIdentifiers;
use crate::transport::Transport;

/// Result of resolving one (team, project) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub ids: ResolvedIdentifiers,
    /// True only for the call that actually created the project.
    pub project_created: bool,
}

/// Resolves team and project names against a transport, caching everything
/// it learns for the rest of the run.
pub struct Resolver<'t, T: Transport + ?Sized> {
    transport: &'t T,
    cache: IdentifierCache,
    /// (normalized team name, normalized project name) pairs for which
    /// creation has already been attempted, with the failure reason when the
    /// attempt did not succeed.
    attempted: HashMap<(String, String), Option<String>>,
}

impl<'t, T: Transport + ?Sized> Resolver<'t, T> {
    pub fn new(transport: &'t T) -> Self {
        Self {
            transport,
            cache: IdentifierCache::new(),
            attempted: HashMap::new(),
        }
    }

    /// Read-only view of the cache, mostly for diagnostics and tests.
    pub fn cache(&self) -> &IdentifierCache {
        &self.cache
    }

    /// Turn a (team, project) name pair into backend identifiers.
    ///
    /// When `allow_create` is set and the project does not exist, it is
    /// created once; every later call for the same pair reuses the cached id.
    pub async fn resolve(
        &mut self,
        team_name: &str,
        project_name: &str,
        allow_create: bool,
    ) -> Result<Resolution, ResolveError> {
        let team = self
            .cache
            .get_or_fetch_team(self.transport, team_name)
            .await?
            .ok_or_else(|| ResolveError::TeamNotFound {
                name: team_name.trim().to_string(),
                available: self.cache.team_names(),
            })?;

        let needle = normalize_name(project_name);
        let projects = self
            .cache
            .get_or_fetch_projects(self.transport, &team.id)
            .await?;
        if let Some(project) = projects.get(&needle) {
            debug!(team = %team.name, project = %project.name, "resolved from cache");
            return Ok(Resolution {
                ids: ResolvedIdentifiers {
                    team_id: team.id.clone(),
                    project_id: project.id.clone(),
                    template_id: None,
                },
                project_created: false,
            });
        }

        let not_found = |cache: &IdentifierCache| ResolveError::ProjectNotFound {
            team: team.name.clone(),
            name: project_name.trim().to_string(),
            available: cache.project_names(&team.id),
        };

        if !allow_create {
            return Err(not_found(&self.cache));
        }

        let pair = (normalize_name(&team.name), needle);
        if let Some(previous) = self.attempted.get(&pair) {
            // An earlier record already tried. A successful creation is in
            // the cache by now; a failed one is not retried.
            if let Some(project) = self.cache.cached_project(&team.id, project_name) {
                return Ok(Resolution {
                    ids: ResolvedIdentifiers {
                        team_id: team.id.clone(),
                        project_id: project.id.clone(),
                        template_id: None,
                    },
                    project_created: false,
                });
            }
            warn!(team = %team.name, project = project_name, "earlier creation attempt failed, not retrying");
            return Err(match previous {
                Some(reason) => ResolveError::EarlierCreationFailed {
                    team: team.name.clone(),
                    name: project_name.trim().to_string(),
                    reason: reason.clone(),
                },
                None => not_found(&self.cache),
            });
        }

        let name = project_name.trim();
        info!(team = %team.name, project = name, "creating missing project");
        let project = match self.transport.create_project(&team.id, name).await {
            Ok(project) => {
                self.attempted.insert(pair, None);
                project
            }
            Err(e) => {
                self.attempted.insert(pair, Some(e.to_string()));
                return Err(e.into());
            }
        };
        let project_id = project.id.clone();
        self.cache.record_created_project(&team.id, project);

        Ok(Resolution {
            ids: ResolvedIdentifiers {
                team_id: team.id,
                project_id,
                template_id: None,
            },
            project_created: true,
        })
    }

    /// Look a template up by name. No match, or a failure while listing
    /// templates, degrades to `None`.
    pub async fn resolve_template_or_none(&mut self, team_id: &str, name: &str) -> Option<String> {
        match self
            .cache
            .get_or_fetch_template(self.transport, team_id, name)
            .await
        {
            Ok(found) => found,
            Err(e) => {
                warn!(team_id, template = name, error = %e, "template lookup failed, continuing without template");
                None
            }
        }
    }
}
