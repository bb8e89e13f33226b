//! Configuration loading, credential resolution, and validation.
//!
//! Configuration lives in an optional TOML file. Every section and field has
//! a default, so a missing file is equivalent to an empty one. Tokens are
//! never stored in the file itself: each transport section names the
//! environment variable (`token_env`) and optionally a file (`token_path`)
//! that holds it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::parser::parse_delimiter;
use crate::transport::selector::SettingsSource;
use crate::transport::{BackendKind, TransportMode};

/// Environment variable holding a token shared by both transports.
pub const SHARED_TOKEN_ENV: &str = "LINEAR_ACCESS_TOKEN";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub batch: BatchConfig,

    /// Managed-session (MCP) transport settings.
    #[serde(default)]
    pub managed: ManagedConfig,

    /// Direct GraphQL API transport settings.
    #[serde(default)]
    pub direct: DirectConfig,
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Defaults for batch behaviour; CLI flags override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub mode: TransportMode,

    #[serde(default = "default_true")]
    pub create_missing_projects: bool,

    #[serde(default)]
    pub continue_on_error: bool,

    /// CSV field delimiter: a single ASCII character, or `tab`.
    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::Auto,
            create_missing_projects: true,
            continue_on_error: false,
            delimiter: default_delimiter(),
            log_level: default_log_level(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_delimiter() -> String {
    ",".into()
}

fn default_log_level() -> String {
    "warn".into()
}

// ---------------------------------------------------------------------------
// Managed-session transport
// ---------------------------------------------------------------------------

/// MCP tool names used by the managed transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolNames {
    #[serde(default = "default_list_teams_tool")]
    pub list_teams_tool: String,
    #[serde(default = "default_list_projects_tool")]
    pub list_projects_tool: String,
    #[serde(default = "default_create_project_tool")]
    pub create_project_tool: String,
    #[serde(default = "default_create_issue_tool")]
    pub create_issue_tool: String,
}

impl Default for ToolNames {
    fn default() -> Self {
        Self {
            list_teams_tool: default_list_teams_tool(),
            list_projects_tool: default_list_projects_tool(),
            create_project_tool: default_create_project_tool(),
            create_issue_tool: default_create_issue_tool(),
        }
    }
}

fn default_list_teams_tool() -> String {
    "list_teams".into()
}

fn default_list_projects_tool() -> String {
    "list_projects".into()
}

fn default_create_project_tool() -> String {
    "create_project".into()
}

fn default_create_issue_tool() -> String {
    "create_issue".into()
}

/// Settings for the Linear MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedConfig {
    /// MCP streamable-HTTP endpoint.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Environment variable holding the bearer token.
    #[serde(default = "default_managed_token_env")]
    pub token_env: String,

    /// Optional file containing the bearer token.
    #[serde(default)]
    pub token_path: Option<PathBuf>,

    /// Per-call timeout in seconds.
    #[serde(default = "default_managed_timeout")]
    pub timeout_secs: u64,

    #[serde(flatten)]
    pub tools: ToolNames,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for ManagedConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            token_env: default_managed_token_env(),
            token_path: None,
            timeout_secs: default_managed_timeout(),
            tools: ToolNames::default(),
            token: None,
        }
    }
}

fn default_server_url() -> String {
    "https://mcp.linear.app/mcp".into()
}

fn default_managed_token_env() -> String {
    "LINEAR_MCP_ACCESS_TOKEN".into()
}

fn default_managed_timeout() -> u64 {
    60
}

// ---------------------------------------------------------------------------
// Direct API transport
// ---------------------------------------------------------------------------

/// Settings for the Linear GraphQL API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_direct_token_env")]
    pub token_env: String,

    /// Optional file containing the API key.
    #[serde(default)]
    pub token_path: Option<PathBuf>,

    /// HTTP timeout in seconds.
    #[serde(default = "default_direct_timeout")]
    pub timeout_secs: u64,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for DirectConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token_env: default_direct_token_env(),
            token_path: None,
            timeout_secs: default_direct_timeout(),
            token: None,
        }
    }
}

fn default_api_url() -> String {
    "https://api.linear.app/graphql".into()
}

fn default_direct_token_env() -> String {
    "LINEAR_API_ACCESS_TOKEN".into()
}

fn default_direct_timeout() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Resolved per-transport settings
// ---------------------------------------------------------------------------

/// Endpoint and credentials for one transport, after every override has
/// been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSettings {
    pub endpoint: String,
    pub token: String,
    pub timeout_secs: u64,
    /// Only meaningful for the managed transport.
    pub tools: ToolNames,
}

impl TransportSettings {
    /// Check the endpoint is an http(s) URL and the token is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.endpoint).map_err(|e| ConfigError::InvalidValue {
            field: "endpoint".into(),
            detail: format!("'{}' is not a valid URL: {}", self.endpoint, e),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                field: "endpoint".into(),
                detail: format!("'{}' must use http or https", self.endpoint),
            });
        }
        if self.token.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "token".into(),
                detail: "token must not be empty".into(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "timeout_secs".into(),
                detail: "timeout must be > 0".into(),
            });
        }
        Ok(())
    }
}

/// Values supplied on the command line, which take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct CredentialOverrides {
    /// Token that works for either transport.
    pub token: Option<String>,
    /// File holding a token that works for either transport.
    pub token_path: Option<PathBuf>,
    pub server_url: Option<String>,
    pub api_url: Option<String>,
}

/// Resolves [`TransportSettings`] from an [`AppConfig`] plus CLI overrides.
pub struct SettingsResolver<'a> {
    config: &'a AppConfig,
    overrides: &'a CredentialOverrides,
}

impl SettingsSource for SettingsResolver<'_> {
    fn settings_for(&self, kind: BackendKind) -> Result<TransportSettings, ConfigError> {
        let token = self.resolve_token(kind)?;
        let settings = match kind {
            BackendKind::Managed => TransportSettings {
                endpoint: self
                    .overrides
                    .server_url
                    .clone()
                    .unwrap_or_else(|| self.config.managed.server_url.clone()),
                token,
                timeout_secs: self.config.managed.timeout_secs,
                tools: self.config.managed.tools.clone(),
            },
            BackendKind::Direct => TransportSettings {
                endpoint: self
                    .overrides
                    .api_url
                    .clone()
                    .unwrap_or_else(|| self.config.direct.api_url.clone()),
                token,
                timeout_secs: self.config.direct.timeout_secs,
                tools: ToolNames::default(),
            },
        };
        Ok(settings)
    }
}

impl SettingsResolver<'_> {
    /// Token precedence: CLI token, CLI token file, the transport's own env
    /// var and token file, then the other transport's.
    fn resolve_token(&self, kind: BackendKind) -> Result<String, ConfigError> {
        if let Some(token) = non_empty(self.overrides.token.as_deref()) {
            debug!(transport = %kind, "using token from command line");
            return Ok(token);
        }
        if let Some(path) = &self.overrides.token_path {
            return read_token_file(path);
        }
        let other = match kind {
            BackendKind::Managed => BackendKind::Direct,
            BackendKind::Direct => BackendKind::Managed,
        };
        if let Some(token) = self.config.section_token(kind)? {
            return Ok(token);
        }
        if let Some(token) = self.config.section_token(other)? {
            debug!(transport = %kind, from = %other, "falling back to the other transport's token");
            return Ok(token);
        }
        Err(ConfigError::MissingCredentials {
            transport: kind.to_string(),
            env_var: self.config.token_env(kind).to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Platform default location: `<config dir>/issuemaker/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("issuemaker").join("config.toml"))
    }

    /// Load from `path` if given, otherwise from the default location when a
    /// file exists there, otherwise fall back to built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::load_from_file(path),
                None => {
                    debug!("no configuration file, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    /// Resolve all `token_env` fields from environment variables.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");
        self.managed.token = resolve_optional_env(&self.managed.token_env, "managed.token_env");
        self.direct.token = resolve_optional_env(&self.direct.token_env, "direct.token_env");
        Ok(())
    }

    /// Validate that values are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_delimiter(&self.batch.delimiter).map_err(|e| ConfigError::InvalidValue {
            field: "batch.delimiter".into(),
            detail: e.to_string(),
        })?;
        for (field, url) in [
            ("managed.server_url", &self.managed.server_url),
            ("direct.api_url", &self.direct.api_url),
        ] {
            match reqwest::Url::parse(url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: field.into(),
                        detail: format!("'{}' is not an http(s) URL", url),
                    })
                }
            }
        }
        for (field, secs) in [
            ("managed.timeout_secs", self.managed.timeout_secs),
            ("direct.timeout_secs", self.direct.timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    detail: "timeout must be > 0".into(),
                });
            }
        }
        let tools = &self.managed.tools;
        for (field, name) in [
            ("managed.list_teams_tool", &tools.list_teams_tool),
            ("managed.list_projects_tool", &tools.list_projects_tool),
            ("managed.create_project_tool", &tools.create_project_tool),
            ("managed.create_issue_tool", &tools.create_issue_tool),
        ] {
            if name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    detail: "tool name must not be empty".into(),
                });
            }
        }
        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::load_or_default(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Combine with command-line overrides into a [`SettingsSource`].
    pub fn with_overrides<'a>(&'a self, overrides: &'a CredentialOverrides) -> SettingsResolver<'a> {
        SettingsResolver {
            config: self,
            overrides,
        }
    }

    /// The `token_env` variable name configured for a transport.
    pub fn token_env(&self, kind: BackendKind) -> &str {
        match kind {
            BackendKind::Managed => &self.managed.token_env,
            BackendKind::Direct => &self.direct.token_env,
        }
    }

    /// Token from the transport's env var, else from its token file.
    fn section_token(&self, kind: BackendKind) -> Result<Option<String>, ConfigError> {
        let (token, path) = match kind {
            BackendKind::Managed => (&self.managed.token, &self.managed.token_path),
            BackendKind::Direct => (&self.direct.token, &self.direct.token_path),
        };
        if let Some(token) = non_empty(token.as_deref()) {
            return Ok(Some(token));
        }
        match path {
            Some(path) => read_token_file(path).map(Some),
            None => Ok(None),
        }
    }

    /// Generate a default TOML config template string.
    pub fn default_template() -> &'static str {
        r#"# issuemaker configuration
# Tokens are read from the environment variables named below, or from
# token_path. --token / LINEAR_ACCESS_TOKEN override both.

[batch]
mode = "auto"                  # managed | direct | auto
create_missing_projects = true
continue_on_error = false
delimiter = ","
log_level = "warn"

[managed]
server_url = "https://mcp.linear.app/mcp"
token_env = "LINEAR_MCP_ACCESS_TOKEN"
# token_path = "~/.config/issuemaker/mcp-token"
timeout_secs = 60
list_teams_tool = "list_teams"
list_projects_tool = "list_projects"
create_project_tool = "create_project"
create_issue_tool = "create_issue"

[direct]
api_url = "https://api.linear.app/graphql"
token_env = "LINEAR_API_ACCESS_TOKEN"
# token_path = "~/.config/issuemaker/api-token"
timeout_secs = 30
"#
    }
}

/// Try to read an environment variable by name.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.trim().is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val.trim().to_string())
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            debug!(field, env_name, "env var not set");
            None
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Expand a leading `~/` to the home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

/// Read a token file, trimming surrounding whitespace.
fn read_token_file(path: &Path) -> Result<String, ConfigError> {
    let path = expand_tilde(path);
    let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::TokenFile {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;
    let token = contents.trim();
    if token.is_empty() {
        return Err(ConfigError::TokenFile {
            path: path.display().to_string(),
            detail: "file is empty".into(),
        });
    }
    debug!(path = %path.display(), "read token from file");
    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toml() -> &'static str {
        r#"
[batch]
mode = "api"
create_missing_projects = false
continue_on_error = true
delimiter = ";"
log_level = "debug"

[managed]
server_url = "https://mcp.example.com/mcp"
token_env = "TEST_CFG_MCP_TOKEN"
timeout_secs = 10
create_issue_tool = "issue_create"

[direct]
api_url = "https://api.example.com/graphql"
token_env = "TEST_CFG_API_TOKEN"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.batch.mode, TransportMode::Direct);
        assert!(!config.batch.create_missing_projects);
        assert!(config.batch.continue_on_error);
        assert_eq!(config.batch.delimiter, ";");
        assert_eq!(config.managed.timeout_secs, 10);
        assert_eq!(config.managed.tools.create_issue_tool, "issue_create");
        assert_eq!(config.managed.tools.list_teams_tool, "list_teams");
        assert_eq!(config.direct.timeout_secs, 30);
        config.validate().unwrap();
    }

    #[test]
    fn test_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.batch.mode, TransportMode::Auto);
        assert!(config.batch.create_missing_projects);
        assert!(!config.batch.continue_on_error);
        assert_eq!(config.batch.delimiter, ",");
        assert_eq!(config.managed.server_url, "https://mcp.linear.app/mcp");
        assert_eq!(config.direct.api_url, "https://api.linear.app/graphql");
        assert_eq!(config.managed.token_env, "LINEAR_MCP_ACCESS_TOKEN");
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, sample_toml()).unwrap();

        let config = AppConfig::load_from_file(&path).expect("load failed");
        assert_eq!(config.batch.log_level, "debug");
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/issuemaker.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_validate_rejects_bad_delimiter() {
        let mut config = AppConfig::default();
        config.batch.delimiter = "||".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "batch.delimiter"
        ));
    }

    #[test]
    fn test_validate_rejects_non_http_url() {
        let mut config = AppConfig::default();
        config.direct.api_url = "ftp://api.example.com".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "direct.api_url"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = AppConfig::default();
        config.managed.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("TEST_CFG_RESOLVE_MCP", "mcp-secret");
        let mut config = AppConfig::default();
        config.managed.token_env = "TEST_CFG_RESOLVE_MCP".into();
        config.direct.token_env = "TEST_CFG_RESOLVE_UNSET".into();
        config.resolve_env_vars().unwrap();

        assert_eq!(config.managed.token.as_deref(), Some("mcp-secret"));
        assert_eq!(config.direct.token, None);

        std::env::remove_var("TEST_CFG_RESOLVE_MCP");
    }

    #[test]
    fn test_cli_token_wins() {
        let mut config = AppConfig::default();
        config.managed.token = Some("from-env".into());
        let overrides = CredentialOverrides {
            token: Some("from-cli".into()),
            server_url: Some("https://mcp.internal/mcp".into()),
            ..Default::default()
        };
        let settings = config
            .with_overrides(&overrides)
            .settings_for(BackendKind::Managed)
            .unwrap();
        assert_eq!(settings.token, "from-cli");
        assert_eq!(settings.endpoint, "https://mcp.internal/mcp");
    }

    #[test]
    fn test_token_path_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "secret-token\n").unwrap();

        let config = AppConfig::default();
        let overrides = CredentialOverrides {
            token_path: Some(path),
            ..Default::default()
        };
        let settings = config
            .with_overrides(&overrides)
            .settings_for(BackendKind::Direct)
            .unwrap();
        assert_eq!(settings.token, "secret-token");
        assert_eq!(settings.endpoint, "https://api.linear.app/graphql");
    }

    #[test]
    fn test_section_token_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api-token");
        std::fs::write(&path, "  file-token  ").unwrap();

        let mut config = AppConfig::default();
        config.direct.token_path = Some(path);
        let overrides = CredentialOverrides::default();
        let settings = config
            .with_overrides(&overrides)
            .settings_for(BackendKind::Direct)
            .unwrap();
        assert_eq!(settings.token, "file-token");
    }

    #[test]
    fn test_falls_back_to_other_transport_token() {
        let mut config = AppConfig::default();
        config.managed.token = Some("mcp-token".into());
        let overrides = CredentialOverrides::default();
        let settings = config
            .with_overrides(&overrides)
            .settings_for(BackendKind::Direct)
            .unwrap();
        assert_eq!(settings.token, "mcp-token");
    }

    #[test]
    fn test_missing_credentials() {
        let config = AppConfig::default();
        let overrides = CredentialOverrides::default();
        let result = config
            .with_overrides(&overrides)
            .settings_for(BackendKind::Direct);
        assert!(matches!(
            result,
            Err(ConfigError::MissingCredentials { ref env_var, .. }) if env_var == "LINEAR_API_ACCESS_TOKEN"
        ));
    }

    #[test]
    fn test_missing_token_file() {
        let config = AppConfig::default();
        let overrides = CredentialOverrides {
            token_path: Some(PathBuf::from("/nonexistent/token")),
            ..Default::default()
        };
        let result = config
            .with_overrides(&overrides)
            .settings_for(BackendKind::Managed);
        assert!(matches!(result, Err(ConfigError::TokenFile { .. })));
    }

    #[test]
    fn test_transport_settings_validate() {
        let mut settings = TransportSettings {
            endpoint: "https://api.example.com/graphql".into(),
            token: "t".into(),
            timeout_secs: 5,
            tools: ToolNames::default(),
        };
        settings.validate().unwrap();

        settings.endpoint = "not a url".into();
        assert!(settings.validate().is_err());

        settings.endpoint = "https://api.example.com".into();
        settings.token = "  ".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_default_template_is_valid() {
        let config: AppConfig = toml::from_str(AppConfig::default_template())
            .expect("default template should be valid TOML");
        config.validate().unwrap();
    }
}
