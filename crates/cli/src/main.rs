//! issuemaker command-line tool.
//!
//! Creates Linear issues in bulk from a CSV file, either through Linear's
//! managed MCP server or the GraphQL API, and provides helpers for generating,
//! validating, and testing configuration.

mod check;
mod create;
mod style;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::Confirm;
use tracing_subscriber::EnvFilter;

use issuemaker_core::config::{AppConfig, CredentialOverrides, SHARED_TOKEN_ENV};
use issuemaker_core::transport::selector::SettingsSource;
use issuemaker_core::{BackendKind, TransportMode};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Create Linear issues in bulk from CSV.
#[derive(Parser, Debug)]
#[command(
    name = "issuemaker",
    version,
    about = "Create Linear issues in bulk from a CSV file"
)]
struct Cli {
    /// Path to the TOML configuration file (defaults to the user config dir).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create one issue per CSV row.
    Create(CreateArgs),

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a configuration file and report available credentials.
    Validate,

    /// Connect with the configured credentials and list visible teams.
    Check(TransportArgs),
}

/// Transport selection and credential overrides.
#[derive(Args, Debug, Clone, Default)]
pub struct TransportArgs {
    /// Transport to use: managed (mcp), direct (api), or auto.
    #[arg(long)]
    pub mode: Option<TransportMode>,

    /// Override the managed MCP server URL.
    #[arg(long, env = "LINEAR_MCP_SERVER_URL")]
    pub server_url: Option<String>,

    /// Override the GraphQL API URL.
    #[arg(long, env = "LINEAR_API_URL")]
    pub api_url: Option<String>,

    /// Access token used by either transport.
    #[arg(long, env = SHARED_TOKEN_ENV, hide_env_values = true)]
    pub token: Option<String>,

    /// File containing an access token.
    #[arg(long, env = "LINEAR_TOKEN_PATH")]
    pub token_path: Option<PathBuf>,
}

impl TransportArgs {
    pub fn overrides(&self) -> CredentialOverrides {
        CredentialOverrides {
            token: self.token.clone(),
            token_path: self.token_path.clone(),
            server_url: self.server_url.clone(),
            api_url: self.api_url.clone(),
        }
    }
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// CSV file with team, project, title, and summary columns (stdin if omitted).
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// CSV field delimiter (a single character, or `tab`).
    #[arg(long)]
    pub delimiter: Option<String>,

    /// Parse and show what would be created without calling Linear.
    #[arg(long)]
    pub dry_run: bool,

    /// Create projects that do not exist yet.
    #[arg(long, overrides_with = "no_create_missing_projects")]
    pub create_missing_projects: bool,

    /// Fail rows whose project does not exist instead of creating it.
    #[arg(long, overrides_with = "create_missing_projects")]
    pub no_create_missing_projects: bool,

    /// Keep going after a failed row.
    #[arg(long)]
    pub continue_on_error: bool,

    /// Disable the connection spinner.
    #[arg(long)]
    pub no_progress: bool,

    #[command(flatten)]
    pub transport: TransportArgs,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.config.as_deref(), cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Install the stderr subscriber. `RUST_LOG` wins; otherwise `-v` flags
/// raise the configured level.
fn init_tracing(config_path: Option<&Path>, verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let configured = AppConfig::load_or_default(config_path)
            .map(|c| c.batch.log_level)
            .unwrap_or_else(|_| "warn".into());
        EnvFilter::new(log_level(&configured, verbose))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn log_level(configured: &str, verbose: u8) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "info".into(),
        2 => "debug".into(),
        _ => "trace".into(),
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Create(args) => create::cmd_create(config, args).await,
        Commands::Init { output } => cmd_init(output).map(|_| ExitCode::SUCCESS),
        Commands::Validate => cmd_validate(config).map(|_| ExitCode::SUCCESS),
        Commands::Check(args) => check::cmd_check(config, args)
            .await
            .map(|_| ExitCode::SUCCESS),
    }
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: Option<PathBuf>) -> Result<()> {
    let output = output
        .or_else(AppConfig::default_path)
        .unwrap_or_else(|| PathBuf::from("issuemaker.toml"));

    if output.exists() {
        if !std::io::stdin().is_terminal() {
            anyhow::bail!(
                "file already exists: {}. Use a different path or remove the existing file.",
                output.display()
            );
        }
        let overwrite = Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", output.display()))
            .default(false)
            .interact()
            .context("failed to read confirmation")?;
        if !overwrite {
            println!(
                "{}",
                style::warn("Init cancelled. Existing file was not modified.")
            );
            return Ok(());
        }
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(&output, AppConfig::default_template())
        .context("failed to write config file")?;

    println!(
        "{}",
        style::success(&format!("Default configuration written to {}", output.display()))
    );
    println!();
    println!("Next steps:");
    println!("  1. Set LINEAR_MCP_ACCESS_TOKEN and/or LINEAR_API_ACCESS_TOKEN (or {})", SHARED_TOKEN_ENV);
    println!(
        "  2. Validate with: issuemaker validate --config {}",
        output.display()
    );
    println!(
        "  3. Test the connection: issuemaker check --config {}",
        output.display()
    );
    println!("  4. Preview a batch: issuemaker create --input issues.csv --dry-run");

    Ok(())
}

fn cmd_validate(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => AppConfig::default_path()
            .filter(|p| p.exists())
            .context("no configuration file given and none found in the default location")?,
    };
    println!("Validating configuration: {}", path.display());
    println!();

    let mut config = AppConfig::load_from_file(&path).context("failed to parse configuration")?;
    println!("  {}", style::success("TOML structure is valid"));

    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    println!("  {}", style::success("Environment variable references processed"));

    if let Err(e) = config.validate() {
        println!("  {}", style::error(&format!("Validation error: {}", e)));
        anyhow::bail!("configuration validation failed");
    }
    println!("  {}", style::success("All values are valid"));

    println!();
    println!("{}", style::header("Configuration summary:"));
    println!("  Mode              : {}", config.batch.mode);
    println!("  Create projects   : {}", config.batch.create_missing_projects);
    println!("  Continue on error : {}", config.batch.continue_on_error);
    println!("  MCP server        : {}", config.managed.server_url);
    println!("  GraphQL API       : {}", config.direct.api_url);

    let overrides = CredentialOverrides {
        token: std::env::var(SHARED_TOKEN_ENV).ok(),
        ..Default::default()
    };
    let settings = config.with_overrides(&overrides);
    for kind in [BackendKind::Managed, BackendKind::Direct] {
        let status = match settings.settings_for(kind) {
            Ok(_) => style::success("token available"),
            Err(e) => style::warn(&e.to_string()),
        };
        println!("  {:<17} : {}", format!("{} token", kind), status);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_create_flags() {
        let cli = Cli::try_parse_from([
            "issuemaker",
            "-vv",
            "create",
            "--input",
            "issues.csv",
            "--mode",
            "api",
            "--no-create-missing-projects",
            "--continue-on-error",
            "--token",
            "lin_api_x",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Create(args) => {
                assert_eq!(args.input, Some(PathBuf::from("issues.csv")));
                assert_eq!(args.transport.mode, Some(TransportMode::Direct));
                assert!(args.no_create_missing_projects);
                assert!(args.continue_on_error);
                assert_eq!(args.transport.token.as_deref(), Some("lin_api_x"));
            }
            other => panic!("expected create, got {:?}", other),
        }
    }

    #[test]
    fn test_transport_overrides_read_environment() {
        let cmd = Cli::command();
        let check = cmd.find_subcommand("check").unwrap();
        let env_of = |id: &str| {
            check
                .get_arguments()
                .find(|a| a.get_id() == id)
                .and_then(|a| a.get_env())
                .map(|e| e.to_string_lossy().into_owned())
        };
        assert_eq!(env_of("server_url").as_deref(), Some("LINEAR_MCP_SERVER_URL"));
        assert_eq!(env_of("api_url").as_deref(), Some("LINEAR_API_URL"));
        assert_eq!(env_of("token_path").as_deref(), Some("LINEAR_TOKEN_PATH"));
        assert_eq!(env_of("token").as_deref(), Some(SHARED_TOKEN_ENV));
    }

    #[test]
    fn test_parse_rejects_unknown_mode() {
        let result = Cli::try_parse_from(["issuemaker", "check", "--mode", "graphql"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_log_level() {
        assert_eq!(log_level("warn", 0), "warn");
        assert_eq!(log_level("warn", 1), "info");
        assert_eq!(log_level("error", 2), "debug");
        assert_eq!(log_level("warn", 5), "trace");
    }

    #[test]
    fn test_init_writes_template_and_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        cmd_init(Some(path.clone())).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[managed]"));
        let parsed: AppConfig = toml_roundtrip(&written);
        assert_eq!(parsed.batch.mode, TransportMode::Auto);

        // Tests never run with an interactive stdin.
        if !std::io::stdin().is_terminal() {
            assert!(cmd_init(Some(path)).is_err());
        }
    }

    fn toml_roundtrip(text: &str) -> AppConfig {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, text).unwrap();
        AppConfig::load_from_file(&path).unwrap()
    }

    #[test]
    fn test_validate_reports_bad_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[direct]\napi_url = \"not a url\"\n").unwrap();
        assert!(cmd_validate(Some(&path)).is_err());

        std::fs::write(&path, AppConfig::default_template()).unwrap();
        cmd_validate(Some(&path)).unwrap();
    }
}
