//! The `check` subcommand: a connection test that lists the teams visible to
//! the configured credentials.

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use issuemaker_core::config::AppConfig;
use issuemaker_core::models::Team;
use issuemaker_core::transport::select;
use issuemaker_core::Transport;

use crate::style;
use crate::TransportArgs;

pub async fn cmd_check(config_path: Option<&Path>, args: TransportArgs) -> Result<()> {
    let config = AppConfig::load_and_resolve(config_path).context("failed to load configuration")?;
    let mode = args.mode.unwrap_or(config.batch.mode);
    let overrides = args.overrides();

    // No records, so auto mode resolves to the managed transport.
    let mut backend = select(&[], mode, &config.with_overrides(&overrides))
        .context("failed to set up transport")?;
    let kind = backend.kind();

    let spinner = style::spinner(format!("Connecting ({} transport)...", kind));
    if let Err(e) = backend.open().await {
        spinner.finish_and_clear();
        println!("{}", style::error(&format!("Could not connect using the {} transport", kind)));
        return Err(e).context("connection failed");
    }
    spinner.set_message("Listing teams...");
    let teams = backend.list_teams().await;
    spinner.finish_and_clear();

    if let Err(e) = backend.close().await {
        tracing::warn!(error = %e, "failed to close transport cleanly");
    }
    let teams = teams.context("failed to list teams")?;

    println!(
        "{}",
        style::success(&format!(
            "Connected using the {} transport",
            style::transport(kind.as_str())
        ))
    );
    println!();

    if teams.is_empty() {
        println!("{}", style::warn("No teams are visible to this token."));
        return Ok(());
    }

    println!("{}", style::header(&format!("Teams ({})", teams.len())));
    println!("{}", teams_table(&teams));
    Ok(())
}

fn teams_table(teams: &[Team]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Name", "Key", "ID"]);

    let mut sorted: Vec<&Team> = teams.iter().collect();
    sorted.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

    for team in sorted {
        table.add_row(vec![
            Cell::new(&team.name),
            Cell::new(team.key.as_deref().unwrap_or("—")),
            Cell::new(&team.id),
        ]);
    }
    table
}
