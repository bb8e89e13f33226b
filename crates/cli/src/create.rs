//! The `create` subcommand: read records, pick a transport, create issues.

use std::io::Read;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use indicatif::ProgressBar;

use issuemaker_core::config::AppConfig;
use issuemaker_core::models::{BatchReport, IssueRecord, Note, Outcome};
use issuemaker_core::parser::{parse_delimiter, parse_records};
use issuemaker_core::transport::{select, select_kind};
use issuemaker_core::{
    execute, BackendKind, BatchObserver, BatchOptions, Transport, TransportMode,
};

use crate::style;
use crate::CreateArgs;

/// Body previews in dry-run output are cut to this many characters.
const PREVIEW_CHARS: usize = 100;

pub async fn cmd_create(config_path: Option<&Path>, args: CreateArgs) -> Result<ExitCode> {
    let config = AppConfig::load_and_resolve(config_path).context("failed to load configuration")?;

    let delimiter = parse_delimiter(args.delimiter.as_deref().unwrap_or(&config.batch.delimiter))
        .context("invalid --delimiter")?;
    let text = read_input(args.input.as_deref())?;
    let records = parse_records(&text, delimiter).context("failed to parse input")?;

    let (mode, auto_detected) = resolve_mode(args.transport.mode, config.batch.mode);
    let options = BatchOptions {
        create_missing_projects: resolve_create_flag(&args, config.batch.create_missing_projects),
        continue_on_error: args.continue_on_error || config.batch.continue_on_error,
    };

    if args.dry_run {
        print_dry_run(&records, mode, auto_detected);
        return Ok(ExitCode::SUCCESS);
    }

    let overrides = args.transport.overrides();
    let mut backend = select(&records, mode, &config.with_overrides(&overrides))
        .context("failed to set up transport")?;
    let kind = backend.kind();

    println!("Using {}", transport_label(kind, auto_detected));
    if !kind.supports_templates() && records.iter().any(|r| r.template_name().is_some()) {
        println!(
            "{}",
            style::warn("templates are not supported by the managed transport and will be ignored")
        );
    }
    println!("Creating {} issue(s)...", records.len());
    println!();

    let mut printer = ProgressPrinter::new(!args.no_progress, backend.name());
    let result = execute(&mut backend, &records, options, &mut printer).await;
    printer.finish();
    let report = result.with_context(|| format!("failed to open the {} transport", kind))?;

    print_summary(&report);
    Ok(if report.summary.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// The effective mode and whether the backend will be picked automatically.
/// An explicit `--mode` overrides the configured mode.
fn resolve_mode(requested: Option<TransportMode>, configured: TransportMode) -> (TransportMode, bool) {
    let mode = requested.unwrap_or(configured);
    (mode, mode == TransportMode::Auto)
}

fn transport_label(kind: BackendKind, auto_detected: bool) -> String {
    format!(
        "{} transport{}",
        style::transport(kind.as_str()),
        if auto_detected {
            style::dim(" (auto-detected)")
        } else {
            String::new()
        }
    )
}

fn resolve_create_flag(args: &CreateArgs, configured: bool) -> bool {
    if args.no_create_missing_projects {
        false
    } else if args.create_missing_projects {
        true
    } else {
        configured
    }
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read standard input")?;
            Ok(text)
        }
    }
}

fn print_dry_run(records: &[IssueRecord], mode: TransportMode, auto_detected: bool) {
    let kind = select_kind(records, mode);
    println!("{}", style::header("Dry run: no issues will be created"));
    println!("Transport: {}", transport_label(kind, auto_detected));
    println!("Records: {}", records.len());
    println!();

    for record in records {
        println!("{}. {}", record.position, style::header(&record.title));
        println!("   Team: {}", record.team);
        println!("   Project: {}", record.project);
        if let Some(template) = record.template_name() {
            println!("   Template: {}", template);
        }
        println!(
            "   Summary: {}",
            style::dim(&style::truncate(&record.body, PREVIEW_CHARS))
        );
        println!();
    }
}

// ---------------------------------------------------------------------------
// Progress output
// ---------------------------------------------------------------------------

/// Prints one line per record as the batch runs.
///
/// A spinner covers the connection phase and is cleared as soon as the first
/// record starts.
struct ProgressPrinter {
    spinner: Option<ProgressBar>,
}

impl ProgressPrinter {
    fn new(show_spinner: bool, transport: &str) -> Self {
        let spinner =
            show_spinner.then(|| style::spinner(format!("Connecting ({} transport)...", transport)));
        Self { spinner }
    }

    fn finish(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

impl BatchObserver for ProgressPrinter {
    fn on_record_started(&mut self, position: usize, total: usize, record: &IssueRecord) {
        self.finish();
        println!("[{}/{}] Creating: {}", position, total, record.title);
    }

    fn on_record_finished(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Success { issue, notes, .. } => {
                for note in notes {
                    match note {
                        Note::ProjectCreated { .. } => {
                            println!("  {}", style::note(&capitalize(&note.to_string())))
                        }
                        Note::TemplateNotFound { .. } => {
                            println!("  {}", style::warn(&capitalize(&note.to_string())))
                        }
                    }
                }
                let created = match &issue.url {
                    Some(url) => format!("Created {} {}", issue.display_id(), style::dim(url)),
                    None => format!("Created {}", issue.display_id()),
                };
                println!("  {}", style::success(&created));
            }
            Outcome::Failure { kind, message, .. } => {
                println!("  {}", style::error(&format!("Failed ({}): {}", kind, message)));
            }
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn print_summary(report: &BatchReport) {
    let summary = &report.summary;
    println!();
    println!("{}", style::header("Summary"));
    println!("  Created: {}", summary.succeeded);
    println!("  Failed : {}", summary.failed);
    let skipped = summary
        .total
        .saturating_sub(summary.succeeded + summary.failed);
    if skipped > 0 {
        println!("  Skipped: {}", skipped);
    }

    let failures: Vec<&Outcome> = report.outcomes.iter().filter(|o| !o.is_success()).collect();
    if !failures.is_empty() {
        println!();
        println!("{}", style::header("Failures"));
        for outcome in failures {
            if let Outcome::Failure {
                position,
                title,
                message,
                ..
            } = outcome
            {
                println!("  Row {}: {}", position, title);
                println!("    {}", style::dim(message));
            }
        }
    }

    if summary.succeeded > 0 {
        println!();
        println!("{}", style::header("Created issues"));
        for outcome in &report.outcomes {
            if let Outcome::Success { title, issue, .. } = outcome {
                match &issue.url {
                    Some(url) => println!("  {}: {} ({})", issue.display_id(), title, url),
                    None => println!("  {}: {}", issue.display_id(), title),
                }
            }
        }
    }

    if skipped > 0 {
        println!();
        println!(
            "{}",
            style::warn("stopped at the first failure; rerun with --continue-on-error to process every row")
        );
    }
}
