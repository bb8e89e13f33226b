//! Batch orchestration.
//!
//! Drives a list of records through resolution and issue creation, strictly
//! in input order and one record at a time. Failures become [`Outcome`]s; the
//! batch itself only fails when the transport cannot be opened.

use tracing::{debug, info, warn};

use crate::errors::{ErrorKind, IssueCreationError, TransportError};
use crate::models::{BatchReport, IssueRecord, IssueRequest, Note, Outcome};
use crate::resolver::Resolver;
use crate::transport::Transport;

/// Knobs for a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Create a project the first time a record names one that does not exist.
    pub create_missing_projects: bool,
    /// Keep going after a failed record instead of stopping.
    pub continue_on_error: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            create_missing_projects: true,
            continue_on_error: false,
        }
    }
}

/// Progress hooks, called synchronously between network calls.
pub trait BatchObserver {
    fn on_record_started(&mut self, _position: usize, _total: usize, _record: &IssueRecord) {}

    fn on_record_finished(&mut self, _outcome: &Outcome) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

/// Runs records against an already-open transport.
pub struct BatchOrchestrator<'t, T: Transport + ?Sized> {
    transport: &'t T,
    resolver: Resolver<'t, T>,
    options: BatchOptions,
}

impl<'t, T: Transport + ?Sized> BatchOrchestrator<'t, T> {
    pub fn new(transport: &'t T, options: BatchOptions) -> Self {
        Self {
            transport,
            resolver: Resolver::new(transport),
            options,
        }
    }

    /// Process `records` in order and return one outcome per attempted record.
    ///
    /// With `continue_on_error` off, the first failure is the last outcome.
    pub async fn run(
        &mut self,
        records: &[IssueRecord],
        observer: &mut dyn BatchObserver,
    ) -> Vec<Outcome> {
        let total = records.len();
        let mut outcomes = Vec::with_capacity(total);

        for record in records {
            observer.on_record_started(record.position, total, record);
            let outcome = self.process(record).await;
            observer.on_record_finished(&outcome);

            let failed = !outcome.is_success();
            outcomes.push(outcome);
            if failed && !self.options.continue_on_error {
                info!(
                    position = record.position,
                    remaining = total.saturating_sub(outcomes.len()),
                    "stopping batch after failure"
                );
                break;
            }
        }

        outcomes
    }

    async fn process(&mut self, record: &IssueRecord) -> Outcome {
        debug!(position = record.position, title = %record.title, "processing record");

        let resolution = match self
            .resolver
            .resolve(
                &record.team,
                &record.project,
                self.options.create_missing_projects,
            )
            .await
        {
            Ok(resolution) => resolution,
            Err(e) => {
                warn!(position = record.position, error = %e, "could not resolve record");
                return failure(record, e.kind(), e.to_string());
            }
        };

        let mut notes = Vec::new();
        if resolution.project_created {
            notes.push(Note::ProjectCreated {
                project: record.project.trim().to_string(),
            });
        }

        let mut ids = resolution.ids;
        if let Some(name) = record.template_name() {
            ids.template_id = self
                .resolver
                .resolve_template_or_none(&ids.team_id, name)
                .await;
            if ids.template_id.is_none() {
                notes.push(Note::TemplateNotFound {
                    template: name.to_string(),
                });
            }
        }

        let request = IssueRequest {
            team_id: &ids.team_id,
            project_id: &ids.project_id,
            title: &record.title,
            body: &record.body,
            template_id: ids.template_id.as_deref(),
        };

        match self.transport.create_issue(&request).await {
            Ok(issue) => Outcome::Success {
                position: record.position,
                title: record.title.clone(),
                issue,
                notes,
            },
            Err(e) => {
                warn!(position = record.position, error = %e, "issue creation failed");
                let message = match &e {
                    IssueCreationError::Rejected(message) => message.clone(),
                    IssueCreationError::Transport(inner) => inner.to_string(),
                };
                failure(record, e.kind(), message)
            }
        }
    }
}

fn failure(record: &IssueRecord, kind: ErrorKind, message: String) -> Outcome {
    Outcome::Failure {
        position: record.position,
        title: record.title.clone(),
        kind,
        message,
    }
}

/// Open `transport`, run the batch, and close it again.
///
/// The transport is closed whatever the records' fate; a close failure is
/// logged and does not discard the outcomes.
pub async fn execute<T: Transport + ?Sized>(
    transport: &mut T,
    records: &[IssueRecord],
    options: BatchOptions,
    observer: &mut dyn BatchObserver,
) -> Result<BatchReport, TransportError> {
    transport.open().await?;
    info!(transport = transport.name(), records = records.len(), "starting batch");

    let outcomes = {
        let mut orchestrator = BatchOrchestrator::new(&*transport, options);
        orchestrator.run(records, observer).await
    };

    if let Err(e) = transport.close().await {
        warn!(error = %e, "failed to close transport cleanly");
    }

    let report = BatchReport::new(transport.name(), outcomes, records.len());
    info!(
        succeeded = report.summary.succeeded,
        failed = report.summary.failed,
        total = report.summary.total,
        "batch finished"
    );
    Ok(report)
}
