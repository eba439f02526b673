use super::archive::save_raw_batch;
use super::normalize::ReportNormalizer;
use crate::common::error::{EtlError, Result};
use crate::common::types::ReportSource;
use crate::observability::{metrics, push_all_metrics};
use crate::storage::{PutOutcome, ReportSink};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// What happened to one record of the batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    Duplicate,
    /// Refused by the sink as structurally invalid
    Rejected(String),
    /// Write error
    Failed(String),
}

impl RecordOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RecordOutcome::Inserted => "inserted",
            RecordOutcome::Duplicate => "duplicate",
            RecordOutcome::Rejected(_) => "rejected",
            RecordOutcome::Failed(_) => "failed",
        }
    }
}

impl From<PutOutcome> for RecordOutcome {
    fn from(outcome: PutOutcome) -> Self {
        match outcome {
            PutOutcome::Inserted => RecordOutcome::Inserted,
            PutOutcome::Duplicate => RecordOutcome::Duplicate,
            PutOutcome::Rejected(reason) => RecordOutcome::Rejected(reason),
        }
    }
}

/// Result of a complete pipeline run.
///
/// `attempted == loaded + duplicates + failed` holds at every point,
/// including inside a [`EtlError::RunAborted`].
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub query: String,
    pub attempted: usize,
    pub loaded: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl RunSummary {
    pub fn new(query: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            query: query.to_string(),
            attempted: 0,
            loaded: 0,
            duplicates: 0,
            failed: 0,
            errors: Vec::new(),
        }
    }

    /// Fold one record's outcome into the counts. `key` names the record in
    /// error messages.
    pub fn record(&mut self, key: &str, outcome: &RecordOutcome) {
        self.attempted += 1;
        match outcome {
            RecordOutcome::Inserted => self.loaded += 1,
            RecordOutcome::Duplicate => self.duplicates += 1,
            RecordOutcome::Rejected(reason) | RecordOutcome::Failed(reason) => {
                self.failed += 1;
                self.errors.push(format!("{key}: {reason}"));
            }
        }
    }

    pub fn is_balanced(&self) -> bool {
        self.attempted == self.loaded + self.duplicates + self.failed
    }
}

/// One ETL run over an injected source and sink.
///
/// The pipeline never opens or closes the sink itself; callers hold a
/// [`crate::storage::StoreLease`] for the duration of the run.
pub struct Pipeline<'a> {
    source: &'a dyn ReportSource,
    sink: &'a dyn ReportSink,
    normalizer: ReportNormalizer,
    raw_archive: Option<PathBuf>,
}

impl<'a> Pipeline<'a> {
    pub fn new(source: &'a dyn ReportSource, sink: &'a dyn ReportSink) -> Self {
        Self {
            source,
            sink,
            normalizer: ReportNormalizer::new(source.source_name()),
            raw_archive: None,
        }
    }

    pub fn with_normalizer(mut self, normalizer: ReportNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Copy every fetched batch into `dir` before normalizing it
    pub fn with_raw_archive(mut self, dir: Option<PathBuf>) -> Self {
        self.raw_archive = dir;
        self
    }

    /// Fetch up to `limit` records for `query`, normalize and persist each.
    ///
    /// A source failure aborts before anything is written. A fatal store
    /// failure stops the remaining writes and comes back as
    /// [`EtlError::RunAborted`] carrying the counts so far. Everything else is
    /// counted per record and the run carries on.
    #[instrument(skip(self), fields(source = %self.source.source_name(), sink = %self.sink.describe()))]
    pub async fn run(&self, query: &str, limit: i64) -> Result<RunSummary> {
        let source_name = self.source.source_name();
        info!("Starting pipeline run for query {}", query);
        metrics::pipeline::run_started();
        let started = Instant::now();

        let raw_records = match self.source.search(query, limit).await {
            Ok(records) => records,
            Err(e) => {
                error!("Fetch failed, aborting run: {}", e);
                metrics::pipeline::run_aborted();
                push_all_metrics(source_name).await;
                return Err(e);
            }
        };
        info!("Fetched {} raw records", raw_records.len());

        if let Some(dir) = &self.raw_archive {
            match save_raw_batch(dir, source_name, &raw_records) {
                Ok(path) => info!("Archived raw batch to {}", path.display()),
                Err(e) => warn!("Failed to archive raw batch: {:#}", e),
            }
        }

        let mut summary = RunSummary::new(query);
        for (i, raw) in raw_records.iter().enumerate() {
            let report = self.normalizer.normalize(raw);
            let key = match report.known_id() {
                Some(id) => format!("report {id}"),
                None => format!("record #{i}"),
            };

            let outcome = match self.sink.put(&report).await {
                Ok(outcome) => RecordOutcome::from(outcome),
                Err(e) if e.is_fatal() => {
                    error!("Store failure on {}, aborting remaining writes: {}", key, e);
                    let outcome = RecordOutcome::Failed(e.to_string());
                    metrics::pipeline::record_outcome(outcome.label());
                    summary.record(&key, &outcome);
                    metrics::pipeline::run_aborted();
                    metrics::pipeline::run_duration(started.elapsed().as_secs_f64());
                    push_all_metrics(source_name).await;
                    return Err(EtlError::RunAborted {
                        reason: Box::new(e),
                        summary,
                    });
                }
                Err(e) => RecordOutcome::Failed(e.to_string()),
            };

            if let RecordOutcome::Rejected(reason) | RecordOutcome::Failed(reason) = &outcome {
                warn!("Failed to load {}: {}", key, reason);
            }
            metrics::pipeline::record_outcome(outcome.label());
            summary.record(&key, &outcome);
        }

        info!(
            "Run {} finished: {} attempted, {} loaded, {} duplicates, {} failed",
            summary.run_id, summary.attempted, summary.loaded, summary.duplicates, summary.failed
        );
        metrics::pipeline::run_duration(started.elapsed().as_secs_f64());
        push_all_metrics(source_name).await;

        Ok(summary)
    }
}
