//! Export pipeline orchestration
//!
//! One run flows through four stages: resolve the dataset snapshot and the
//! column plan, stream pages into the tabular sinks, derive the geographic
//! formats from the staged CSV, then publish every produced file as a
//! metadata attachment.
//!
//! Each sink gets its own worker task behind a bounded channel. Records are
//! sent to every sink in turn before the next one is normalized, so the
//! fastest sink never runs more than the channel capacity plus one record
//! ahead of the slowest; memory stays flat regardless of dataset size.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::api::types::Dataset;
use crate::api::{endpoints, DatasetClient};
use crate::config::{OutputFormat, ProcessingConfig};
use crate::error::{ExportError, Result};
use crate::fetch::{PageStream, PAGE_SIZE};
use crate::geo::{GeoFailure, GeoStage, ToolChain};
use crate::model::Record;
use crate::normalize::Normalizer;
use crate::progress::{LogReporter, ProgressReporter};
use crate::publish::Publisher;
use crate::schema::ColumnPlan;
use crate::sink::{build_sinks, RecordSink, SinkReport};

/// Records buffered per sink channel
const SINK_CHANNEL_CAPACITY: usize = 1;

/// One produced output file
#[derive(Debug, Clone)]
pub struct ProducedFile {
    pub format: OutputFormat,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Summary of one finished run
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    /// Lines fetched from the dataset
    pub lines: u64,
    /// Produced files in requested-format order
    pub files: Vec<ProducedFile>,
    /// Files actually registered as attachments
    pub published: u32,
    /// Geographic formats that could not be derived
    pub geo_failures: Vec<GeoFailure>,
    pub cancelled: bool,
}

impl RunReport {
    /// The run finished, but not everything that was asked for exists
    pub fn is_partial(&self) -> bool {
        self.cancelled || !self.geo_failures.is_empty()
    }
}

// ============================================================================
// Sink fan-out
// ============================================================================

/// One worker task per sink, all fed from bounded channels
pub(crate) struct SinkPool {
    senders: Vec<mpsc::Sender<Arc<Record>>>,
    handles: Vec<(OutputFormat, JoinHandle<Result<SinkReport>>)>,
}

impl SinkPool {
    pub(crate) fn spawn(sinks: Vec<Box<dyn RecordSink>>) -> Self {
        let mut senders = Vec::with_capacity(sinks.len());
        let mut handles = Vec::with_capacity(sinks.len());
        for mut sink in sinks {
            let format = sink.format();
            let (tx, mut rx) = mpsc::channel::<Arc<Record>>(SINK_CHANNEL_CAPACITY);
            let handle = tokio::spawn(async move {
                while let Some(record) = rx.recv().await {
                    sink.write(&record)?;
                }
                sink.finish()
            });
            senders.push(tx);
            handles.push((format, handle));
        }
        Self { senders, handles }
    }

    /// Send one record to every sink in turn
    ///
    /// Returns false when a worker has died; its error is surfaced by
    /// `finish`, the producer should just stop feeding.
    pub(crate) async fn broadcast(&self, record: Record) -> bool {
        let record = Arc::new(record);
        for tx in &self.senders {
            if tx.send(record.clone()).await.is_err() {
                return false;
            }
        }
        true
    }

    /// Close the channels and join every worker
    ///
    /// This is the tabular barrier: it returns only when every sink has
    /// flushed and closed its file. All reports are collected even when
    /// some workers failed; the first failure is returned alongside.
    pub(crate) async fn finish(self) -> (Vec<SinkReport>, Option<ExportError>) {
        drop(self.senders);
        let mut reports = Vec::with_capacity(self.handles.len());
        let mut first_error = None;
        for (format, handle) in self.handles {
            match handle.await {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(err)) => {
                    error!(%format, error = %err, "sink worker failed");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                },
                Err(join_err) => {
                    error!(%format, error = %join_err, "sink worker panicked");
                    if first_error.is_none() {
                        first_error = Some(ExportError::sink(
                            format.to_string(),
                            format!("worker panicked: {join_err}"),
                        ));
                    }
                },
            }
        }
        (reports, first_error)
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// A configured export run, ready to execute
pub struct ExportPipeline {
    config: ProcessingConfig,
    client: DatasetClient,
    dir: PathBuf,
    cancel: CancellationToken,
    tools: ToolChain,
    reporter: Arc<dyn ProgressReporter>,
}

impl ExportPipeline {
    pub fn new(
        config: ProcessingConfig,
        client: DatasetClient,
        dir: impl Into<PathBuf>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            client,
            dir: dir.into(),
            cancel,
            tools: ToolChain::from_env(),
            reporter: Arc::new(LogReporter),
        }
    }

    /// Override the conversion tool binaries
    pub fn with_tools(mut self, tools: ToolChain) -> Self {
        self.tools = tools;
        self
    }

    /// Attach a progress reporter (the CLI's bars, for instance)
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Execute the whole run
    ///
    /// Geographic failures do not abort the run; they are carried in the
    /// report so the caller can warn about them. Fetch, sink and upload
    /// failures do.
    pub async fn run(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        info!(%run_id, dataset = %self.config.dataset.href, "starting export run");

        self.config.validate()?;
        tokio::fs::create_dir_all(&self.dir).await?;

        self.reporter.stage("resolving dataset");
        let dataset = self.client.get_dataset(&self.config.dataset.href).await?;
        let plan = ColumnPlan::resolve(&self.config, &dataset)?;
        info!(
            columns = plan.columns.len(),
            geometry = plan.geometry.is_some(),
            "column plan resolved"
        );

        self.reporter.stage("fetching lines");
        let (reports, lines) = self.tabular_phase(&plan).await?;

        let (geo_files, geo_failures) = self.geo_phase(&dataset, &plan, &reports).await;
        let files = self.collect_files(&reports, &geo_files).await;

        self.reporter.stage("publishing attachments");
        let mut publisher = Publisher::new(
            &self.client,
            &self.config.dataset.href,
            &self.config.label,
            dataset.attachments.clone(),
            self.cancel.clone(),
        );
        let mut published = 0;
        for file in &files {
            if publisher.publish(&file.path).await? {
                published += 1;
            }
        }

        let report = RunReport {
            run_id,
            started_at,
            duration: start.elapsed(),
            lines,
            files,
            published,
            geo_failures,
            cancelled: self.cancel.is_cancelled(),
        };
        info!(
            %run_id,
            lines = report.lines,
            files = report.files.len(),
            published = report.published,
            geo_failures = report.geo_failures.len(),
            cancelled = report.cancelled,
            duration_ms = report.duration.as_millis() as u64,
            "export run finished"
        );
        Ok(report)
    }

    /// Stream every page through the sink workers, then hit the barrier
    async fn tabular_phase(&self, plan: &ColumnPlan) -> Result<(Vec<SinkReport>, u64)> {
        let sinks = build_sinks(&self.config, plan, &self.dir)?;
        let pool = SinkPool::spawn(sinks);

        let normalizer = Normalizer::new(plan, self.config.wants_wkt());
        let first_url = endpoints::lines_url(
            &self.config.dataset.href,
            PAGE_SIZE,
            &plan.select_param(),
            self.config.filter_expression().as_deref(),
        );
        let mut pages = PageStream::new(self.client.clone(), first_url, self.cancel.clone());

        let mut fetch_error = None;
        'fetch: loop {
            match pages.next_page().await {
                Ok(Some(page)) => {
                    for raw in page.results {
                        if !pool.broadcast(normalizer.normalize(raw)).await {
                            break 'fetch;
                        }
                    }
                    let (fetched, total) = pages.progress();
                    self.reporter.lines_fetched(fetched, total);
                },
                Ok(None) => break,
                Err(err) => {
                    fetch_error = Some(err);
                    break;
                },
            }
        }
        let (lines, _) = pages.progress();

        let (reports, sink_error) = pool.finish().await;
        if let Some(err) = fetch_error {
            return Err(err);
        }
        if let Some(err) = sink_error {
            return Err(err);
        }
        Ok((reports, lines))
    }

    /// Derive the geographic formats, unless cancelled or not requested
    async fn geo_phase(
        &self,
        dataset: &Dataset,
        plan: &ColumnPlan,
        reports: &[SinkReport],
    ) -> (Vec<(OutputFormat, PathBuf)>, Vec<GeoFailure>) {
        if !self.config.wants_geo() {
            return (vec![], vec![]);
        }
        if self.cancel.is_cancelled() {
            info!("run cancelled, skipping geographic derivation");
            return (vec![], vec![]);
        }

        let Some(staged_csv) = reports
            .iter()
            .find(|r| r.format == OutputFormat::Csv)
            .map(|r| r.path.clone())
        else {
            warn!("no staged CSV for geographic derivation");
            return (
                vec![],
                vec![GeoFailure {
                    formats: self.config.geo_formats(),
                    message: "no staged CSV to derive from".to_string(),
                }],
            );
        };

        self.reporter.stage("deriving geographic formats");
        let stage = GeoStage::new(&self.config, &self.tools, &self.dir);
        let outcome = stage.derive(dataset, plan.geometry.as_ref(), &staged_csv).await;
        (outcome.files, outcome.failures)
    }

    /// Assemble the produced-file list in requested-format order
    async fn collect_files(
        &self,
        reports: &[SinkReport],
        geo_files: &[(OutputFormat, PathBuf)],
    ) -> Vec<ProducedFile> {
        let mut files = Vec::new();
        for format in &self.config.format {
            // the staged CSV only counts when csv was actually requested,
            // which is exactly the iteration we are in
            if let Some(report) = reports.iter().find(|r| r.format == *format) {
                self.reporter.file_done(*format, &report.path, report.bytes);
                files.push(ProducedFile {
                    format: *format,
                    path: report.path.clone(),
                    bytes: report.bytes,
                });
            } else if let Some((_, path)) = geo_files.iter().find(|(f, _)| f == format) {
                let bytes = tokio::fs::metadata(path)
                    .await
                    .map(|m| m.len())
                    .unwrap_or_default();
                self.reporter.file_done(*format, path, bytes);
                files.push(ProducedFile {
                    format: *format,
                    path: path.clone(),
                    bytes,
                });
            }
        }
        files
    }
}
