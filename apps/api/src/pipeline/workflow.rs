//! Workflow engine: runs the fixed stage sequence over one `RunState`.
//!
//! Flow: parse → recommend (skipped on category override) → scrape → enrich
//!       → branch → personalize.
//!
//! Only a parse failure aborts a run. Every other failure is recorded in the
//! diagnostics log and the run continues with the best data available.
//! Nothing escapes `run`: every outcome, including an abort, is a `RunReport`.

use std::ops::ControlFlow;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::models::faculty::{EnrichedRecord, FacultyRecord, RecordId};
use crate::models::outreach::OutreachDraft;
use crate::models::profile::StudentProfile;
use crate::pipeline::outcome::{RecordOutcome, SkipReason, StageError, StageId, StageOutcome};
use crate::pipeline::stages::{
    CategoryRecommender, CvParser, FacultySource, Personalizer, RecordEnricher, ScrapeReport,
};
use crate::pipeline::state::{DiagnosticKind, RunState};

pub const DEFAULT_MIN_SCORE: f64 = 0.3;
pub const DEFAULT_CONCURRENCY: usize = 4;

// ────────────────────────────────────────────────────────────────────────────
// Request / report types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(alias = "cv_path")]
    pub input_path: String,
    /// Explicit categories. When present and non-empty, recommend is skipped.
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    /// Per-category record limit passed to the scrape stage.
    #[serde(default)]
    pub record_limit: Option<usize>,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default)]
    pub mode: RunMode,
}

/// How far a run goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Every stage through personalize.
    #[default]
    Full,
    /// Stops after scrape; only raw records are collected.
    ScrapeOnly,
}

fn default_min_score() -> f64 {
    DEFAULT_MIN_SCORE
}

impl RunRequest {
    pub fn new(input_path: impl Into<String>) -> Self {
        Self {
            input_path: input_path.into(),
            categories: None,
            record_limit: None,
            min_score: DEFAULT_MIN_SCORE,
            mode: RunMode::Full,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.input_path.trim().is_empty() {
            return Err("input_path cannot be empty".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(format!(
                "min_score must be between 0.0 and 1.0, got {}",
                self.min_score
            ));
        }
        if self.record_limit == Some(0) {
            return Err("record_limit must be at least 1".to_string());
        }
        Ok(())
    }

    /// The caller's category override, if it names at least one category.
    fn category_override(&self) -> Option<Vec<String>> {
        self.categories
            .as_ref()
            .map(|cats| {
                cats.iter()
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|cats| !cats.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunStatus {
    /// Personalize ran; outputs may still be empty if nothing met the threshold.
    Completed,
    /// Stopped before personalize because prerequisite data was missing.
    ShortCircuited { reason: String },
    /// A fatal stage failed.
    Aborted {
        stage: StageId,
        error_kind: String,
        error: String,
    },
    Cancelled { before: StageId },
    /// A scrape-only run collected its raw records.
    Collected,
}

impl RunStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::ShortCircuited { .. } => "short_circuited",
            RunStatus::Aborted { .. } => "aborted",
            RunStatus::Cancelled { .. } => "cancelled",
            RunStatus::Collected => "collected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub reached_personalize: bool,
    pub state: RunState,
}

impl RunReport {
    fn stopped(state: RunState, status: RunStatus) -> Self {
        Self {
            run_id: state.run_id(),
            status,
            reached_personalize: false,
            state,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct WorkflowStages {
    pub parser: Arc<dyn CvParser>,
    pub recommender: Arc<dyn CategoryRecommender>,
    pub source: Arc<dyn FacultySource>,
    pub enricher: Arc<dyn RecordEnricher>,
    pub personalizer: Arc<dyn Personalizer>,
}

#[derive(Debug, Clone)]
pub struct WorkflowOptions {
    /// Bound on in-flight per-record calls during enrich and personalize.
    pub concurrency: usize,
    /// Categories used when recommendation fails.
    pub default_categories: Vec<String>,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            default_categories: vec!["CS".to_string()],
        }
    }
}

#[derive(Clone)]
pub struct Workflow {
    stages: WorkflowStages,
    options: WorkflowOptions,
}

type Step = ControlFlow<RunReport, RunState>;

impl Workflow {
    pub fn new(stages: WorkflowStages, mut options: WorkflowOptions) -> Self {
        options.concurrency = options.concurrency.max(1);
        Self { stages, options }
    }

    pub async fn run(&self, request: RunRequest, cancel: &CancellationToken) -> RunReport {
        self.run_with_id(Uuid::new_v4(), request, cancel).await
    }

    /// Runs the pipeline under a caller-chosen run id (used when the id must
    /// be known before the run starts, e.g. to persist a pending row).
    pub async fn run_with_id(
        &self,
        run_id: Uuid,
        request: RunRequest,
        cancel: &CancellationToken,
    ) -> RunReport {
        let span = info_span!("pipeline_run", %run_id);
        async move {
            info!(input = %request.input_path, "starting pipeline run");
            let state = RunState::new(run_id, request.input_path.clone());

            let report = match self.execute(state, &request, cancel).await {
                ControlFlow::Break(report) => report,
                ControlFlow::Continue(state) => RunReport {
                    run_id,
                    status: RunStatus::Completed,
                    reached_personalize: true,
                    state,
                },
            };

            info!(
                status = report.status.label(),
                raw = report.state.raw_records().len(),
                enriched = report.state.enriched_records().len(),
                outputs = report.state.generated_outputs().len(),
                diagnostics = report.state.diagnostics().len(),
                "pipeline run finished"
            );
            report
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        state: RunState,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Step {
        let state = checkpoint(state, StageId::Parse, cancel)?;
        let state = self.parse(state).await?;

        let state = match request.category_override() {
            Some(categories) => {
                info!(?categories, "category override supplied; skipping recommend");
                state.with_categories(categories)
            }
            None => {
                let state = checkpoint(state, StageId::Recommend, cancel)?;
                self.recommend(state).await?
            }
        };

        let state = checkpoint(state, StageId::Scrape, cancel)?;
        let state = self.scrape(state, request.record_limit).await?;
        if request.mode == RunMode::ScrapeOnly {
            return ControlFlow::Break(collected(state));
        }

        let state = checkpoint(state, StageId::Enrich, cancel)?;
        let state = self.enrich(state).await;

        let state = branch(state)?;

        let state = checkpoint(state, StageId::Personalize, cancel)?;
        ControlFlow::Continue(self.personalize(state, request.min_score).await)
    }

    // ── whole-stage steps ────────────────────────────────────────────────────

    async fn parse(&self, state: RunState) -> Step {
        let result = self.stages.parser.parse(state.input_path()).await;
        let outcome = StageOutcome::resolve(StageId::Parse, result, StudentProfile::default);
        let (state, profile) = settle(state, StageId::Parse, outcome, |p| {
            format!("parsed profile for {}", p.student_name)
        })?;
        ControlFlow::Continue(state.with_profile(profile))
    }

    async fn recommend(&self, state: RunState) -> Step {
        let result = match state.parsed_profile() {
            Some(profile) => self.stages.recommender.recommend(profile).await,
            None => Err(StageError::NoRecommendation),
        };
        // A successful recommendation is never empty.
        let result = result.and_then(|cats| {
            if cats.is_empty() {
                Err(StageError::NoRecommendation)
            } else {
                Ok(cats)
            }
        });
        let fallback = || self.options.default_categories.clone();
        let outcome = StageOutcome::resolve(StageId::Recommend, result, fallback);
        let (state, categories) = settle(state, StageId::Recommend, outcome, |cats| {
            format!("target categories: {}", cats.join(", "))
        })?;
        ControlFlow::Continue(state.with_categories(categories))
    }

    async fn scrape(&self, state: RunState, limit: Option<usize>) -> Step {
        let result = self
            .stages
            .source
            .scrape(state.target_categories(), limit)
            .await;

        let outcome = match result {
            Ok(ScrapeReport { records, failures }) if failures.is_empty() => {
                StageOutcome::Completed(records)
            }
            Ok(ScrapeReport { records, failures }) => {
                let detail = failures
                    .iter()
                    .map(|f| format!("{}: {}", f.category, f.error))
                    .collect::<Vec<_>>()
                    .join("; ");
                StageOutcome::Degraded {
                    value: records,
                    error: StageError::Scrape(detail),
                }
            }
            Err(error) => StageOutcome::resolve(StageId::Scrape, Err(error), Vec::new),
        };

        let (state, records) = settle(state, StageId::Scrape, outcome, |records| {
            format!("collected {} faculty records", records.len())
        })?;
        ControlFlow::Continue(state.with_raw_records(records))
    }

    // ── per-record steps ─────────────────────────────────────────────────────

    async fn enrich(&self, state: RunState) -> RunState {
        let enricher = Arc::clone(&self.stages.enricher);

        // `buffered` yields in input order, so slot i always holds record i.
        // Each per-record future owns its inputs so the run future stays `Send`.
        let outcomes: Vec<RecordOutcome<EnrichedRecord>> =
            stream::iter(state.raw_records().to_vec())
                .map(move |record| enrich_record(Arc::clone(&enricher), record))
                .buffered(self.options.concurrency)
                .collect()
                .await;

        let (state, enriched) = fold_records(state, StageId::Enrich, outcomes);
        state.with_enriched_records(enriched)
    }

    async fn personalize(&self, state: RunState, threshold: f64) -> RunState {
        let personalizer = Arc::clone(&self.stages.personalizer);

        let outcomes: Vec<RecordOutcome<OutreachDraft>> = match state.parsed_profile() {
            Some(profile) => {
                let profile = Arc::new(profile.clone());
                stream::iter(state.enriched_records().to_vec())
                    .map(move |record| {
                        personalize_record(
                            Arc::clone(&personalizer),
                            Arc::clone(&profile),
                            record,
                            threshold,
                        )
                    })
                    .buffered(self.options.concurrency)
                    .collect()
                    .await
            }
            None => Vec::new(),
        };

        let (state, outputs) = fold_records(state, StageId::Personalize, outcomes);
        state.with_outputs(outputs)
    }
}

async fn enrich_record(
    enricher: Arc<dyn RecordEnricher>,
    record: FacultyRecord,
) -> RecordOutcome<EnrichedRecord> {
    match enricher.enrich(&record).await {
        Ok(enrichment) => RecordOutcome::Produced(EnrichedRecord {
            record,
            enrichment: Some(enrichment),
        }),
        Err(error) => RecordOutcome::PassedThrough {
            value: EnrichedRecord::unaugmented(record),
            error,
        },
    }
}

async fn personalize_record(
    personalizer: Arc<dyn Personalizer>,
    profile: Arc<StudentProfile>,
    record: EnrichedRecord,
    threshold: f64,
) -> RecordOutcome<OutreachDraft> {
    let skipped = |reason| RecordOutcome::Skipped {
        record_id: record.id().clone(),
        reason,
    };

    let score = match personalizer.score(&profile, &record).await {
        Ok(score) => score,
        Err(error) => return skipped(SkipReason::Failed(error)),
    };
    if !score.meets(threshold) {
        return skipped(SkipReason::BelowThreshold { score, threshold });
    }

    match personalizer.compose(&profile, &record, score).await {
        Ok(draft) if draft.score.meets(threshold) => RecordOutcome::Produced(draft),
        Ok(draft) => skipped(SkipReason::BelowThreshold {
            score: draft.score,
            threshold,
        }),
        Err(error) => skipped(SkipReason::Failed(error)),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Control-flow helpers
// ────────────────────────────────────────────────────────────────────────────

/// Records a whole-stage outcome and decides whether the run continues.
fn settle<T>(
    state: RunState,
    stage: StageId,
    outcome: StageOutcome<T>,
    summary: impl FnOnce(&T) -> String,
) -> ControlFlow<RunReport, (RunState, T)> {
    match outcome {
        StageOutcome::Completed(value) => {
            let message = summary(&value);
            info!(%stage, "{message}");
            let state = state.record(stage, DiagnosticKind::Completed, message);
            ControlFlow::Continue((state, value))
        }
        StageOutcome::Degraded { value, error } => {
            let message = format!(
                "{} ({}); continuing with {}",
                error,
                error.kind(),
                summary(&value)
            );
            warn!(%stage, "{message}");
            let state = state
                .mark_failed(stage)
                .record(stage, DiagnosticKind::Degraded, message);
            ControlFlow::Continue((state, value))
        }
        StageOutcome::Fatal(error) => {
            error!(%stage, kind = error.kind(), "fatal stage failure: {error}");
            let state = state
                .mark_failed(stage)
                .record(stage, DiagnosticKind::Fatal, format!("{} ({})", error, error.kind()));
            ControlFlow::Break(RunReport::stopped(
                state,
                RunStatus::Aborted {
                    stage,
                    error_kind: error.kind().to_string(),
                    error: error.to_string(),
                },
            ))
        }
    }
}

/// Items that can be traced back to their source record.
trait Keyed {
    fn record_id(&self) -> &RecordId;
}

impl Keyed for EnrichedRecord {
    fn record_id(&self) -> &RecordId {
        self.id()
    }
}

impl Keyed for OutreachDraft {
    fn record_id(&self) -> &RecordId {
        &self.record_id
    }
}

/// Folds per-record outcomes back into the state, in input order.
fn fold_records<T: Keyed>(
    mut state: RunState,
    stage: StageId,
    outcomes: Vec<RecordOutcome<T>>,
) -> (RunState, Vec<T>) {
    let total = outcomes.len();
    let mut kept = Vec::with_capacity(total);
    let (mut produced, mut failed, mut below_threshold) = (0usize, 0usize, 0usize);

    for outcome in outcomes {
        match outcome {
            RecordOutcome::Produced(value) => {
                produced += 1;
                kept.push(value);
            }
            RecordOutcome::PassedThrough { value, error } => {
                failed += 1;
                warn!(%stage, record_id = %value.record_id(), "record passed through: {error}");
                state = state.record_item(
                    stage,
                    DiagnosticKind::RecordFailed,
                    value.record_id(),
                    format!("{} ({}); passed through unchanged", error, error.kind()),
                );
                kept.push(value);
            }
            RecordOutcome::Skipped { record_id, reason } => {
                let kind = match &reason {
                    SkipReason::BelowThreshold { .. } => {
                        below_threshold += 1;
                        info!(%stage, %record_id, "record skipped: {reason}");
                        DiagnosticKind::RecordSkipped
                    }
                    SkipReason::Failed(_) => {
                        failed += 1;
                        warn!(%stage, %record_id, "record failed: {reason}");
                        DiagnosticKind::RecordFailed
                    }
                };
                state = state.record_item(stage, kind, &record_id, reason.to_string());
            }
        }
    }

    let message = format!(
        "{produced}/{total} records produced, {failed} failed, {below_threshold} below threshold"
    );
    let state = if failed > 0 {
        warn!(%stage, "{message}");
        state
            .mark_failed(stage)
            .record(stage, DiagnosticKind::Degraded, message)
    } else {
        info!(%stage, "{message}");
        state.record(stage, DiagnosticKind::Completed, message)
    };
    (state, kept)
}

/// Personalize needs a profile and at least one record; otherwise the run
/// ends here as a normal terminal state.
fn branch(state: RunState) -> Step {
    let reason = if state.parsed_profile().is_none() {
        "no parsed profile"
    } else if state.enriched_records().is_empty() {
        "no faculty records to personalize"
    } else {
        return ControlFlow::Continue(state);
    };

    info!("short-circuiting before personalize: {reason}");
    let state = state.record(
        StageId::Personalize,
        DiagnosticKind::ShortCircuit,
        format!("personalize not attempted: {reason}"),
    );
    ControlFlow::Break(RunReport::stopped(
        state,
        RunStatus::ShortCircuited {
            reason: reason.to_string(),
        },
    ))
}

/// Terminal step of a scrape-only run.
fn collected(state: RunState) -> RunReport {
    info!("scrape-only run; stopping after scrape");
    let state = state.record(
        StageId::Enrich,
        DiagnosticKind::ShortCircuit,
        "scrape-only run: enrich and personalize not requested".to_string(),
    );
    RunReport::stopped(state, RunStatus::Collected)
}

/// Cancellation is honoured between stages only.
fn checkpoint(state: RunState, next: StageId, cancel: &CancellationToken) -> Step {
    if !cancel.is_cancelled() {
        return ControlFlow::Continue(state);
    }
    info!(%next, "run cancelled by caller");
    let state = state.record(
        next,
        DiagnosticKind::Cancelled,
        format!("run cancelled before {next}"),
    );
    ControlFlow::Break(RunReport::stopped(state, RunStatus::Cancelled { before: next }))
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
