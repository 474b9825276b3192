use std::path::{Path as FsPath, PathBuf};

use anyhow::{anyhow, Context};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::run::{OutreachDraftRow, PipelineRunRow};
use crate::pipeline::{RunMode, RunReport, RunRequest};
use crate::runs::store;
use crate::state::AppState;

/// Run request as posted by clients. `min_score` falls back to the
/// configured default rather than a compiled-in one.
#[derive(Debug, Deserialize)]
pub struct StartRunBody {
    #[serde(alias = "input_path")]
    pub cv_path: String,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub record_limit: Option<usize>,
    #[serde(default)]
    pub min_score: Option<f64>,
    #[serde(default)]
    pub mode: RunMode,
}

impl StartRunBody {
    pub fn into_request(self, default_min_score: f64) -> RunRequest {
        RunRequest {
            input_path: self.cv_path,
            categories: self.categories,
            record_limit: self.record_limit,
            min_score: self.min_score.unwrap_or(default_min_score),
            mode: self.mode,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunAccepted {
    pub run_id: Uuid,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub run: PipelineRunRow,
    pub drafts: Vec<OutreachDraftRow>,
}

/// POST /api/v1/runs
/// Starts a run in the background and returns its id immediately.
pub async fn handle_start_run(
    State(state): State<AppState>,
    Json(body): Json<StartRunBody>,
) -> Result<(StatusCode, Json<RunAccepted>), AppError> {
    let (run_id, request, cancel) = admit_run(&state, body).await?;
    info!("Accepted run {run_id} for {}", request.input_path);

    // Detached: the task persists the report and releases the run on its own.
    drop(spawn_run(state, run_id, request, cancel));

    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted {
            run_id,
            status: "running",
        }),
    ))
}

/// POST /api/v1/runs/sync
/// Runs the workflow and waits for the full report. The run lives on its own
/// task, so a client disconnect does not stop persistence or cleanup.
pub async fn handle_run_sync(
    State(state): State<AppState>,
    Json(body): Json<StartRunBody>,
) -> Result<Json<RunReport>, AppError> {
    let (run_id, request, cancel) = admit_run(&state, body).await?;

    let report = spawn_run(state, run_id, request, cancel)
        .await
        .map_err(|e| anyhow!("Run {run_id} task failed: {e}"))??;
    Ok(Json(report))
}

/// Validates the body, inserts the pending row and registers the run.
async fn admit_run(
    state: &AppState,
    body: StartRunBody,
) -> Result<(Uuid, RunRequest, CancellationToken), AppError> {
    let mut request = body.into_request(state.config.default_min_score);
    request.validate().map_err(AppError::Validation)?;
    request.input_path = confine_to_upload_dir(&state.config.upload_dir, &request.input_path).await?;

    let run_id = Uuid::new_v4();
    store::insert_run(&state.db, run_id, &request).await?;
    let cancel = state.runs.register(run_id);
    Ok((run_id, request, cancel))
}

/// Runs the workflow on its own task, persists the report and releases the
/// run from the registry. A panicking stage marks the row as lost instead of
/// leaving it `running`.
fn spawn_run(
    state: AppState,
    run_id: Uuid,
    request: RunRequest,
    cancel: CancellationToken,
) -> JoinHandle<anyhow::Result<RunReport>> {
    tokio::spawn(async move {
        let workflow = state.workflow.clone();
        let run =
            tokio::spawn(async move { workflow.run_with_id(run_id, request, &cancel).await }).await;

        let result = match run {
            Ok(report) => store::save_report(&state.db, &report)
                .await
                .map(|()| report)
                .with_context(|| format!("Failed to persist run {run_id}")),
            Err(e) => {
                if let Err(mark) = store::mark_run_lost(&state.db, run_id, &e.to_string()).await {
                    error!("Failed to mark run {run_id} as lost: {mark:?}");
                }
                Err(anyhow!("Run {run_id} task failed: {e}"))
            }
        };

        state.runs.finish(run_id);
        if let Err(e) = &result {
            error!("{e:?}");
        }
        result
    })
}

/// Resolves `cv_path` and rejects anything outside the upload directory.
/// A bare file name is looked up inside the directory. A file that does not
/// exist yet is allowed through so the parse stage can report it.
async fn confine_to_upload_dir(upload_dir: &str, cv_path: &str) -> Result<String, AppError> {
    let root = tokio::fs::canonicalize(upload_dir).await.map_err(|_| {
        AppError::Validation("No CVs have been uploaded; use /api/v1/cv/upload first".to_string())
    })?;

    let candidate = FsPath::new(cv_path.trim());
    let candidate: PathBuf = if candidate.is_relative() && candidate.parent() == Some(FsPath::new("")) {
        root.join(candidate)
    } else {
        candidate.to_path_buf()
    };

    let resolved = match tokio::fs::canonicalize(&candidate).await {
        Ok(path) => path,
        Err(_) => {
            let (Some(parent), Some(name)) = (candidate.parent(), candidate.file_name()) else {
                return Err(outside_upload_dir(cv_path));
            };
            let parent = tokio::fs::canonicalize(parent)
                .await
                .map_err(|_| outside_upload_dir(cv_path))?;
            parent.join(name)
        }
    };

    if !resolved.starts_with(&root) {
        warn!("Rejected cv_path outside the upload directory: {cv_path}");
        return Err(outside_upload_dir(cv_path));
    }
    Ok(resolved.to_string_lossy().into_owned())
}

fn outside_upload_dir(cv_path: &str) -> AppError {
    AppError::Validation(format!(
        "cv_path '{cv_path}' must point to a file returned by /api/v1/cv/upload"
    ))
}

/// GET /api/v1/runs/:id
pub async fn handle_get_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<RunDetail>, AppError> {
    let run = store::get_run(&state.db, run_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Run {run_id} not found")))?;
    let drafts = store::get_drafts(&state.db, run_id).await?;
    Ok(Json(RunDetail { run, drafts }))
}

/// GET /api/v1/runs
pub async fn handle_list_runs(
    State(state): State<AppState>,
) -> Result<Json<Vec<PipelineRunRow>>, AppError> {
    let runs = store::list_runs(&state.db, store::RUN_LIST_LIMIT).await?;
    Ok(Json(runs))
}

/// DELETE /api/v1/runs/:id
/// Requests cancellation; the engine stops before its next stage.
pub async fn handle_cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<(StatusCode, Json<RunAccepted>), AppError> {
    if state.runs.cancel(run_id) {
        info!("Cancellation requested for run {run_id}");
        return Ok((
            StatusCode::ACCEPTED,
            Json(RunAccepted {
                run_id,
                status: "cancelling",
            }),
        ));
    }

    match store::get_run(&state.db, run_id).await? {
        Some(run) => {
            warn!("Cancel requested for run {run_id} in state {}", run.status);
            Err(AppError::Conflict(format!(
                "Run {run_id} is not in progress (status: {})",
                run.status
            )))
        }
        None => Err(AppError::NotFound(format!("Run {run_id} not found"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[test]
    fn test_missing_min_score_uses_configured_default() {
        let body: StartRunBody = serde_json::from_str(r#"{"cv_path": "/tmp/cv.pdf"}"#).unwrap();
        let request = body.into_request(0.45);
        assert_eq!(request.input_path, "/tmp/cv.pdf");
        assert_eq!(request.min_score, 0.45);
        assert!(request.categories.is_none());
    }

    #[test]
    fn test_explicit_fields_are_kept() {
        let body: StartRunBody = serde_json::from_str(
            r#"{"input_path": "cv.docx", "categories": ["EE"], "record_limit": 3, "min_score": 0.6}"#,
        )
        .unwrap();
        let request = body.into_request(0.3);
        assert_eq!(request.categories, Some(vec!["EE".to_string()]));
        assert_eq!(request.record_limit, Some(3));
        assert_eq!(request.min_score, 0.6);
    }

    #[test]
    fn test_mode_defaults_to_full() {
        let body: StartRunBody = serde_json::from_str(r#"{"cv_path": "cv.pdf"}"#).unwrap();
        assert_eq!(body.into_request(0.3).mode, RunMode::Full);

        let body: StartRunBody =
            serde_json::from_str(r#"{"cv_path": "cv.pdf", "mode": "scrape_only"}"#).unwrap();
        assert_eq!(body.into_request(0.3).mode, RunMode::ScrapeOnly);
    }

    #[tokio::test]
    async fn test_upload_dir_paths_are_accepted() {
        let uploads = tempfile::tempdir().unwrap();
        let stored = uploads.path().join("cv.pdf");
        std::fs::write(&stored, b"%PDF").unwrap();
        let root = uploads.path().display().to_string();
        let expected = std::fs::canonicalize(&stored).unwrap();

        let by_path = confine_to_upload_dir(&root, &stored.display().to_string()).await.unwrap();
        let by_name = confine_to_upload_dir(&root, "cv.pdf").await.unwrap();

        assert_eq!(FsPath::new(&by_path), expected);
        assert_eq!(FsPath::new(&by_name), expected);
    }

    #[tokio::test]
    async fn test_missing_file_inside_upload_dir_is_left_to_parse() {
        let uploads = tempfile::tempdir().unwrap();
        let root = uploads.path().display().to_string();

        let resolved = confine_to_upload_dir(&root, "gone.docx").await.unwrap();
        assert!(resolved.ends_with("gone.docx"));
    }

    #[tokio::test]
    async fn test_paths_escaping_upload_dir_are_rejected() {
        let uploads = tempfile::tempdir().unwrap();
        let root = uploads.path().display().to_string();
        let outside = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        let escape = uploads.path().join("..").join(outside.path().file_name().unwrap());

        for path in [outside.path().to_path_buf(), escape] {
            let err = confine_to_upload_dir(&root, &path.display().to_string())
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{path:?} was accepted");
        }
    }

    #[tokio::test]
    async fn test_missing_upload_dir_is_a_validation_error() {
        let err = confine_to_upload_dir("/nonexistent/outreach/uploads", "cv.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_spawned_run_releases_registry_when_caller_goes_away() {
        let uploads = tempfile::tempdir().unwrap();
        let state = AppState::for_tests(&uploads.path().display().to_string());
        let run_id = Uuid::new_v4();
        let cancel = state.runs.register(run_id);
        let request = RunRequest::new(uploads.path().join("missing.pdf").display().to_string());

        // Dropping the handle mirrors a sync client disconnecting mid-run.
        drop(spawn_run(state.clone(), run_id, request, cancel));

        tokio::time::timeout(Duration::from_secs(10), async {
            while state.runs.in_flight() > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("run was never released from the registry");
    }
}
