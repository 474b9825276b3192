use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::run::{OutreachDraftRow, PipelineRunRow};
use crate::pipeline::{RunReport, RunRequest};

/// Most recent runs returned by the list endpoint.
pub const RUN_LIST_LIMIT: i64 = 50;

/// Inserts the pending row for a run before the engine starts.
pub async fn insert_run(pool: &PgPool, run_id: Uuid, request: &RunRequest) -> Result<()> {
    let request_json = serde_json::to_value(request).context("Failed to serialize run request")?;

    sqlx::query(
        r#"
        INSERT INTO pipeline_runs (id, input_path, request, status)
        VALUES ($1, $2, $3, 'running')
        "#,
    )
    .bind(run_id)
    .bind(&request.input_path)
    .bind(&request_json)
    .execute(pool)
    .await
    .context("Failed to insert pipeline run")?;

    Ok(())
}

/// Persists the final container of a run: status and diagnostics on the run
/// row, then raw records, enriched records and drafts, all in one transaction.
pub async fn save_report(pool: &PgPool, report: &RunReport) -> Result<()> {
    let state = &report.state;
    let run_id = report.run_id;

    let status_detail = serde_json::to_value(&report.status).context("Failed to serialize run status")?;
    let diagnostics =
        serde_json::to_value(state.diagnostics()).context("Failed to serialize diagnostics")?;
    let failure_markers: Vec<String> = state
        .failure_markers()
        .iter()
        .map(|s| s.as_str().to_string())
        .collect();

    let mut tx = pool.begin().await.context("Failed to open transaction")?;

    sqlx::query(
        r#"
        UPDATE pipeline_runs
        SET status = $2,
            status_detail = $3,
            reached_personalize = $4,
            target_categories = $5,
            failure_markers = $6,
            diagnostics = $7,
            finished_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(run_id)
    .bind(report.status.label())
    .bind(&status_detail)
    .bind(report.reached_personalize)
    .bind(state.target_categories())
    .bind(&failure_markers)
    .bind(&diagnostics)
    .execute(&mut *tx)
    .await
    .context("Failed to update pipeline run")?;

    for (position, record) in state.raw_records().iter().enumerate() {
        let data = serde_json::to_value(record).context("Failed to serialize faculty record")?;
        sqlx::query(
            r#"
            INSERT INTO faculty_records (run_id, record_id, category, position, data)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (run_id, category, record_id) DO NOTHING
            "#,
        )
        .bind(run_id)
        .bind(record.id.as_str())
        .bind(&record.category)
        .bind(position as i32)
        .bind(&data)
        .execute(&mut *tx)
        .await
        .context("Failed to insert faculty record")?;
    }

    for (position, enriched) in state.enriched_records().iter().enumerate() {
        let enrichment = enriched
            .enrichment
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .context("Failed to serialize enrichment")?;
        let confidence = enriched.enrichment.as_ref().map(|e| e.confidence);
        sqlx::query(
            r#"
            INSERT INTO enriched_records (run_id, record_id, position, enrichment, confidence)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (run_id, record_id) DO NOTHING
            "#,
        )
        .bind(run_id)
        .bind(enriched.id().as_str())
        .bind(position as i32)
        .bind(&enrichment)
        .bind(confidence)
        .execute(&mut *tx)
        .await
        .context("Failed to insert enriched record")?;
    }

    for (position, draft) in state.generated_outputs().iter().enumerate() {
        let match_reasons =
            serde_json::to_value(&draft.match_reasons).context("Failed to serialize match reasons")?;
        sqlx::query(
            r#"
            INSERT INTO outreach_drafts
                (run_id, record_id, position, professor_name, professor_email, department,
                 profile_url, score, match_reasons, talking_points, email_subject, email_body,
                 cover_letter, model_used, generated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (run_id, record_id) DO NOTHING
            "#,
        )
        .bind(run_id)
        .bind(draft.record_id.as_str())
        .bind(position as i32)
        .bind(&draft.professor_name)
        .bind(&draft.professor_email)
        .bind(&draft.department)
        .bind(&draft.profile_url)
        .bind(draft.score.value())
        .bind(&match_reasons)
        .bind(&draft.talking_points)
        .bind(&draft.email_subject)
        .bind(&draft.email_body)
        .bind(&draft.cover_letter)
        .bind(&draft.model_used)
        .bind(draft.generated_at)
        .execute(&mut *tx)
        .await
        .context("Failed to insert outreach draft")?;
    }

    tx.commit().await.context("Failed to commit run report")?;

    info!(
        "Persisted run {run_id}: {} raw, {} enriched, {} drafts",
        state.raw_records().len(),
        state.enriched_records().len(),
        state.generated_outputs().len()
    );
    Ok(())
}

pub async fn get_run(pool: &PgPool, run_id: Uuid) -> Result<Option<PipelineRunRow>> {
    let row = sqlx::query_as::<_, PipelineRunRow>(
        r#"
        SELECT id, input_path, request, status, status_detail, reached_personalize,
               target_categories, failure_markers, diagnostics, created_at, finished_at
        FROM pipeline_runs
        WHERE id = $1
        "#,
    )
    .bind(run_id)
    .fetch_optional(pool)
    .await
    .context("Failed to load pipeline run")?;
    Ok(row)
}

pub async fn list_runs(pool: &PgPool, limit: i64) -> Result<Vec<PipelineRunRow>> {
    let rows = sqlx::query_as::<_, PipelineRunRow>(
        r#"
        SELECT id, input_path, request, status, status_detail, reached_personalize,
               target_categories, failure_markers, diagnostics, created_at, finished_at
        FROM pipeline_runs
        ORDER BY created_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to list pipeline runs")?;
    Ok(rows)
}

/// Drafts of a run in the order the engine produced them.
pub async fn get_drafts(pool: &PgPool, run_id: Uuid) -> Result<Vec<OutreachDraftRow>> {
    let rows = sqlx::query_as::<_, OutreachDraftRow>(
        r#"
        SELECT id, run_id, record_id, professor_name, professor_email, department, profile_url,
               score, match_reasons, talking_points, email_subject, email_body, cover_letter,
               model_used, generated_at
        FROM outreach_drafts
        WHERE run_id = $1
        ORDER BY position ASC
        "#,
    )
    .bind(run_id)
    .fetch_all(pool)
    .await
    .context("Failed to load outreach drafts")?;
    Ok(rows)
}

/// Marks a run whose background task died before a report was produced.
pub async fn mark_run_lost(pool: &PgPool, run_id: Uuid, reason: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE pipeline_runs
        SET status = 'aborted',
            status_detail = jsonb_build_object('kind', 'lost', 'error', $2::text),
            finished_at = NOW()
        WHERE id = $1 AND status = 'running'
        "#,
    )
    .bind(run_id)
    .bind(reason)
    .execute(pool)
    .await
    .context("Failed to mark run as lost")?;
    Ok(())
}
