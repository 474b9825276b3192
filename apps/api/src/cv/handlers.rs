use std::io::Write;
use std::path::Path;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::cv::document::DocumentFormat;
use crate::errors::AppError;
use crate::models::profile::StudentProfile;
use crate::state::AppState;

/// Upper bound for multipart CV uploads.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

struct Upload {
    file_name: String,
    extension: String,
    bytes: Bytes,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Server-side path to pass as `cv_path` when starting a run.
    pub path: String,
    pub file_name: String,
    pub size_bytes: usize,
}

/// POST /api/v1/cv/parse
/// Multipart field `file`. Parses the CV without persisting it.
pub async fn handle_parse_cv(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<StudentProfile>, AppError> {
    let upload = read_upload(multipart).await?;

    let mut temp = tempfile::Builder::new()
        .prefix("cv-")
        .suffix(&format!(".{}", upload.extension))
        .tempfile()
        .context("Failed to create temporary file for CV")?;
    temp.write_all(&upload.bytes)
        .context("Failed to write CV to temporary file")?;

    let path = temp.path().to_string_lossy().to_string();
    info!(file = %upload.file_name, bytes = upload.bytes.len(), "parsing uploaded CV");
    let profile = state.cv_parser.parse(&path).await?;
    Ok(Json(profile))
}

/// POST /api/v1/cv/upload
/// Multipart field `file`. Stores the CV under UPLOAD_DIR for later runs.
pub async fn handle_upload_cv(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let upload = read_upload(multipart).await?;

    let dir = Path::new(&state.config.upload_dir);
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create upload directory {}", dir.display()))?;

    let stored = dir.join(format!("{}.{}", Uuid::new_v4(), upload.extension));
    tokio::fs::write(&stored, &upload.bytes)
        .await
        .with_context(|| format!("Failed to store CV at {}", stored.display()))?;

    info!(file = %upload.file_name, path = %stored.display(), "stored uploaded CV");
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            path: stored.to_string_lossy().to_string(),
            file_name: upload.file_name,
            size_bytes: upload.bytes.len(),
        }),
    ))
}

/// Reads the `file` field and checks its extension before any bytes hit disk.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::Validation("Field 'file' has no file name".to_string()))?;

        let path = Path::new(&file_name);
        DocumentFormat::from_path(path).map_err(|e| AppError::UnsupportedMedia(e.to_string()))?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?;
        if bytes.is_empty() {
            return Err(AppError::Validation("Uploaded file is empty".to_string()));
        }

        return Ok(Upload {
            file_name,
            extension,
            bytes,
        });
    }

    Err(AppError::Validation(
        "Missing multipart field 'file'".to_string(),
    ))
}
