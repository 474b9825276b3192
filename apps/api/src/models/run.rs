use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PipelineRunRow {
    pub id: Uuid,
    pub input_path: String,
    pub request: Value,
    /// running | completed | collected | short_circuited | aborted | cancelled
    pub status: String,
    pub status_detail: Option<Value>,
    pub reached_personalize: bool,
    pub target_categories: Vec<String>,
    pub failure_markers: Vec<String>,
    pub diagnostics: Value,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OutreachDraftRow {
    pub id: Uuid,
    pub run_id: Uuid,
    pub record_id: String,
    pub professor_name: String,
    pub professor_email: Option<String>,
    pub department: String,
    pub profile_url: String,
    pub score: f64,
    pub match_reasons: Value,
    pub talking_points: Vec<String>,
    pub email_subject: String,
    pub email_body: String,
    pub cover_letter: String,
    pub model_used: String,
    pub generated_at: DateTime<Utc>,
}
