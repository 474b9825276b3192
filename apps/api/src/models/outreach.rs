use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::faculty::RecordId;
use crate::pipeline::scoring::MatchScore;

/// One concrete overlap between the student and the professor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReason {
    /// skill | project | research_area | publication
    pub category: String,
    pub student_item: String,
    pub professor_item: String,
    #[serde(default)]
    pub relevance_score: f64,
    #[serde(default)]
    pub explanation: String,
}

/// Generated outreach for one faculty record that met the score threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutreachDraft {
    pub record_id: RecordId,
    pub professor_name: String,
    pub professor_email: Option<String>,
    pub department: String,
    pub profile_url: String,
    pub score: MatchScore,
    pub match_reasons: Vec<MatchReason>,
    pub talking_points: Vec<String>,
    pub email_subject: String,
    pub email_body: String,
    pub cover_letter: String,
    pub generated_at: DateTime<Utc>,
    pub model_used: String,
}
