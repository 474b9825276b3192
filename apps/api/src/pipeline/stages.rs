//! Stage contracts. Each stage is an input → output boundary; the engine only
//! sees these traits, carried as `Arc<dyn …>` so backends can be swapped
//! without touching the engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::faculty::{EnrichedRecord, Enrichment, FacultyRecord};
use crate::models::outreach::OutreachDraft;
use crate::models::profile::StudentProfile;
use crate::pipeline::outcome::StageError;
use crate::pipeline::scoring::MatchScore;

/// Turns a document locator into a structured profile.
///
/// Unsupported formats must surface as `StageError::UnsupportedFormat`, never
/// as `StageError::Structuring`.
#[async_trait]
pub trait CvParser: Send + Sync {
    async fn parse(&self, input_path: &str) -> Result<StudentProfile, StageError>;
}

/// Recommends target categories for a profile. A successful result is never
/// empty; implementations return `StageError::NoRecommendation` instead.
#[async_trait]
pub trait CategoryRecommender: Send + Sync {
    async fn recommend(&self, profile: &StudentProfile) -> Result<Vec<String>, StageError>;
}

/// Records collected by a scrape, plus the categories that failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapeReport {
    pub records: Vec<FacultyRecord>,
    pub failures: Vec<CategoryFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryFailure {
    pub category: String,
    pub error: String,
}

/// Collects raw records for the given categories. `Err` means nothing could
/// be collected at all; partial collection is an `Ok` report with failures.
#[async_trait]
pub trait FacultySource: Send + Sync {
    async fn scrape(
        &self,
        categories: &[String],
        per_category_limit: Option<usize>,
    ) -> Result<ScrapeReport, StageError>;
}

/// Computes supplementary fields for one record. Returns only the supplement,
/// so a record's identifier cannot change across this stage.
#[async_trait]
pub trait RecordEnricher: Send + Sync {
    async fn enrich(&self, record: &FacultyRecord) -> Result<Enrichment, StageError>;
}

/// Scores and writes outreach for one record. The engine calls `score` first
/// and only calls `compose` when the score meets the run's threshold.
#[async_trait]
pub trait Personalizer: Send + Sync {
    async fn score(
        &self,
        profile: &StudentProfile,
        record: &EnrichedRecord,
    ) -> Result<MatchScore, StageError>;

    async fn compose(
        &self,
        profile: &StudentProfile,
        record: &EnrichedRecord,
        score: MatchScore,
    ) -> Result<OutreachDraft, StageError>;
}
