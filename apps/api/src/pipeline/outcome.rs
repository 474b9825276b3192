//! Stage identifiers, the fixed failure-policy table, and stage outcome types.
//!
//! The engine never inspects an error to decide what to do next: it asks the
//! stage for its `FailurePolicy` and matches the resulting `StageOutcome`.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::faculty::RecordId;
use crate::pipeline::scoring::{MatchScore, ScoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Parse,
    Recommend,
    Scrape,
    Enrich,
    Personalize,
}

impl StageId {
    pub fn as_str(self) -> &'static str {
        match self {
            StageId::Parse => "parse",
            StageId::Recommend => "recommend",
            StageId::Scrape => "scrape",
            StageId::Enrich => "enrich",
            StageId::Personalize => "personalize",
        }
    }

    /// Failure policy per stage. Fixed; not configurable per call.
    pub const fn failure_policy(self) -> FailurePolicy {
        match self {
            StageId::Parse => FailurePolicy::AbortRun,
            StageId::Recommend => FailurePolicy::FallBack,
            StageId::Scrape => FailurePolicy::KeepPartial,
            StageId::Enrich => FailurePolicy::PassThroughRecord,
            StageId::Personalize => FailurePolicy::SkipRecord,
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the run; no further stages execute.
    AbortRun,
    /// Substitute a fixed default and continue.
    FallBack,
    /// Continue with whatever was collected before the failure.
    KeepPartial,
    /// Pass the failing record through unaugmented.
    PassThroughRecord,
    /// Drop the failing record's output; siblings are unaffected.
    SkipRecord,
}

impl FailurePolicy {
    pub fn is_fatal(self) -> bool {
        matches!(self, FailurePolicy::AbortRun)
    }
}

/// Errors reported by stage implementations.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("document unreadable: {0}")]
    Unreadable(String),

    #[error("document contained no extractable text")]
    EmptyDocument,

    /// Text extraction succeeded but the text could not be structured.
    #[error("profile structuring failed: {0}")]
    Structuring(String),

    #[error("no category matched the profile")]
    NoRecommendation,

    #[error("scrape failed: {0}")]
    Scrape(String),

    #[error("search failed: {0}")]
    Search(String),

    #[error("LLM call failed: {0}")]
    Llm(String),

    #[error("invalid match score: {0}")]
    Score(#[from] ScoreError),
}

impl StageError {
    /// Short machine-readable kind, used in diagnostics and API error codes.
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::UnsupportedFormat(_) => "unsupported_format",
            StageError::Unreadable(_) => "unreadable",
            StageError::EmptyDocument => "empty_document",
            StageError::Structuring(_) => "structuring_failed",
            StageError::NoRecommendation => "no_recommendation",
            StageError::Scrape(_) => "scrape_failed",
            StageError::Search(_) => "search_failed",
            StageError::Llm(_) => "llm_failed",
            StageError::Score(_) => "score_out_of_range",
        }
    }
}

/// Result of one whole-stage step after its failure policy has been applied.
#[derive(Debug)]
pub enum StageOutcome<T> {
    Completed(T),
    Degraded { value: T, error: StageError },
    Fatal(StageError),
}

impl<T> StageOutcome<T> {
    /// Applies `stage`'s failure policy to a raw stage result. `fallback`
    /// supplies the value to continue with when the policy is non-fatal.
    pub fn resolve(
        stage: StageId,
        result: Result<T, StageError>,
        fallback: impl FnOnce() -> T,
    ) -> Self {
        match result {
            Ok(value) => StageOutcome::Completed(value),
            Err(error) if stage.failure_policy().is_fatal() => StageOutcome::Fatal(error),
            Err(error) => StageOutcome::Degraded {
                value: fallback(),
                error,
            },
        }
    }
}

/// Result of one per-record step (enrich or personalize).
#[derive(Debug)]
pub enum RecordOutcome<T> {
    Produced(T),
    /// The stage failed for this record; the input passes through unchanged.
    PassedThrough { value: T, error: StageError },
    Skipped {
        record_id: RecordId,
        reason: SkipReason,
    },
}

#[derive(Debug)]
pub enum SkipReason {
    BelowThreshold { score: MatchScore, threshold: f64 },
    Failed(StageError),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::BelowThreshold { score, threshold } => write!(
                f,
                "score {:.3} below threshold {:.3}",
                score.value(),
                threshold
            ),
            SkipReason::Failed(e) => write!(f, "{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_parse_is_fatal() {
        for stage in [
            StageId::Parse,
            StageId::Recommend,
            StageId::Scrape,
            StageId::Enrich,
            StageId::Personalize,
        ] {
            assert_eq!(
                stage.failure_policy().is_fatal(),
                stage == StageId::Parse,
                "unexpected policy for {stage}"
            );
        }
    }

    #[test]
    fn test_resolve_fatal_stage_does_not_call_fallback() {
        let outcome: StageOutcome<Vec<u8>> = StageOutcome::resolve(
            StageId::Parse,
            Err(StageError::EmptyDocument),
            || panic!("fallback must not run for a fatal stage"),
        );
        assert!(matches!(outcome, StageOutcome::Fatal(StageError::EmptyDocument)));
    }

    #[test]
    fn test_resolve_non_fatal_stage_uses_fallback() {
        let outcome = StageOutcome::resolve(
            StageId::Recommend,
            Err(StageError::NoRecommendation),
            || vec!["CS".to_string()],
        );
        match outcome {
            StageOutcome::Degraded { value, error } => {
                assert_eq!(value, vec!["CS"]);
                assert_eq!(error.kind(), "no_recommendation");
            }
            other => panic!("expected Degraded, got {other:?}"),
        }
    }

    #[test]
    fn test_format_rejection_is_distinct_from_structuring_failure() {
        let unsupported = StageError::UnsupportedFormat(".odt".to_string());
        let structuring = StageError::Structuring("missing student_name".to_string());
        assert_ne!(unsupported.kind(), structuring.kind());
    }

    #[test]
    fn test_stage_id_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&StageId::Personalize).unwrap(),
            "\"personalize\""
        );
    }
}
