//! Match scoring: weighted linear combination of three sub-scores.
//!
//! score = 0.4 × skill overlap + 0.4 × project relevance + 0.2 × category match
//!
//! Sub-scores outside [0, 1] are rejected as data-quality errors; the combined
//! result is clamped to [0, 1].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of relevant projects at which project relevance saturates at 1.0.
pub const PROJECT_SATURATION: usize = 3;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreError {
    #[error("{component} out of range: {value} (expected 0.0 – 1.0)")]
    OutOfRange { component: &'static str, value: f64 },
}

/// A relevance score in [0.0, 1.0]. Construction is the only range check.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct MatchScore(f64);

impl MatchScore {
    pub fn new(value: f64) -> Result<Self, ScoreError> {
        check_unit("score", value)?;
        Ok(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Inclusive threshold check: a score exactly equal to the threshold passes.
    pub fn meets(self, threshold: f64) -> bool {
        self.0 >= threshold
    }
}

impl TryFrom<f64> for MatchScore {
    type Error = ScoreError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MatchScore> for f64 {
    fn from(score: MatchScore) -> Self {
        score.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchWeights {
    pub skill_overlap: f64,
    pub project_relevance: f64,
    pub category_match: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            skill_overlap: 0.4,
            project_relevance: 0.4,
            category_match: 0.2,
        }
    }
}

/// How the record's category relates to the student's own department.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryMatch {
    Exact,
    Related,
    Unrelated,
}

impl CategoryMatch {
    pub fn indicator(self) -> f64 {
        match self {
            CategoryMatch::Exact => 1.0,
            CategoryMatch::Related => 0.5,
            CategoryMatch::Unrelated => 0.0,
        }
    }
}

/// Raw inputs to the match score for one (profile, record) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSignals {
    /// Fraction of the professor's terms covered by the student, 0.0 – 1.0.
    pub skill_overlap: f64,
    pub relevant_projects: usize,
    pub category_match: CategoryMatch,
}

impl MatchSignals {
    pub fn project_relevance(&self) -> f64 {
        (self.relevant_projects as f64 / PROJECT_SATURATION as f64).min(1.0)
    }
}

pub fn compute_match_score(
    signals: &MatchSignals,
    weights: &MatchWeights,
) -> Result<MatchScore, ScoreError> {
    check_unit("skill_overlap", signals.skill_overlap)?;

    let combined = weights.skill_overlap * signals.skill_overlap
        + weights.project_relevance * signals.project_relevance()
        + weights.category_match * signals.category_match.indicator();

    MatchScore::new(combined.clamp(0.0, 1.0))
}

fn check_unit(component: &'static str, value: f64) -> Result<(), ScoreError> {
    // NaN fails both comparisons and is rejected here.
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ScoreError::OutOfRange { component, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(skill_overlap: f64, relevant_projects: usize, category: CategoryMatch) -> MatchSignals {
        MatchSignals {
            skill_overlap,
            relevant_projects,
            category_match: category,
        }
    }

    #[test]
    fn test_perfect_signals_score_one() {
        let score =
            compute_match_score(&signals(1.0, 3, CategoryMatch::Exact), &MatchWeights::default())
                .unwrap();
        assert!((score.value() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_combination() {
        // 0.4*0.5 + 0.4*(1/3) + 0.2*0.5
        let score = compute_match_score(
            &signals(0.5, 1, CategoryMatch::Related),
            &MatchWeights::default(),
        )
        .unwrap();
        let expected = 0.2 + 0.4 / 3.0 + 0.1;
        assert!((score.value() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_project_relevance_saturates() {
        let s = signals(0.0, 10, CategoryMatch::Unrelated);
        assert_eq!(s.project_relevance(), 1.0);
    }

    #[test]
    fn test_out_of_range_overlap_is_rejected() {
        let err = compute_match_score(
            &signals(1.5, 0, CategoryMatch::Unrelated),
            &MatchWeights::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ScoreError::OutOfRange { component: "skill_overlap", .. }));
    }

    #[test]
    fn test_nan_overlap_is_rejected() {
        assert!(compute_match_score(
            &signals(f64::NAN, 0, CategoryMatch::Unrelated),
            &MatchWeights::default()
        )
        .is_err());
    }

    #[test]
    fn test_oversized_weights_are_clamped() {
        let weights = MatchWeights {
            skill_overlap: 1.0,
            project_relevance: 1.0,
            category_match: 1.0,
        };
        let score = compute_match_score(&signals(1.0, 3, CategoryMatch::Exact), &weights).unwrap();
        assert_eq!(score.value(), 1.0);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let score = MatchScore::new(0.3).unwrap();
        assert!(score.meets(0.3));
        assert!(!score.meets(0.30001));
    }

    #[test]
    fn test_match_score_deserialization_validates_range() {
        assert!(serde_json::from_str::<MatchScore>("0.7").is_ok());
        assert!(serde_json::from_str::<MatchScore>("1.2").is_err());
    }
}
