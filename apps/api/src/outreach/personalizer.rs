//! Personalization: scores a (student, professor) pair and drafts outreach.
//!
//! Scoring is deterministic and never calls the LLM:
//!   skill overlap     = fraction of the professor's terms the student covers
//!   relevant projects = projects mentioning any professor term
//!   category match    = student's department vs. the record's department
//!
//! Composition makes three LLM calls (match analysis, email, cover letter).
//! Any failing call fails this record only; the engine skips it.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};

use crate::faculty::departments::{contains_phrase, department_code, normalize_words, related_departments};
use crate::llm_client::prompts::{GROUNDING_INSTRUCTION, JSON_ONLY_SYSTEM};
use crate::llm_client::{LlmClient, LlmError, MODEL};
use crate::models::faculty::EnrichedRecord;
use crate::models::outreach::{MatchReason, OutreachDraft};
use crate::models::profile::StudentProfile;
use crate::outreach::prompts::{
    COVER_LETTER_PROMPT, COVER_LETTER_SYSTEM, EMAIL_PROMPT, MATCH_ANALYSIS_PROMPT,
};
use crate::pipeline::scoring::{compute_match_score, CategoryMatch, MatchScore, MatchSignals, MatchWeights};
use crate::pipeline::stages::Personalizer;
use crate::pipeline::StageError;

pub const DEFAULT_SUBJECT: &str = "Research Internship Inquiry";
const MAX_BIO_CHARS: usize = 1000;
const MAX_RECENT_WORK_CHARS: usize = 500;

// ────────────────────────────────────────────────────────────────────────────
// Signals
// ────────────────────────────────────────────────────────────────────────────

/// Derives the raw match signals for one pair. Terms match when one appears as
/// whole words inside the other, so "machine learning" covers
/// "machine learning for healthcare" but "ml" never matches "html".
pub fn derive_signals(profile: &StudentProfile, record: &EnrichedRecord) -> MatchSignals {
    let professor_terms: Vec<String> = record
        .expertise_terms()
        .iter()
        .map(|t| normalize_words(t))
        .filter(|t| !t.is_empty())
        .collect();
    let student_terms: Vec<String> = profile
        .matching_terms()
        .iter()
        .map(|t| normalize_words(t))
        .filter(|t| !t.is_empty())
        .collect();

    let covered = professor_terms
        .iter()
        .filter(|p| {
            student_terms
                .iter()
                .any(|s| contains_phrase(p, s) || contains_phrase(s, p))
        })
        .count();
    let skill_overlap = if professor_terms.is_empty() {
        0.0
    } else {
        covered as f64 / professor_terms.len() as f64
    };

    let relevant_projects = profile
        .projects
        .iter()
        .filter(|project| {
            let text = normalize_words(&project_text(project));
            professor_terms.iter().any(|term| contains_phrase(&text, term))
        })
        .count();

    MatchSignals {
        skill_overlap,
        relevant_projects,
        category_match: category_match(profile.department.as_deref(), &record.record.category),
    }
}

fn project_text(project: &crate::models::profile::Project) -> String {
    let mut parts = vec![project.title.clone()];
    parts.extend(project.objective.clone());
    parts.extend(project.technologies.iter().cloned());
    parts.extend(project.highlights.iter().cloned());
    parts.join(" ")
}

fn category_match(student_department: Option<&str>, record_category: &str) -> CategoryMatch {
    let Some(code) = student_department.and_then(department_code) else {
        return CategoryMatch::Unrelated;
    };
    let category = record_category.trim().to_ascii_uppercase();
    if code == category {
        CategoryMatch::Exact
    } else if related_departments(code).iter().any(|c| *c == category) {
        CategoryMatch::Related
    } else {
        CategoryMatch::Unrelated
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LLM composition
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct MatchAnalysis {
    #[serde(default)]
    matches: Vec<MatchReason>,
    #[serde(default)]
    key_talking_points: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmailDraft {
    #[serde(default)]
    email_subject: String,
    email_body: String,
}

#[derive(Clone)]
pub struct LlmPersonalizer {
    llm: LlmClient,
    weights: MatchWeights,
}

impl LlmPersonalizer {
    pub fn new(llm: LlmClient) -> Self {
        Self {
            llm,
            weights: MatchWeights::default(),
        }
    }

    async fn analyze_matches(
        &self,
        profile: &StudentProfile,
        record: &EnrichedRecord,
    ) -> Result<MatchAnalysis, LlmError> {
        let professor = &record.record;
        let enrichment = record.enrichment.clone().unwrap_or_default();
        let publications = bullet_list(
            enrichment.recent_publications.iter().take(5).map(|p| p.title.clone()),
            "Not available",
        );
        let research = bullet_list(
            profile
                .research_experience
                .iter()
                .take(3)
                .map(|r| format!("{}: {}", r.title, r.description)),
            "None listed",
        );

        let prompt = MATCH_ANALYSIS_PROMPT
            .replace("{professor_name}", &professor.name)
            .replace("{department}", &professor.category)
            .replace("{research_areas}", &join_or(&professor.research_areas, "Not specified"))
            .replace(
                "{expertise_keywords}",
                &join_or(&enrichment.expertise_keywords, "Not available"),
            )
            .replace("{publications}", &publications)
            .replace("{bio}", &truncate(professor.bio.as_deref().unwrap_or("Not available"), MAX_BIO_CHARS))
            .replace("{student_name}", &profile.student_name)
            .replace("{skills}", &join_or(&take(profile.all_skills(), 15), "Not listed"))
            .replace("{projects}", &project_lines(profile, 5))
            .replace("{research_experience}", &research)
            .replace("{interests}", &join_or(&profile.interests, "Not listed"))
            .replace("{grounding}", GROUNDING_INSTRUCTION);

        let mut analysis: MatchAnalysis = self.llm.call_json(&prompt, JSON_ONLY_SYSTEM).await?;
        for reason in &mut analysis.matches {
            reason.relevance_score = reason.relevance_score.clamp(0.0, 1.0);
        }
        Ok(analysis)
    }

    async fn write_email(
        &self,
        profile: &StudentProfile,
        record: &EnrichedRecord,
        analysis: &MatchAnalysis,
    ) -> Result<EmailDraft, LlmError> {
        let professor = &record.record;
        let recent_work = match professor.bio.as_deref() {
            Some(bio) if !bio.trim().is_empty() => truncate(bio, MAX_RECENT_WORK_CHARS),
            _ => join_or(&professor.research_areas, "Not available"),
        };
        let key_matches = bullet_list(
            analysis
                .matches
                .iter()
                .take(3)
                .map(|m| format!("{} relates to {}", m.student_item, m.professor_item)),
            "General interest in the field",
        );

        let prompt = EMAIL_PROMPT
            .replace("{professor_name}", &professor.name)
            .replace("{department}", &professor.category)
            .replace(
                "{research_areas}",
                &join_or(&take(professor.research_areas.clone(), 5), "their research"),
            )
            .replace("{recent_work}", &recent_work)
            .replace("{student_name}", &profile.student_name)
            .replace("{education}", &education_summary(profile, 2, ", "))
            .replace("{skills}", &join_or(&take(profile.all_skills(), 10), "various technical skills"))
            .replace("{projects}", &project_lines(profile, 3))
            .replace("{key_matches}", &key_matches)
            .replace("{talking_points}", &join_or(&analysis.key_talking_points, "None"))
            .replace("{grounding}", GROUNDING_INSTRUCTION);

        self.llm.call_json(&prompt, JSON_ONLY_SYSTEM).await
    }

    async fn write_cover_letter(
        &self,
        profile: &StudentProfile,
        record: &EnrichedRecord,
        analysis: &MatchAnalysis,
    ) -> Result<String, LlmError> {
        let professor = &record.record;
        let research = bullet_list(
            profile.research_experience.iter().take(3).map(|r| match &r.organization {
                Some(org) => format!("{} at {}: {}", r.title, org, r.description),
                None => format!("{}: {}", r.title, r.description),
            }),
            "None listed",
        );
        let key_matches = bullet_list(
            analysis.matches.iter().take(4).map(|m| {
                format!("{} -> {}: {}", m.student_item, m.professor_item, m.explanation)
            }),
            "General alignment with research focus",
        );

        let prompt = COVER_LETTER_PROMPT
            .replace("{professor_name}", &professor.name)
            .replace("{department}", &professor.category)
            .replace(
                "{research_areas}",
                &join_or(&take(professor.research_areas.clone(), 5), "their research"),
            )
            .replace("{student_name}", &profile.student_name)
            .replace("{education}", &education_summary(profile, usize::MAX, "\n"))
            .replace("{skills}", &join_or(&take(profile.all_skills(), 12), "various technical skills"))
            .replace("{projects}", &project_lines(profile, 4))
            .replace("{research_experience}", &research)
            .replace("{key_matches}", &key_matches)
            .replace("{grounding}", GROUNDING_INSTRUCTION);

        self.llm.call_text(&prompt, COVER_LETTER_SYSTEM).await
    }
}

#[async_trait]
impl Personalizer for LlmPersonalizer {
    async fn score(
        &self,
        profile: &StudentProfile,
        record: &EnrichedRecord,
    ) -> Result<MatchScore, StageError> {
        let signals = derive_signals(profile, record);
        let score = compute_match_score(&signals, &self.weights)?;
        debug!(
            record_id = %record.id(),
            skill_overlap = signals.skill_overlap,
            relevant_projects = signals.relevant_projects,
            category = ?signals.category_match,
            score = score.value(),
            "match scored"
        );
        Ok(score)
    }

    async fn compose(
        &self,
        profile: &StudentProfile,
        record: &EnrichedRecord,
        score: MatchScore,
    ) -> Result<OutreachDraft, StageError> {
        let llm_failure = |step: &str, e: LlmError| StageError::Llm(format!("{step}: {e}"));

        let analysis = self
            .analyze_matches(profile, record)
            .await
            .map_err(|e| llm_failure("match analysis", e))?;
        let email = self
            .write_email(profile, record, &analysis)
            .await
            .map_err(|e| llm_failure("email", e))?;
        let cover_letter = self
            .write_cover_letter(profile, record, &analysis)
            .await
            .map_err(|e| llm_failure("cover letter", e))?;

        let professor = &record.record;
        let email_subject = match email.email_subject.trim() {
            "" => DEFAULT_SUBJECT.to_string(),
            subject => subject.to_string(),
        };
        info!(record_id = %professor.id, matches = analysis.matches.len(), "outreach drafted");

        Ok(OutreachDraft {
            record_id: professor.id.clone(),
            professor_name: professor.name.clone(),
            professor_email: professor.email.clone(),
            department: professor.category.clone(),
            profile_url: professor.profile_url.clone(),
            score,
            match_reasons: analysis.matches,
            talking_points: analysis.key_talking_points,
            email_subject,
            email_body: email.email_body.trim().to_string(),
            cover_letter,
            generated_at: Utc::now(),
            model_used: MODEL.to_string(),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Prompt formatting helpers
// ────────────────────────────────────────────────────────────────────────────

fn join_or(items: &[String], fallback: &str) -> String {
    if items.is_empty() {
        fallback.to_string()
    } else {
        items.join(", ")
    }
}

fn bullet_list(items: impl Iterator<Item = String>, fallback: &str) -> String {
    let lines: Vec<String> = items.map(|i| format!("- {i}")).collect();
    if lines.is_empty() {
        fallback.to_string()
    } else {
        lines.join("\n")
    }
}

fn take(mut items: Vec<String>, n: usize) -> Vec<String> {
    items.truncate(n);
    items
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn project_lines(profile: &StudentProfile, n: usize) -> String {
    bullet_list(
        profile.projects.iter().take(n).map(|p| match p.objective.as_deref() {
            Some(objective) if !objective.trim().is_empty() => format!("{}: {}", p.title, objective),
            _ => p.title.clone(),
        }),
        "None listed",
    )
}

fn education_summary(profile: &StudentProfile, n: usize, separator: &str) -> String {
    let entries: Vec<String> = profile
        .education
        .iter()
        .take(n)
        .map(|e| {
            let mut line = e.degree.clone();
            if let Some(field) = e.field.as_deref() {
                line.push_str(&format!(" in {field}"));
            }
            if !e.institution.is_empty() {
                line.push_str(&format!(" from {}", e.institution));
            }
            if let Some(year) = e.year.as_deref() {
                line.push_str(&format!(" ({year})"));
            }
            line
        })
        .collect();
    if entries.is_empty() {
        "Not specified".to_string()
    } else {
        entries.join(separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::faculty::{Enrichment, FacultyRecord, RecordId};
    use crate::models::profile::{Education, Project, Skills};

    fn professor(category: &str, areas: &[&str], keywords: &[&str]) -> EnrichedRecord {
        let record = FacultyRecord {
            id: RecordId::from_natural_key(category, "prof"),
            category: category.to_string(),
            name: "Prof. Sen".to_string(),
            designation: "Professor".to_string(),
            email: Some("sen@iitkgp.ac.in".to_string()),
            phone: None,
            profile_url: "https://www.iitkgp.ac.in/department/CS/faculty/prof".to_string(),
            bio: None,
            research_areas: areas.iter().map(|s| s.to_string()).collect(),
            personal_webpage: None,
        };
        EnrichedRecord {
            record,
            enrichment: Some(Enrichment {
                expertise_keywords: keywords.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }),
        }
    }

    fn student(department: Option<&str>, skills: &[&str], projects: Vec<Project>) -> StudentProfile {
        StudentProfile {
            student_name: "Asha Rao".to_string(),
            department: department.map(str::to_string),
            skills: Skills {
                core_skills: skills.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
            projects,
            ..Default::default()
        }
    }

    fn project(title: &str, technologies: &[&str]) -> Project {
        Project {
            title: title.to_string(),
            technologies: technologies.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_skill_overlap_is_fraction_of_professor_terms() {
        let prof = professor("CS", &["Machine Learning", "Cryptography"], &["Formal Methods", "PyTorch"]);
        let s = student(None, &["Machine Learning", "PyTorch", "Go"], vec![]);
        let signals = derive_signals(&s, &prof);
        assert!((signals.skill_overlap - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_abbreviations_do_not_match_inside_words() {
        let prof = professor("CS", &["HTML rendering"], &[]);
        let s = student(None, &["ML"], vec![]);
        assert_eq!(derive_signals(&s, &prof).skill_overlap, 0.0);
    }

    #[test]
    fn test_relevant_projects_are_counted() {
        let prof = professor("CS", &["Computer Vision"], &["PyTorch"]);
        let s = student(
            None,
            &[],
            vec![
                project("Real-time computer vision for drones", &[]),
                project("Recommender", &["PyTorch"]),
                project("Blog", &["Hugo"]),
            ],
        );
        assert_eq!(derive_signals(&s, &prof).relevant_projects, 2);
    }

    #[test]
    fn test_category_match_exact_related_unrelated() {
        assert_eq!(category_match(Some("Computer Science and Engineering"), "CS"), CategoryMatch::Exact);
        assert_eq!(category_match(Some("Computer Science"), "cs"), CategoryMatch::Exact);
        assert_eq!(category_match(None, "CS"), CategoryMatch::Unrelated);
        assert_eq!(category_match(Some("Basket Weaving"), "CS"), CategoryMatch::Unrelated);

        let related = related_departments("CS");
        let other = related.first().expect("CS shares skills with other departments");
        assert_eq!(category_match(Some("CS"), other), CategoryMatch::Related);
    }

    #[test]
    fn test_record_without_terms_has_zero_overlap() {
        let prof = professor("CS", &[], &[]);
        let s = student(Some("CS"), &["Rust"], vec![]);
        let signals = derive_signals(&s, &prof);
        assert_eq!(signals.skill_overlap, 0.0);
        assert_eq!(signals.category_match, CategoryMatch::Exact);
    }

    #[tokio::test]
    async fn test_score_combines_signals() {
        let personalizer = LlmPersonalizer::new(LlmClient::new("test-key".to_string()));
        let prof = professor("CS", &["Machine Learning"], &[]);
        let s = student(
            Some("CS"),
            &["Machine Learning"],
            vec![project("Machine learning for crops", &[])],
        );
        // 0.4 * 1.0 + 0.4 * (1/3) + 0.2 * 1.0
        let score = personalizer.score(&s, &prof).await.unwrap();
        assert!((score.value() - (0.6 + 0.4 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_education_summary_formats_entries() {
        let mut s = student(None, &[], vec![]);
        s.education = vec![Education {
            degree: "B.Tech.".to_string(),
            institution: "IIT Kharagpur".to_string(),
            field: Some("Chemical Engineering".to_string()),
            year: Some("2026".to_string()),
            gpa: None,
        }];
        assert_eq!(
            education_summary(&s, 2, ", "),
            "B.Tech. in Chemical Engineering from IIT Kharagpur (2026)"
        );
        assert_eq!(education_summary(&student(None, &[], vec![]), 2, ", "), "Not specified");
    }

    #[test]
    fn test_bullet_list_fallback() {
        assert_eq!(bullet_list(std::iter::empty(), "None listed"), "None listed");
        assert_eq!(
            bullet_list(vec!["a".to_string(), "b".to_string()].into_iter(), "-"),
            "- a\n- b"
        );
    }
}
