use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::cv::document::extract_text;
use crate::cv::prompts::{CV_EXTRACTION_PROMPT, CV_EXTRACTION_SYSTEM};
use crate::llm_client::LlmClient;
use crate::models::profile::{dedup_case_insensitive, StudentProfile};
use crate::pipeline::stages::CvParser;
use crate::pipeline::StageError;

/// CV text beyond this many characters is cut before structuring.
pub const MAX_CV_CHARS: usize = 8000;

/// Abbreviations normalized to their canonical skill name.
const SKILL_ALIASES: &[(&str, &str)] = &[
    ("ml", "Machine Learning"),
    ("dl", "Deep Learning"),
    ("ai", "Artificial Intelligence"),
    ("nlp", "Natural Language Processing"),
    ("cv", "Computer Vision"),
    ("js", "JavaScript"),
    ("ts", "TypeScript"),
    ("py", "Python"),
    ("cpp", "C++"),
    ("tf", "TensorFlow"),
    ("pytorch", "PyTorch"),
    ("aws", "Amazon Web Services"),
    ("gcp", "Google Cloud Platform"),
    ("k8s", "Kubernetes"),
    ("sql", "SQL"),
    ("nosql", "NoSQL"),
    ("dsa", "Data Structures and Algorithms"),
    ("oops", "Object Oriented Programming"),
    ("mlops", "MLOps"),
];

/// Extraction should be close to deterministic.
const EXTRACTION_TEMPERATURE: f64 = 0.1;

/// Parses a CV file: text extraction, then LLM structuring into a profile.
#[derive(Clone)]
pub struct LlmCvParser {
    llm: LlmClient,
}

impl LlmCvParser {
    pub fn new(llm: LlmClient) -> Self {
        Self {
            llm: llm.with_temperature(EXTRACTION_TEMPERATURE),
        }
    }

    /// Structures already-extracted CV text.
    pub async fn structure(&self, text: &str) -> Result<StudentProfile, StageError> {
        let prompt = CV_EXTRACTION_PROMPT.replace("{cv_text}", &truncate_chars(text, MAX_CV_CHARS));
        let profile: StudentProfile = self
            .llm
            .call_json(&prompt, CV_EXTRACTION_SYSTEM)
            .await
            .map_err(|e| StageError::Structuring(e.to_string()))?;
        finalize_profile(profile)
    }
}

#[async_trait]
impl CvParser for LlmCvParser {
    async fn parse(&self, input_path: &str) -> Result<StudentProfile, StageError> {
        let path = PathBuf::from(input_path);
        let text = tokio::task::spawn_blocking(move || extract_text(&path))
            .await
            .map_err(|e| StageError::Unreadable(format!("extraction task failed: {e}")))??;
        info!(chars = text.len(), "extracted CV text");

        let profile = self.structure(&text).await?;
        info!(
            student = %profile.student_name,
            skills = profile.skills_list.len(),
            projects = profile.projects.len(),
            "CV structured"
        );
        Ok(profile)
    }
}

/// Validates and normalizes an LLM-structured profile.
pub fn finalize_profile(mut profile: StudentProfile) -> Result<StudentProfile, StageError> {
    profile.student_name = profile.student_name.trim().to_string();
    if profile.student_name.is_empty() || profile.student_name.eq_ignore_ascii_case("unknown") {
        return Err(StageError::Structuring(
            "CV did not yield a student name".to_string(),
        ));
    }

    profile.education.retain(|e| !e.degree.trim().is_empty());
    profile.internships.retain(|i| !i.title.trim().is_empty());
    profile.competitions.retain(|c| !c.name.trim().is_empty());
    profile.projects.retain(|p| !p.title.trim().is_empty());

    let skills = &mut profile.skills;
    for bucket in [
        &mut skills.core_skills,
        &mut skills.programming_languages,
        &mut skills.frameworks,
        &mut skills.tools,
    ] {
        *bucket = normalize_skills(bucket);
    }
    profile.skills_list = normalize_skills(&profile.skills_list);
    profile.skills_list = profile.all_skills();

    profile.interests = dedup_case_insensitive(std::mem::take(&mut profile.interests).into_iter());
    profile.achievements = dedup_case_insensitive(std::mem::take(&mut profile.achievements).into_iter());

    debug!(skills = ?profile.skills_list, "normalized skills");
    Ok(profile)
}

fn normalize_skills(skills: &[String]) -> Vec<String> {
    dedup_case_insensitive(skills.iter().map(|s| normalize_skill(s)))
}

pub fn normalize_skill(skill: &str) -> String {
    let trimmed = skill.trim();
    let lower = trimmed.to_lowercase();
    SKILL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}\n[... truncated ...]", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::profile::{Project, Skills};

    fn profile(name: &str) -> StudentProfile {
        StudentProfile {
            student_name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_name_is_a_structuring_failure() {
        let err = finalize_profile(profile("   ")).unwrap_err();
        assert_eq!(err.kind(), "structuring_failed");
        assert!(finalize_profile(profile("Unknown")).is_err());
    }

    #[test]
    fn test_skill_aliases_are_expanded() {
        assert_eq!(normalize_skill(" ML "), "Machine Learning");
        assert_eq!(normalize_skill("k8s"), "Kubernetes");
        assert_eq!(normalize_skill("Rust"), "Rust");
    }

    #[test]
    fn test_flattened_skill_list_is_built_and_deduplicated() {
        let mut p = profile("Asha Rao");
        p.skills = Skills {
            core_skills: vec!["ML".to_string(), "Machine Learning".to_string()],
            programming_languages: vec!["py".to_string(), "Rust".to_string()],
            frameworks: vec!["pytorch".to_string()],
            tools: vec![],
        };
        p.skills_list = vec!["rust".to_string(), "Docker".to_string()];

        let p = finalize_profile(p).unwrap();
        assert_eq!(p.skills.core_skills, vec!["Machine Learning"]);
        assert_eq!(
            p.skills_list,
            vec!["Machine Learning", "Python", "Rust", "PyTorch", "Docker"]
        );
    }

    #[test]
    fn test_untitled_entries_are_dropped() {
        let mut p = profile("Asha Rao");
        p.projects = vec![
            Project {
                title: "Lattice crypto in Rust".to_string(),
                ..Default::default()
            },
            Project::default(),
        ];
        let p = finalize_profile(p).unwrap();
        assert_eq!(p.projects.len(), 1);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "é".repeat(10);
        let cut = truncate_chars(&text, 4);
        assert!(cut.starts_with("éééé\n"));
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
