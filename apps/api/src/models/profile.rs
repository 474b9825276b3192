use serde::{Deserialize, Serialize};

/// Structured candidate record produced by the CV parse stage.
///
/// Every collection defaults to empty so that partially-structured LLM output
/// still deserializes; only `student_name` is mandatory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub student_name: String,
    #[serde(default)]
    pub roll_number: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub internships: Vec<Internship>,
    #[serde(default)]
    pub competitions: Vec<Competition>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub skills: Skills,
    /// Flattened, deduplicated view of `skills`, rebuilt by the parser.
    #[serde(default)]
    pub skills_list: Vec<String>,
    #[serde(default)]
    pub research_experience: Vec<ResearchExperience>,
    #[serde(default)]
    pub achievements: Vec<String>,
    #[serde(default)]
    pub coursework: Coursework,
    #[serde(default)]
    pub extracurriculars: Extracurriculars,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub publications: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Education {
    pub degree: String,
    #[serde(default)]
    pub institution: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub gpa: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Internship {
    pub title: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Competition {
    pub name: String,
    #[serde(default)]
    pub achievement: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub title: String,
    #[serde(default, rename = "type")]
    pub project_type: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Skills {
    #[serde(default)]
    pub core_skills: Vec<String>,
    #[serde(default)]
    pub programming_languages: Vec<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchExperience {
    pub title: String,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub supervisor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Coursework {
    #[serde(default)]
    pub academic: Vec<String>,
    #[serde(default)]
    pub moocs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extracurriculars {
    #[serde(default)]
    pub social_cultural: Vec<String>,
    #[serde(default)]
    pub clubs_societies: Vec<String>,
}

impl StudentProfile {
    /// All skills: structured buckets first, then the flattened list,
    /// case-insensitively deduplicated in first-seen order.
    pub fn all_skills(&self) -> Vec<String> {
        let buckets = [
            &self.skills.core_skills,
            &self.skills.programming_languages,
            &self.skills.frameworks,
            &self.skills.tools,
            &self.skills_list,
        ];
        dedup_case_insensitive(buckets.into_iter().flatten().cloned())
    }

    pub fn project_technologies(&self) -> Vec<String> {
        dedup_case_insensitive(
            self.projects
                .iter()
                .flat_map(|p| p.technologies.iter().cloned()),
        )
    }

    /// Terms used for matching against a professor: skills, interests and
    /// project technologies, lowercased.
    pub fn matching_terms(&self) -> Vec<String> {
        let mut terms = self.all_skills();
        terms.extend(self.interests.iter().cloned());
        terms.extend(self.project_technologies());
        dedup_case_insensitive(terms.into_iter())
            .into_iter()
            .map(|t| t.to_lowercase())
            .collect()
    }
}

/// Trims, drops empties and removes case-insensitive duplicates, keeping the
/// first spelling seen.
pub fn dedup_case_insensitive(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let trimmed = item.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            out.push(trimmed.to_string());
        }
    }
    out
}
