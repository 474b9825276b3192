//! Department tables and the skill-map category recommender.
//!
//! Every profile term (skills, interests, project technologies, internship and
//! competition objectives) adds 1 to each department mapped from a matching
//! skill; the student's own department adds 3. Matching is by whole words in
//! either direction, so "ML" never matches inside "HTML".

use async_trait::async_trait;
use tracing::debug;

use crate::models::profile::StudentProfile;
use crate::pipeline::stages::CategoryRecommender;
use crate::pipeline::StageError;

pub const DEFAULT_MAX_DEPARTMENTS: usize = 5;
const OWN_DEPARTMENT_BONUS: usize = 3;

/// Skill or topic → departments where it is taught or researched.
const SKILL_TO_DEPARTMENTS: &[(&str, &[&str])] = &[
    // Computer science
    ("Machine Learning", &["Computer Science", "Electronics", "Electrical"]),
    ("Deep Learning", &["Computer Science", "Electronics", "Electrical"]),
    ("Artificial Intelligence", &["Computer Science", "Electronics"]),
    ("Natural Language Processing", &["Computer Science"]),
    ("Computer Vision", &["Computer Science", "Electronics"]),
    ("Data Science", &["Computer Science", "Mathematics"]),
    ("Algorithm", &["Computer Science", "Mathematics"]),
    ("Data Structure", &["Computer Science"]),
    ("Web Development", &["Computer Science"]),
    ("Python", &["Computer Science", "Electronics", "Electrical"]),
    ("C++", &["Computer Science", "Electronics"]),
    ("JavaScript", &["Computer Science"]),
    ("React", &["Computer Science"]),
    ("Next.js", &["Computer Science"]),
    ("Software Engineering", &["Computer Science"]),
    ("MLOps", &["Computer Science"]),
    ("DevOps", &["Computer Science"]),
    ("Cloud Computing", &["Computer Science"]),
    ("AWS", &["Computer Science"]),
    ("Docker", &["Computer Science"]),
    ("Kubernetes", &["Computer Science"]),
    // Electronics and electrical
    ("Electronics", &["Electronics", "Electrical"]),
    ("VLSI", &["Electronics", "Electrical"]),
    ("Embedded Systems", &["Electronics", "Electrical", "Computer Science"]),
    ("Signal Processing", &["Electronics", "Electrical"]),
    ("Control Systems", &["Electrical", "Electronics"]),
    ("Power Systems", &["Electrical"]),
    ("FPGA", &["Electronics", "Electrical", "Computer Science"]),
    ("IoT", &["Electronics", "Electrical", "Computer Science"]),
    // Blockchain and cryptography
    ("Blockchain", &["Computer Science", "Electronics"]),
    ("Cryptography", &["Computer Science", "Mathematics"]),
    ("Solidity", &["Computer Science"]),
    ("Smart Contracts", &["Computer Science"]),
    // Quantitative
    ("Quantitative Finance", &["Mathematics", "Computer Science", "Industrial"]),
    ("Financial Engineering", &["Mathematics", "Industrial"]),
    ("Trading", &["Mathematics", "Computer Science"]),
    ("Time Series", &["Mathematics", "Computer Science"]),
    // Mechanical and aerospace
    ("Robotics", &["Mechanical", "Electronics", "Computer Science"]),
    ("Automation", &["Mechanical", "Electronics", "Electrical"]),
    ("CAD", &["Mechanical"]),
    ("CFD", &["Mechanical", "Aerospace"]),
    ("Fluid Mechanics", &["Mechanical", "Aerospace", "Chemical"]),
    // Chemical
    ("Chemical", &["Chemical"]),
    ("Process Engineering", &["Chemical"]),
    ("Thermodynamics", &["Chemical", "Mechanical"]),
    ("Reaction Engineering", &["Chemical"]),
    // Materials
    ("Materials Science", &["Metallurgical", "Materials"]),
    ("Nanotechnology", &["Materials", "Chemistry", "Physics"]),
    // Civil and architecture
    ("Structural Engineering", &["Civil"]),
    ("Construction", &["Civil"]),
    ("Architecture", &["Architecture"]),
    // Mathematics and physics
    ("Mathematics", &["Mathematics"]),
    ("Statistics", &["Mathematics"]),
    ("Probability", &["Mathematics"]),
    ("Physics", &["Physics"]),
    ("Quantum", &["Physics", "Computer Science"]),
    ("Quantum Computing", &["Computer Science", "Physics"]),
    // General
    ("Research", &["Computer Science", "Electronics", "Electrical"]),
    ("Competitive Programming", &["Computer Science", "Mathematics"]),
];

/// Department → spellings used in CV headers.
const DEPARTMENT_ALIASES: &[(&str, &[&str])] = &[
    ("Computer Science", &["Computer Science", "CSE", "CS"]),
    ("Electronics", &["Electronics", "EC", "ECE", "E&ECE"]),
    ("Electrical", &["Electrical", "EE"]),
    ("Mechanical", &["Mechanical", "ME"]),
    ("Chemical", &["Chemical", "CH"]),
    ("Civil", &["Civil", "CE"]),
    ("Mathematics", &["Mathematics", "Maths", "Math"]),
    ("Physics", &["Physics"]),
    ("Chemistry", &["Chemistry"]),
    ("Metallurgical", &["Metallurgical", "MT"]),
    ("Aerospace", &["Aerospace", "AE"]),
    ("Industrial", &["Industrial", "IM", "Industrial Management"]),
    ("Architecture", &["Architecture", "AR"]),
    ("Materials", &["Materials", "Metallurgical"]),
];

/// Department name, alias or code → directory code.
const DEPARTMENT_CODES: &[(&str, &str)] = &[
    ("Computer Science", "CS"),
    ("CSE", "CS"),
    ("CS", "CS"),
    ("Electronics", "EC"),
    ("ECE", "EC"),
    ("EC", "EC"),
    ("E&ECE", "EC"),
    ("Electrical", "EE"),
    ("EE", "EE"),
    ("Mechanical", "ME"),
    ("ME", "ME"),
    ("Chemical", "CH"),
    ("CH", "CH"),
    ("Civil", "CE"),
    ("CE", "CE"),
    ("Mathematics", "MA"),
    ("Maths", "MA"),
    ("Math", "MA"),
    ("MA", "MA"),
    ("Physics", "PH"),
    ("PH", "PH"),
    ("Chemistry", "CY"),
    ("CY", "CY"),
    ("Metallurgical", "MT"),
    ("Materials", "MT"),
    ("MT", "MT"),
    ("Aerospace", "AE"),
    ("AE", "AE"),
    ("Industrial", "IM"),
    ("IM", "IM"),
    ("Architecture", "AR"),
    ("AR", "AR"),
];

/// Resolves a department name, alias or code to its directory code.
///
/// Exact (case-insensitive) matches win; otherwise a full header such as
/// "B.Tech. in Chemical Engineering" is searched for a known alias.
pub fn department_code(name: &str) -> Option<&'static str> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    if let Some((_, code)) = DEPARTMENT_CODES
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
    {
        return Some(*code);
    }
    matched_department(name).and_then(|dept| {
        DEPARTMENT_CODES
            .iter()
            .find(|(key, _)| *key == dept)
            .map(|(_, code)| *code)
    })
}

/// True when `code` is a directory code this service knows how to scrape.
pub fn is_known_code(code: &str) -> bool {
    DEPARTMENT_CODES.iter().any(|(_, c)| *c == code)
}

/// Codes of departments that share at least one skill area with `code`.
pub fn related_departments(code: &str) -> Vec<&'static str> {
    let mut related: Vec<&'static str> = Vec::new();
    for (_, departments) in SKILL_TO_DEPARTMENTS {
        let codes: Vec<&'static str> = departments
            .iter()
            .filter_map(|d| department_code(d))
            .collect();
        if !codes.iter().any(|c| *c == code) {
            continue;
        }
        for other in codes {
            if other != code && !related.contains(&other) {
                related.push(other);
            }
        }
    }
    related
}

/// The first department whose alias appears as whole words in `text`.
fn matched_department(text: &str) -> Option<&'static str> {
    let haystack = normalize_words(text);
    DEPARTMENT_ALIASES
        .iter()
        .find(|(_, aliases)| aliases.iter().any(|a| contains_phrase(&haystack, a)))
        .map(|(dept, _)| *dept)
}

/// Department names ranked for a profile, highest score first. Ties keep the
/// order in which departments were first scored.
pub fn recommend_departments(profile: &StudentProfile, max: usize) -> Vec<&'static str> {
    let mut scores: Vec<(&'static str, usize)> = Vec::new();
    let mut bump = |dept: &'static str, by: usize| match scores.iter_mut().find(|(d, _)| *d == dept) {
        Some((_, score)) => *score += by,
        None => scores.push((dept, by)),
    };

    for term in profile_terms(profile) {
        let term = normalize_words(&term);
        if term.trim().is_empty() {
            continue;
        }
        for (skill, departments) in SKILL_TO_DEPARTMENTS {
            let skill = normalize_words(skill);
            if contains_phrase(&term, &skill) || contains_phrase(&skill, &term) {
                for dept in departments.iter() {
                    bump(*dept, 1);
                }
            }
        }
    }

    if let Some(own) = profile.department.as_deref() {
        let haystack = normalize_words(own);
        for (dept, aliases) in DEPARTMENT_ALIASES {
            if aliases.iter().any(|a| contains_phrase(&haystack, a)) {
                bump(*dept, OWN_DEPARTMENT_BONUS);
            }
        }
    }

    scores.sort_by(|a, b| b.1.cmp(&a.1));
    scores
        .into_iter()
        .filter(|(_, score)| *score > 0)
        .take(max)
        .map(|(dept, _)| dept)
        .collect()
}

fn profile_terms(profile: &StudentProfile) -> Vec<String> {
    let mut terms = profile.all_skills();
    terms.extend(profile.interests.iter().cloned());
    terms.extend(profile.project_technologies());
    terms.extend(profile.internships.iter().filter_map(|i| i.objective.clone()));
    terms.extend(profile.competitions.iter().filter_map(|c| c.objective.clone()));
    terms
}

/// Lowercases and replaces separators with single spaces, keeping `+`, `#`
/// and `&` so that "C++" and "E&ECE" stay intact.
pub(crate) fn normalize_words(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || matches!(c, '+' | '#' | '&')))
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn contains_phrase(haystack: &str, needle: &str) -> bool {
    let needle = normalize_words(needle);
    if needle.is_empty() {
        return false;
    }
    format!(" {haystack} ").contains(&format!(" {needle} "))
}

/// Recommends directory codes from the profile's skills and department.
#[derive(Debug, Clone)]
pub struct SkillMapRecommender {
    pub max_departments: usize,
}

impl Default for SkillMapRecommender {
    fn default() -> Self {
        Self {
            max_departments: DEFAULT_MAX_DEPARTMENTS,
        }
    }
}

impl SkillMapRecommender {
    pub fn categories_for(&self, profile: &StudentProfile) -> Vec<String> {
        let mut codes: Vec<String> = Vec::new();
        for dept in recommend_departments(profile, self.max_departments) {
            if let Some(code) = department_code(dept) {
                if !codes.iter().any(|c| c == code) {
                    codes.push(code.to_string());
                }
            }
        }
        codes
    }
}

#[async_trait]
impl CategoryRecommender for SkillMapRecommender {
    async fn recommend(&self, profile: &StudentProfile) -> Result<Vec<String>, StageError> {
        let codes = self.categories_for(profile);
        debug!(?codes, "skill-map recommendation");
        if codes.is_empty() {
            return Err(StageError::NoRecommendation);
        }
        Ok(codes)
    }
}
