use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a scraped faculty record: `{CATEGORY}:{natural key}`
/// or `{CATEGORY}:#{position}` when the listing exposes no natural key.
///
/// Reproducible across runs so that persisted records can be deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn from_natural_key(category: &str, key: &str) -> Self {
        Self(format!("{}:{}", category, key.trim().to_lowercase()))
    }

    pub fn positional(category: &str, position: usize) -> Self {
        Self(format!("{category}:#{position}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A faculty listing entry as scraped from a department directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacultyRecord {
    pub id: RecordId,
    /// Department code the record was scraped under (e.g. "CS").
    pub category: String,
    pub name: String,
    #[serde(default)]
    pub designation: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub profile_url: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub research_areas: Vec<String>,
    #[serde(default)]
    pub personal_webpage: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// A search snippet kept as evidence for the enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSnippet {
    /// Query family the snippet came from: general, publications, scholar.
    pub source: String,
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Supplementary fields attached by the enrichment stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub expertise_keywords: Vec<String>,
    pub scholar_links: Vec<String>,
    pub recent_publications: Vec<Publication>,
    pub evidence: Vec<EvidenceSnippet>,
    /// 0.0 – 1.0
    pub confidence: f64,
}

/// A faculty record with its (optional) enrichment.
///
/// The raw record is carried unchanged, so the identifier cannot drift across
/// the enrichment stage. `enrichment` is `None` when enrichment failed for
/// this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub record: FacultyRecord,
    #[serde(default)]
    pub enrichment: Option<Enrichment>,
}

impl EnrichedRecord {
    pub fn unaugmented(record: FacultyRecord) -> Self {
        Self {
            record,
            enrichment: None,
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.record.id
    }

    /// Research areas followed by expertise keywords, lowercased and deduplicated.
    pub fn expertise_terms(&self) -> Vec<String> {
        let keywords = self
            .enrichment
            .iter()
            .flat_map(|e| e.expertise_keywords.iter());
        crate::models::profile::dedup_case_insensitive(
            self.record.research_areas.iter().chain(keywords).cloned(),
        )
        .into_iter()
        .map(|t| t.to_lowercase())
        .collect()
    }
}
