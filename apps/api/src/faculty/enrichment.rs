//! Search-backed enrichment of scraped faculty records.
//!
//! Four searches per professor (general, publications, scholar and, when the
//! record lists research areas, a targeted area search folded into general),
//! then LLM keyword extraction over the hits. Everything in the resulting
//! `Enrichment` is derived from the raw record and the hits, so enriching the
//! same record twice yields the same fields.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::faculty::prompts::{KEYWORD_EXTRACTION_PROMPT, KEYWORD_EXTRACTION_SYSTEM};
use crate::llm_client::LlmClient;
use crate::models::faculty::{Enrichment, EvidenceSnippet, FacultyRecord, Publication};
use crate::models::profile::dedup_case_insensitive;
use crate::pipeline::stages::RecordEnricher;
use crate::pipeline::StageError;
use crate::search_client::{SearchClient, SearchError, SearchHit};

pub const ACADEMIC_DOMAINS: &[&str] = &[
    "scholar.google.com",
    "dblp.org",
    "researchgate.net",
    "orcid.org",
    "semanticscholar.org",
];

const MAX_PUBLICATIONS: usize = 5;
const MIN_PUBLICATION_TITLE_CHARS: usize = 10;
const EVIDENCE_PER_CATEGORY: usize = 2;
const SNIPPET_CHARS: usize = 300;
const MAX_KEYWORDS: usize = 10;
const KEYWORD_TEMPERATURE: f64 = 0.2;

/// Search hits for one professor, grouped by query family.
#[derive(Debug, Clone, Default)]
pub struct ProfessorSearch {
    pub general: Vec<SearchHit>,
    pub publications: Vec<SearchHit>,
    pub scholar: Vec<SearchHit>,
}

impl ProfessorSearch {
    fn categories(&self) -> [(&'static str, &[SearchHit]); 3] {
        [
            ("general", &self.general),
            ("publications", &self.publications),
            ("scholar", &self.scholar),
        ]
    }

    fn all_hits(&self) -> impl Iterator<Item = &SearchHit> {
        self.general
            .iter()
            .chain(&self.publications)
            .chain(&self.scholar)
    }
}

#[derive(Clone)]
pub struct SearchEnricher {
    search: SearchClient,
    llm: LlmClient,
}

impl SearchEnricher {
    pub fn new(search: SearchClient, llm: LlmClient) -> Self {
        Self {
            search,
            llm: llm.with_temperature(KEYWORD_TEMPERATURE),
        }
    }

    /// Runs the query set for one record. A failing query is logged and counts
    /// as empty; only when every query fails is the search reported as failed.
    async fn search_professor(&self, record: &FacultyRecord) -> Result<ProfessorSearch, StageError> {
        let name = record.name.as_str();
        let general_q = format!("{name} IIT Kharagpur {}", record.category);
        let publications_q = format!("{name} publications research papers");
        let scholar_q = format!("{name} Google Scholar");

        let mut failures: Vec<SearchError> = Vec::new();
        let mut attempted = 0usize;
        let mut run = |result: Result<Vec<SearchHit>, SearchError>| {
            attempted += 1;
            result.unwrap_or_else(|e| {
                warn!(record_id = %record.id, "search query failed: {e}");
                failures.push(e);
                Vec::new()
            })
        };

        let mut general = run(self.search.search(&general_q, 3).await);
        let publications = run(self.search.search(&publications_q, 3).await);
        let scholar = run(self.search.search(&scholar_q, 2).await);
        if !record.research_areas.is_empty() {
            let areas = record
                .research_areas
                .iter()
                .take(3)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" ");
            general.extend(run(self.search.search(&format!("{name} {areas}"), 2).await));
        }

        if failures.len() == attempted {
            let detail = failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(StageError::Search(detail));
        }

        Ok(ProfessorSearch {
            general,
            publications,
            scholar,
        })
    }

    async fn extract_keywords(&self, record: &FacultyRecord, search: &ProfessorSearch) -> Vec<String> {
        let research_areas = if record.research_areas.is_empty() {
            "Not specified".to_string()
        } else {
            record.research_areas.join(", ")
        };
        let prompt = KEYWORD_EXTRACTION_PROMPT
            .replace("{name}", &record.name)
            .replace("{department}", &record.category)
            .replace("{research_areas}", &research_areas)
            .replace("{bio}", record.bio.as_deref().unwrap_or("Not available"))
            .replace("{search_context}", &search_context(search));

        match self
            .llm
            .call_json::<Vec<String>>(&prompt, KEYWORD_EXTRACTION_SYSTEM)
            .await
        {
            Ok(keywords) => keywords,
            Err(e) => {
                warn!(record_id = %record.id, "keyword extraction failed, using research areas: {e}");
                record.research_areas.clone()
            }
        }
    }
}

#[async_trait]
impl RecordEnricher for SearchEnricher {
    async fn enrich(&self, record: &FacultyRecord) -> Result<Enrichment, StageError> {
        let search = if self.search.is_configured() {
            self.search_professor(record).await?
        } else {
            ProfessorSearch::default()
        };
        let keywords = self.extract_keywords(record, &search).await;
        let enrichment = build_enrichment(record, &search, keywords);
        debug!(
            record_id = %record.id,
            confidence = enrichment.confidence,
            keywords = enrichment.expertise_keywords.len(),
            "record enriched"
        );
        Ok(enrichment)
    }
}

/// Assembles the supplement for one record from its search hits and keywords.
pub fn build_enrichment(
    record: &FacultyRecord,
    search: &ProfessorSearch,
    keywords: Vec<String>,
) -> Enrichment {
    let mut enrichment = Enrichment {
        expertise_keywords: dedup_case_insensitive(keywords.into_iter())
            .into_iter()
            .take(MAX_KEYWORDS)
            .collect(),
        scholar_links: scholar_links(search),
        recent_publications: publications(search),
        evidence: evidence(search),
        confidence: 0.0,
    };
    enrichment.confidence = confidence(record, &enrichment);
    enrichment
}

/// Academic-profile links in first-seen order, without duplicates.
pub fn scholar_links(search: &ProfessorSearch) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    for hit in search.all_hits() {
        let is_academic = ACADEMIC_DOMAINS.iter().any(|d| hit.url.contains(d));
        if is_academic && !links.contains(&hit.url) {
            links.push(hit.url.clone());
        }
    }
    links
}

fn publications(search: &ProfessorSearch) -> Vec<Publication> {
    search
        .publications
        .iter()
        .take(MAX_PUBLICATIONS)
        .filter(|hit| hit.title.trim().chars().count() > MIN_PUBLICATION_TITLE_CHARS)
        .map(|hit| Publication {
            title: hit.title.trim().to_string(),
            url: Some(hit.url.clone()),
        })
        .collect()
}

fn evidence(search: &ProfessorSearch) -> Vec<EvidenceSnippet> {
    search
        .categories()
        .into_iter()
        .flat_map(|(source, hits)| {
            hits.iter()
                .take(EVIDENCE_PER_CATEGORY)
                .map(move |hit| EvidenceSnippet {
                    source: source.to_string(),
                    title: hit.title.clone(),
                    url: hit.url.clone(),
                    snippet: hit.snippet.chars().take(SNIPPET_CHARS).collect(),
                })
        })
        .collect()
}

fn search_context(search: &ProfessorSearch) -> String {
    let parts: Vec<String> = evidence(search)
        .into_iter()
        .map(|e| format!("[{}] {}: {}", e.source, e.title, e.snippet))
        .collect();
    if parts.is_empty() {
        "No additional information found.".to_string()
    } else {
        parts.join("\n\n")
    }
}

/// 0.2 for each of bio, research areas, keywords, scholar links and
/// publications being present, capped at 1.0.
pub fn confidence(record: &FacultyRecord, enrichment: &Enrichment) -> f64 {
    let signals = [
        record.bio.as_deref().is_some_and(|b| !b.trim().is_empty()),
        !record.research_areas.is_empty(),
        !enrichment.expertise_keywords.is_empty(),
        !enrichment.scholar_links.is_empty(),
        !enrichment.recent_publications.is_empty(),
    ];
    let present = signals.iter().filter(|s| **s).count();
    (present as f64 * 0.2).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::faculty::RecordId;

    fn record() -> FacultyRecord {
        FacultyRecord {
            id: RecordId::from_natural_key("CS", "jdoe"),
            category: "CS".to_string(),
            name: "Jane Doe".to_string(),
            designation: "Professor".to_string(),
            email: None,
            phone: None,
            profile_url: "https://example.edu/faculty/jdoe".to_string(),
            bio: Some("Works on cryptography.".to_string()),
            research_areas: vec!["Cryptography".to_string()],
            personal_webpage: None,
        }
    }

    fn hit(title: &str, url: &str) -> SearchHit {
        SearchHit {
            title: title.to_string(),
            url: url.to_string(),
            snippet: "snippet ".repeat(60),
            position: 1,
        }
    }

    fn search() -> ProfessorSearch {
        ProfessorSearch {
            general: vec![
                hit("Jane Doe - IIT", "https://www.iitkgp.ac.in/faculty/jdoe"),
                hit("Jane Doe - ORCID", "https://orcid.org/0000-0001"),
            ],
            publications: vec![
                hit("Lattice-based signatures at scale", "https://dblp.org/pid/1"),
                hit("Short", "https://example.org/short"),
            ],
            scholar: vec![
                hit("Jane Doe - Google Scholar", "https://scholar.google.com/citations?user=x"),
                hit("Jane Doe - ORCID", "https://orcid.org/0000-0001"),
            ],
        }
    }

    #[test]
    fn test_scholar_links_are_academic_and_unique() {
        let links = scholar_links(&search());
        assert_eq!(
            links,
            vec![
                "https://orcid.org/0000-0001",
                "https://dblp.org/pid/1",
                "https://scholar.google.com/citations?user=x",
            ]
        );
    }

    #[test]
    fn test_short_publication_titles_are_dropped() {
        let pubs = publications(&search());
        assert_eq!(pubs.len(), 1);
        assert_eq!(pubs[0].title, "Lattice-based signatures at scale");
    }

    #[test]
    fn test_evidence_is_capped_per_category_and_truncated() {
        let evidence = evidence(&search());
        assert_eq!(evidence.len(), 6);
        assert!(evidence.iter().all(|e| e.snippet.chars().count() <= SNIPPET_CHARS));
        assert_eq!(evidence[0].source, "general");
        assert_eq!(evidence[5].source, "scholar");
    }

    #[test]
    fn test_full_signals_give_full_confidence() {
        let enrichment = build_enrichment(&record(), &search(), vec!["lattices".to_string()]);
        assert!((enrichment.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_without_search_hits() {
        let mut bare = record();
        bare.bio = None;
        let enrichment = build_enrichment(&bare, &ProfessorSearch::default(), vec![]);
        assert!((enrichment.confidence - 0.2).abs() < 1e-9);
        assert!(enrichment.scholar_links.is_empty());
    }

    #[test]
    fn test_enrichment_is_idempotent() {
        let keywords = vec!["Lattices".to_string(), "lattices".to_string(), "MPC".to_string()];
        let first = build_enrichment(&record(), &search(), keywords.clone());
        let second = build_enrichment(&record(), &search(), keywords);
        assert_eq!(first, second);
        assert_eq!(first.expertise_keywords, vec!["Lattices", "MPC"]);
    }

    #[test]
    fn test_search_context_falls_back_when_empty() {
        assert_eq!(
            search_context(&ProfessorSearch::default()),
            "No additional information found."
        );
    }
}
