//! Faculty directory scraper.
//!
//! Department pages list faculty as anchor "cards" linking to `/faculty/…`
//! profile pages. Cards are read with regular expressions over the served
//! HTML; each profile page is then fetched for the bio sketch and personal
//! webpage. A failed profile fetch keeps the card data.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::faculty::departments::{department_code, is_known_code};
use crate::models::faculty::{FacultyRecord, RecordId};
use crate::pipeline::stages::{CategoryFailure, FacultySource, ScrapeReport};
use crate::pipeline::StageError;

const MAX_BIO_CHARS: usize = 2000;

static CARD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']*/faculty/[^"']*)["'][^>]*>(.*?)</a>"#).unwrap()
});
static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<span[^>]*class\s*=\s*["'][^"']*\bhndg\b[^"']*["'][^>]*>(.*?)</span>"#).unwrap()
});
static SPAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<span[^>]*>(.*?)</span>").unwrap());
static DESIGNATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<span[^>]*class\s*=\s*["'][^"']*\btx22\b[^"']*["'][^>]*>.*?<i(?:\s[^>]*)?>(.*?)</i>"#)
        .unwrap()
});
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap()
});
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{5}\b").unwrap());
static RESEARCH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Research Area\(s\)\s*:\s*(.+)").unwrap());
static BIO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<div[^>]*\bid\s*=\s*["']biosketch["'][^>]*>(.*?)</div>"#).unwrap()
});
static WEBPAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']+)["'][^>]*>\s*Personal Webpage\s*</a>"#).unwrap()
});
static BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</(p|div|li|tr|h[1-6]|span)>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub base_url: String,
    /// Pause between consecutive requests to the directory site.
    pub request_delay: Duration,
    pub timeout: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.iitkgp.ac.in".to_string(),
            request_delay: Duration::from_millis(2000),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Details only available on a professor's own profile page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileDetails {
    pub bio: Option<String>,
    pub personal_webpage: Option<String>,
}

#[derive(Clone)]
pub struct DirectoryScraper {
    client: Client,
    config: DirectoryConfig,
}

impl DirectoryScraper {
    pub fn new(mut config: DirectoryConfig) -> Result<Self, reqwest::Error> {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("outreach/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    async fn fetch(&self, url: &str) -> Result<String, reqwest::Error> {
        debug!("GET {}", url);
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }

    /// Scrapes one department. The limit truncates the card list before any
    /// profile page is fetched.
    async fn scrape_department(
        &self,
        code: &str,
        limit: Option<usize>,
        pacer: &mut Pacer,
    ) -> Result<Vec<FacultyRecord>, reqwest::Error> {
        let url = format!("{}/department/{}", self.config.base_url, code);
        pacer.wait().await;
        let html = self.fetch(&url).await?;

        let mut records = parse_department_page(&html, &self.config.base_url, code);
        info!(department = code, cards = records.len(), "parsed department page");
        if let Some(limit) = limit {
            records.truncate(limit);
        }

        for record in &mut records {
            pacer.wait().await;
            match self.fetch(&record.profile_url).await {
                Ok(page) => {
                    let details = parse_profile_page(&page, &self.config.base_url);
                    record.bio = details.bio;
                    record.personal_webpage = details.personal_webpage;
                }
                Err(e) => warn!(
                    record_id = %record.id,
                    "profile fetch failed, keeping listing data: {e}"
                ),
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl FacultySource for DirectoryScraper {
    async fn scrape(
        &self,
        categories: &[String],
        per_category_limit: Option<usize>,
    ) -> Result<ScrapeReport, StageError> {
        let mut report = ScrapeReport::default();
        let mut seen: HashSet<RecordId> = HashSet::new();
        let mut pacer = Pacer::new(self.config.request_delay);

        for category in categories {
            let Some(code) = resolve_category(category) else {
                warn!(category = %category, "unknown department");
                report.failures.push(CategoryFailure {
                    category: category.clone(),
                    error: format!("unknown department '{category}'"),
                });
                continue;
            };

            match self.scrape_department(&code, per_category_limit, &mut pacer).await {
                Ok(records) => {
                    let before = report.records.len();
                    report
                        .records
                        .extend(records.into_iter().filter(|r| seen.insert(r.id.clone())));
                    info!(
                        department = %code,
                        records = report.records.len() - before,
                        "department scraped"
                    );
                }
                Err(e) => {
                    warn!(department = %code, "department scrape failed: {e}");
                    report.failures.push(CategoryFailure {
                        category: code,
                        error: e.to_string(),
                    });
                }
            }
        }

        finish_report(report, categories.len())
    }
}

/// Accepts a department code in any case, or a department name or alias.
fn resolve_category(category: &str) -> Option<String> {
    let code = category.trim().to_ascii_uppercase();
    if is_known_code(&code) {
        return Some(code);
    }
    department_code(category).map(str::to_string)
}

/// Nothing collected and every category failed means the scrape as a whole
/// failed; anything less is a (possibly partial) report.
fn finish_report(report: ScrapeReport, attempted: usize) -> Result<ScrapeReport, StageError> {
    if attempted > 0 && report.records.is_empty() && report.failures.len() == attempted {
        let detail = report
            .failures
            .iter()
            .map(|f| format!("{}: {}", f.category, f.error))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(StageError::Scrape(detail));
    }
    Ok(report)
}

/// Enforces the fixed delay between consecutive requests of one scrape.
struct Pacer {
    delay: Duration,
    started: bool,
}

impl Pacer {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: false,
        }
    }

    async fn wait(&mut self) {
        if self.started && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.started = true;
    }
}

/// Reads the faculty cards of a department page. Cards repeated on the page
/// (same profile link) are kept once, in first-seen order.
pub fn parse_department_page(html: &str, base_url: &str, code: &str) -> Vec<FacultyRecord> {
    let mut records = Vec::new();
    let mut seen_urls = HashSet::new();
    let mut seen_ids = HashSet::new();

    for caps in CARD_RE.captures_iter(html) {
        let href = caps[1].trim();
        let inner = &caps[2];

        let Some(name) = card_name(inner) else {
            continue;
        };
        let profile_url = absolute_url(base_url, href);
        if !seen_urls.insert(profile_url.clone()) {
            continue;
        }

        let text = html_text(inner);
        let position = records.len() + 1;
        let id = match url_slug(&profile_url) {
            Some(slug) => RecordId::from_natural_key(code, slug),
            None => RecordId::positional(code, position),
        };
        if !seen_ids.insert(id.clone()) {
            continue;
        }

        records.push(FacultyRecord {
            id,
            category: code.to_string(),
            name,
            designation: DESIGNATION_RE
                .captures(inner)
                .map(|c| html_text(&c[1]))
                .unwrap_or_default(),
            email: EMAIL_RE.find(&text).map(|m| m.as_str().to_string()),
            phone: PHONE_RE.find(&text).map(|m| m.as_str().to_string()),
            profile_url,
            bio: None,
            research_areas: research_areas(&text),
            personal_webpage: None,
        });
    }

    records
}

pub fn parse_profile_page(html: &str, base_url: &str) -> ProfileDetails {
    let bio = BIO_RE
        .captures(html)
        .map(|c| collapse_whitespace(&html_text(&c[1])))
        .filter(|b| !b.is_empty())
        .map(|b| b.chars().take(MAX_BIO_CHARS).collect());
    let personal_webpage = WEBPAGE_RE
        .captures(html)
        .map(|c| absolute_url(base_url, c[1].trim()));
    ProfileDetails {
        bio,
        personal_webpage,
    }
}

/// The `hndg` heading, else the first span that looks like a name.
fn card_name(card_html: &str) -> Option<String> {
    let name = NAME_RE
        .captures(card_html)
        .map(|c| html_text(&c[1]))
        .or_else(|| {
            SPAN_RE
                .captures_iter(card_html)
                .map(|c| html_text(&c[1]))
                .find(|t| t.chars().count() > 3 && !t.contains('@'))
        })?;
    let name = collapse_whitespace(&name);
    (name.chars().count() >= 2).then_some(name)
}

fn research_areas(card_text: &str) -> Vec<String> {
    RESEARCH_RE
        .captures(card_text)
        .map(|c| {
            c[1].split(';')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn absolute_url(base_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if let Some(path) = href.strip_prefix('/') {
        format!("{base_url}/{path}")
    } else {
        format!("{base_url}/{href}")
    }
}

/// Last non-empty path segment, ignoring query and fragment.
fn url_slug(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .find(|s| !s.is_empty())
        .filter(|s| *s != "faculty" && !s.contains(':'))
}

/// Visible text of an HTML fragment: block ends become newlines, tags are
/// dropped, entities decoded, blank lines removed.
fn html_text(fragment: &str) -> String {
    let broken = BREAK_RE.replace_all(fragment, "\n");
    let stripped = TAG_RE.replace_all(&broken, "");
    decode_entities(&stripped)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.iitkgp.ac.in";

    const DEPARTMENT_PAGE: &str = r#"
<div class="people">
  <a href="/department/CS/faculty/cs-debdeep">
    <img src="/photo.jpg">
    <span class="hndg">Debdeep Mukhopadhyay</span>
    <span class="tx22"><i>Professor</i></span>
    <span>debdeep@cse.iitkgp.ac.in</span>
    <span>Phone : 83460</span>
    <span>Research Area(s) : Hardware Security; Cryptography ;  Side Channels</span>
    <span>Joined 2008</span>
  </a>
  <a href="/department/CS/faculty/cs-debdeep">Debdeep Mukhopadhyay</a>
  <a href="https://www.iitkgp.ac.in/department/CS/faculty/cs-pabitra">
    <span class="hndg">Pabitra Mitra</span>
    <span class="tx22"><i>Associate Professor</i></span>
  </a>
  <a href="/department/CS/about">About the department</a>
  <a href="/department/CS/faculty/cs-empty"><img src="/x.jpg"></a>
</div>"#;

    const PROFILE_PAGE: &str = r#"
<html><body>
  <h4>Debdeep Mukhopadhyay</h4>
  <div id="biosketch">
    <p>Works on secure hardware &amp; embedded systems.</p>
    <p>Leads the SEAL lab.</p>
  </div>
  <a href="https://cse.iitkgp.ac.in/~debdeep" target="_blank"> Personal Webpage </a>
</body></html>"#;

    #[test]
    fn test_department_cards_are_parsed() {
        let records = parse_department_page(DEPARTMENT_PAGE, BASE, "CS");
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.id.as_str(), "CS:cs-debdeep");
        assert_eq!(first.name, "Debdeep Mukhopadhyay");
        assert_eq!(first.designation, "Professor");
        assert_eq!(first.email.as_deref(), Some("debdeep@cse.iitkgp.ac.in"));
        assert_eq!(first.phone.as_deref(), Some("83460"));
        assert_eq!(
            first.research_areas,
            vec!["Hardware Security", "Cryptography", "Side Channels"]
        );
        assert_eq!(
            first.profile_url,
            "https://www.iitkgp.ac.in/department/CS/faculty/cs-debdeep"
        );

        let second = &records[1];
        assert_eq!(second.id.as_str(), "CS:cs-pabitra");
        assert_eq!(second.designation, "Associate Professor");
        assert!(second.email.is_none());
        assert!(second.research_areas.is_empty());
    }

    #[test]
    fn test_record_ids_are_reproducible() {
        let a = parse_department_page(DEPARTMENT_PAGE, BASE, "CS");
        let b = parse_department_page(DEPARTMENT_PAGE, BASE, "CS");
        let ids_a: Vec<_> = a.iter().map(|r| r.id.clone()).collect();
        let ids_b: Vec<_> = b.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_profile_page_details() {
        let details = parse_profile_page(PROFILE_PAGE, BASE);
        assert_eq!(
            details.bio.as_deref(),
            Some("Works on secure hardware & embedded systems. Leads the SEAL lab.")
        );
        assert_eq!(
            details.personal_webpage.as_deref(),
            Some("https://cse.iitkgp.ac.in/~debdeep")
        );
    }

    #[test]
    fn test_profile_page_without_details() {
        assert_eq!(
            parse_profile_page("<html><body><h4>X</h4></body></html>", BASE),
            ProfileDetails::default()
        );
    }

    #[test]
    fn test_long_bio_is_truncated() {
        let page = format!(r#"<div id="biosketch">{}</div>"#, "a".repeat(3000));
        let bio = parse_profile_page(&page, BASE).bio.unwrap();
        assert_eq!(bio.chars().count(), MAX_BIO_CHARS);
    }

    #[test]
    fn test_url_slug_falls_back_when_missing() {
        assert_eq!(url_slug("https://x.in/department/CS/faculty/cs-abc?tab=1"), Some("cs-abc"));
        assert_eq!(url_slug("https://x.in/faculty/"), None);
    }

    #[test]
    fn test_relative_urls_are_resolved() {
        assert_eq!(absolute_url(BASE, "/a/b"), "https://www.iitkgp.ac.in/a/b");
        assert_eq!(absolute_url(BASE, "a/b"), "https://www.iitkgp.ac.in/a/b");
        assert_eq!(absolute_url(BASE, "http://other.in/x"), "http://other.in/x");
    }

    #[tokio::test]
    async fn test_unknown_categories_fail_the_scrape() {
        let scraper = DirectoryScraper::new(DirectoryConfig {
            request_delay: Duration::ZERO,
            ..Default::default()
        })
        .unwrap();
        let err = scraper
            .scrape(&["XX".to_string(), "Basket Weaving".to_string()], None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "scrape_failed");
        assert!(err.to_string().contains("XX"));
    }

    #[test]
    fn test_categories_resolve_names_aliases_and_codes() {
        assert_eq!(resolve_category("cs").as_deref(), Some("CS"));
        assert_eq!(resolve_category(" EE ").as_deref(), Some("EE"));
        assert_eq!(resolve_category("Computer Science").as_deref(), Some("CS"));
        assert_eq!(resolve_category("E&ECE").as_deref(), Some("EC"));
        assert_eq!(resolve_category("Basket Weaving"), None);
    }

    #[tokio::test]
    async fn test_department_name_is_scraped_under_its_code() {
        let scraper = DirectoryScraper::new(DirectoryConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            request_delay: Duration::ZERO,
            timeout: Duration::from_secs(2),
        })
        .unwrap();
        // Nothing listens on the port, so the department fetch itself fails;
        // the name must still have been resolved instead of rejected.
        let err = scraper
            .scrape(&["Computer Science".to_string()], None)
            .await
            .unwrap_err();
        let detail = err.to_string();
        assert!(detail.contains("CS:"), "{detail}");
        assert!(!detail.contains("unknown department"), "{detail}");
    }

    #[test]
    fn test_partial_failure_is_a_report() {
        let report = ScrapeReport {
            records: parse_department_page(DEPARTMENT_PAGE, BASE, "CS"),
            failures: vec![CategoryFailure {
                category: "EE".to_string(),
                error: "timeout".to_string(),
            }],
        };
        let report = finish_report(report, 2).unwrap();
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn test_empty_category_list_is_an_empty_report() {
        let report = finish_report(ScrapeReport::default(), 0).unwrap();
        assert!(report.records.is_empty());
    }
}
