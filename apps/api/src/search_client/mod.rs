/// Search Client: Google search through the Serper API, used to enrich
/// faculty records with publications and academic profile links.
///
/// Without an API key every search returns no hits, so enrichment degrades to
/// the scraped data instead of failing.
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const SERPER_API_URL: &str = "https://google.serper.dev/search";
const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Search failed after {retries} retries")]
    Exhausted { retries: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub position: u32,
}

#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Debug, Deserialize)]
struct SerperOrganic {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
    position: Option<u32>,
}

impl SerperResponse {
    fn into_hits(self, max_results: usize) -> Vec<SearchHit> {
        self.organic
            .into_iter()
            .filter(|r| !r.link.is_empty())
            .take(max_results)
            .enumerate()
            .map(|(i, r)| SearchHit {
                title: r.title,
                url: r.link,
                snippet: r.snippet,
                position: r.position.unwrap_or(i as u32 + 1),
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct SearchClient {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
}

impl SearchClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            endpoint: SERPER_API_URL.to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Runs one search. Retries transport errors, 429 and 5xx with a fixed
    /// delay; other non-success statuses fail immediately.
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(Vec::new());
        };

        let body = SerperRequest {
            q: query,
            num: max_results,
        };
        let mut last_error: Option<SearchError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                warn!(
                    "Search attempt {} for '{}' failed, retrying after {}ms...",
                    attempt,
                    query,
                    RETRY_DELAY.as_millis()
                );
                tokio::time::sleep(RETRY_DELAY).await;
            }

            let response = self
                .client
                .post(&self.endpoint)
                .header("X-API-KEY", api_key)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(SearchError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let message = response.text().await.unwrap_or_default();
                warn!("Search API returned {}: {}", status, message);
                last_error = Some(SearchError::Api {
                    status: status.as_u16(),
                    message,
                });
                continue;
            }

            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(SearchError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let parsed: SerperResponse = response.json().await?;
            let hits = parsed.into_hits(max_results);
            debug!("Search '{}' returned {} hits", query, hits.len());
            return Ok(hits);
        }

        Err(last_error.unwrap_or(SearchError::Exhausted {
            retries: MAX_RETRIES,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serper_response_maps_organic_results() {
        let raw = r#"{
            "searchParameters": {"q": "x"},
            "organic": [
                {"title": "A", "link": "https://a.example", "snippet": "first", "position": 1},
                {"title": "No link", "snippet": "dropped"},
                {"title": "B", "link": "https://b.example"}
            ]
        }"#;
        let parsed: SerperResponse = serde_json::from_str(raw).unwrap();
        let hits = parsed.into_hits(5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://a.example");
        assert_eq!(hits[1].snippet, "");
        assert_eq!(hits[1].position, 2);
    }

    #[test]
    fn test_max_results_is_respected() {
        let raw = r#"{"organic": [
            {"title": "A", "link": "https://a"},
            {"title": "B", "link": "https://b"},
            {"title": "C", "link": "https://c"}
        ]}"#;
        let parsed: SerperResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.into_hits(2).len(), 2);
    }

    #[test]
    fn test_missing_organic_field_yields_no_hits() {
        let parsed: SerperResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.into_hits(3).is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_client_returns_no_hits() {
        let client = SearchClient::new(Some("   ".to_string()));
        assert!(!client.is_configured());
        assert!(client.search("anything", 3).await.unwrap().is_empty());
    }
}
