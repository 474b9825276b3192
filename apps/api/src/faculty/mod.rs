// Faculty side of the pipeline: department recommendation, directory scraping
// and search-backed enrichment of scraped records.
// LLM calls go through llm_client; web search goes through search_client.

pub mod departments;
pub mod directory;
pub mod enrichment;
pub mod prompts;

pub use departments::SkillMapRecommender;
pub use directory::{DirectoryConfig, DirectoryScraper};
pub use enrichment::SearchEnricher;
