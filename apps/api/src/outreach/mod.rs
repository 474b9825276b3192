// Outreach: deterministic match scoring and LLM-drafted emails and cover letters.
// All LLM calls go through llm_client.

pub mod personalizer;
pub mod prompts;

pub use personalizer::LlmPersonalizer;
