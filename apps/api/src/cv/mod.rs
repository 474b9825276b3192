// CV intake: document text extraction, LLM structuring into a StudentProfile,
// and the upload/parse HTTP handlers.

pub mod document;
pub mod handlers;
pub mod parser;
pub mod prompts;

pub use parser::LlmCvParser;
