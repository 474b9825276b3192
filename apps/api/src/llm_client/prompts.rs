// Shared prompt constants.
// Each module that calls the LLM defines its own prompts.rs alongside it;
// this file holds the fragments they have in common.

/// System prompt that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Appended to every prompt that writes about the student or a professor.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Only mention skills, projects, publications and research areas that \
    appear in the data provided below. Do NOT invent achievements, papers, \
    affiliations or contact details. If the data does not support a claim, omit it.";
